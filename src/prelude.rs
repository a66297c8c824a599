//! This module provides an easy single import for those using this crate.

pub use crate::bank::config::BankConfig;
pub use crate::bank::observer::{
    BankEvent, BankObserver, ChannelObserver, LogObserver,
};
pub use crate::bank::{Bank, BankBuilder};
pub use crate::iir::chirplet::ChirpletDecomposer;
pub use crate::iir::optimizer::GainFitOptimizer;
pub use crate::iir::{CoefficientOptimizer, FilterSet, IirDecomposer};
pub use crate::psd::Psd;
pub use crate::search::{MatchGate, SearchParams, SearchStatus};
pub use crate::template::waveform::{
    Domain, NewtonianChirpGenerator, WaveformGenerator,
};
pub use crate::template::{ChirpBound, PostNewtonianBound, Template};
pub use crate::util::SpiirError;
pub use num::Complex;
