//! Adaptive builder for SPIIR template banks.
//!
//! A SPIIR bank approximates each gravitational-wave template by a sum of
//! single-pole IIR filters that can be evaluated with very low latency. The
//! builder whitens every template against a noise PSD, searches the
//! decomposition tolerance until the filter count and match land inside the
//! requested bounds, optionally spreads the filters over several sample
//! rates, and derives an autocorrelation kernel per template for the
//! signal-consistency veto.

extern crate crossbeam;
extern crate rayon;

pub mod autocorrelation;
pub mod bank;
pub mod condition;
pub mod decimate;
pub mod fft;
pub mod iir;
pub mod prelude;
pub mod psd;
pub mod search;
pub mod template;
pub mod util;

pub use crate::util::SpiirError;
