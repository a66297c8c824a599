//! Template parameters and the physical collaborators used to size and
//! generate template waveforms.
//!
//! The waveform physics itself is supplied by the caller through the
//! `WaveformGenerator` and `ChirpBound` traits. Simple post-Newtonian
//! implementations of both are provided so that a bank can be built without
//! an external waveform library.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::util::math::{chirp_mass, symmetric_mass_ratio};

pub mod waveform;

/// Mass of the sun expressed in seconds, `G * M_sun / c^3`.
pub const MTSUN_SI: f64 = 4.925_490_947_641_267e-6;
/// Speed of light in m/s.
pub const C_SI: f64 = 299_792_458.0;
/// One parsec in metres.
pub const PC_SI: f64 = 3.085_677_581_491_367e16;

/// A single compact binary template.
///
/// Masses are in solar masses and spins are dimensionless. Templates are
/// immutable once loaded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub index: usize,
    pub mass1: f64,
    pub mass2: f64,
    pub spin1: [f64; 3],
    pub spin2: [f64; 3],
    /// Terminal frequency recorded in the input bank, if known. Used only to
    /// infer a sample rate.
    pub f_final: Option<f64>,
}

impl Template {
    /// Creates a non-spinning template.
    ///
    /// # Examples
    ///
    /// ```
    /// use spiir_bank::template::Template;
    ///
    /// let template = Template::new(0, 1.4, 1.4);
    /// assert!((template.chirp_mass() - 1.2188).abs() < 1e-4);
    /// ```
    pub fn new(index: usize, mass1: f64, mass2: f64) -> Template {
        Template {
            index,
            mass1,
            mass2,
            spin1: [0.0; 3],
            spin2: [0.0; 3],
            f_final: None,
        }
    }

    pub fn with_spins(mut self, spin1: [f64; 3], spin2: [f64; 3]) -> Self {
        self.spin1 = spin1;
        self.spin2 = spin2;
        self
    }

    pub fn with_f_final(mut self, f_final: f64) -> Self {
        self.f_final = Some(f_final);
        self
    }

    pub fn chirp_mass(&self) -> f64 {
        chirp_mass(self.mass1, self.mass2)
    }

    pub fn total_mass(&self) -> f64 {
        self.mass1 + self.mass2
    }

    pub fn eta(&self) -> f64 {
        symmetric_mass_ratio(self.mass1, self.mass2)
    }
}

/// Bounds on the duration of an inspiral signal.
pub trait ChirpBound: Send + Sync {
    /// Upper bound in seconds on the time a binary takes to sweep from
    /// `f_start` to merger. `chi` bounds the magnitude of the aligned spins.
    fn chirp_time(&self, f_start: f64, m1: f64, m2: f64, chi: f64) -> f64;

    /// Lower bound on the frequency at which a binary has `t_chirp` seconds
    /// left before merger.
    fn start_frequency(&self, t_chirp: f64, m1: f64, m2: f64) -> f64;
}

/// Post-Newtonian chirp-time bound.
///
/// The chirp time is the 2PN TaylorT2 expansion with a positive spin-orbit
/// term, and the start frequency is the inverse of the leading order term.
/// Both are conservative: the true signal is never longer than
/// `chirp_time` and never starts below `start_frequency`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PostNewtonianBound;

impl PostNewtonianBound {
    fn newtonian_coeff(m1: f64, m2: f64) -> f64 {
        let m = (m1 + m2) * MTSUN_SI;
        5.0 * m / (256.0 * symmetric_mass_ratio(m1, m2))
    }
}

impl ChirpBound for PostNewtonianBound {
    fn chirp_time(&self, f_start: f64, m1: f64, m2: f64, chi: f64) -> f64 {
        let m = (m1 + m2) * MTSUN_SI;
        let eta = symmetric_mass_ratio(m1, m2);
        let c0 = Self::newtonian_coeff(m1, m2);
        let c2 = 743.0 / 252.0 + 11.0 / 3.0 * eta;
        let c3 = 226.0 / 15.0 * chi.abs();
        let c4 = 3_058_673.0 / 508_032.0
            + 5429.0 / 504.0 * eta
            + 617.0 / 72.0 * eta * eta;
        let v = (PI * m * f_start).cbrt();
        c0 * v.powi(-8) * (1.0 + (c2 + (c3 + c4 * v) * v) * v * v)
    }

    fn start_frequency(&self, t_chirp: f64, m1: f64, m2: f64) -> f64 {
        let m = (m1 + m2) * MTSUN_SI;
        let c0 = Self::newtonian_coeff(m1, m2);
        (c0 / t_chirp).powf(3.0 / 8.0) / (PI * m)
    }
}

#[cfg(test)]
mod test {
    use crate::template::*;

    #[test]
    fn test_chirp_time_decreases_with_frequency() {
        let bound = PostNewtonianBound;
        let t15 = bound.chirp_time(15.0, 1.4, 1.4, 0.0);
        let t40 = bound.chirp_time(40.0, 1.4, 1.4, 0.0);
        assert!(t15 > t40);
        // A binary neutron star from 40 Hz lasts roughly 25 seconds.
        assert!(t40 > 20.0 && t40 < 35.0);
    }

    #[test]
    fn test_start_frequency_bounds_chirp_time() {
        let bound = PostNewtonianBound;
        let t = bound.chirp_time(30.0, 10.0, 5.0, 0.0);
        let f = bound.start_frequency(t, 10.0, 5.0);
        // The Newtonian inverse never exceeds the frequency the PN time was
        // computed from.
        assert!(f <= 30.0);
        assert!(f > 15.0);
    }

    #[test]
    fn test_template_accessors() {
        let template = Template::new(3, 10.0, 10.0)
            .with_spins([0.0, 0.0, 0.5], [0.0; 3])
            .with_f_final(220.0);
        assert_eq!(template.index, 3);
        assert_eq!(template.total_mass(), 20.0);
        assert!((template.eta() - 0.25).abs() < 1e-12);
        assert_eq!(template.spin1[2], 0.5);
        assert_eq!(template.f_final, Some(220.0));
    }
}
