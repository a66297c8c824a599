//! Detector noise power spectral density.

use serde::{Deserialize, Serialize};

use crate::util::SpiirError;

/// One-sided PSD sampled on a uniform frequency grid starting at `f0`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Psd {
    pub f0: f64,
    pub delta_f: f64,
    pub data: Vec<f64>,
}

impl Psd {
    /// # Examples
    ///
    /// ```
    /// use spiir_bank::psd::Psd;
    ///
    /// let psd = Psd::new(0.0, 0.25, vec![1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(psd.value_at(0.125), 1.5);
    /// ```
    pub fn new(
        f0: f64,
        delta_f: f64,
        data: Vec<f64>,
    ) -> Result<Psd, SpiirError> {
        if !(delta_f > 0.0) || !f0.is_finite() {
            return Err(SpiirError::InvalidInput(format!(
                "PSD grid needs delta_f > 0 (got {}) and finite f0 (got {})",
                delta_f, f0
            )));
        }
        if data.is_empty() {
            return Err(SpiirError::InvalidInput("PSD is empty".to_string()));
        }
        Ok(Psd { f0, delta_f, data })
    }

    /// A white PSD of `value` covering `[0, f_max]`.
    pub fn flat(
        f_max: f64,
        delta_f: f64,
        value: f64,
    ) -> Result<Psd, SpiirError> {
        let steps = (f_max / delta_f).ceil();
        if !(delta_f > 0.0)
            || !(f_max >= 0.0)
            || !(steps < std::u32::MAX as f64)
        {
            return Err(SpiirError::InvalidInput(format!(
                "cannot lay a flat PSD up to {} Hz on a {} Hz grid",
                f_max, delta_f
            )));
        }
        Psd::new(0.0, delta_f, vec![value; steps as usize + 1])
    }

    pub fn f_max(&self) -> f64 {
        self.f0 + (self.data.len() - 1) as f64 * self.delta_f
    }

    /// Linearly interpolated PSD at `f`.
    ///
    /// Frequencies outside the grid give NaN, which `whitening_weight` maps
    /// to zero.
    pub fn value_at(&self, f: f64) -> f64 {
        let x = (f - self.f0) / self.delta_f;
        if !(x >= 0.0) || x > (self.data.len() - 1) as f64 {
            return std::f64::NAN;
        }
        let i = x.floor() as usize;
        if i + 1 >= self.data.len() {
            return self.data[self.data.len() - 1];
        }
        let frac = x - i as f64;
        if frac == 0.0 {
            return self.data[i];
        }
        self.data[i] * (1.0 - frac) + self.data[i + 1] * frac
    }

    /// Factor applied to a frequency bin at `f` to whiten it:
    /// `sqrt(2 * delta_f / S(f))`.
    ///
    /// Zero, negative and non-finite PSD values give a weight of zero so
    /// that the bin is dropped instead of blowing up.
    pub fn whitening_weight(&self, f: f64, delta_f: f64) -> f64 {
        let s = self.value_at(f);
        if s.is_finite() && s > 0.0 {
            (2.0 * delta_f / s).sqrt()
        } else {
            0.0
        }
    }
}
