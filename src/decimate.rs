//! Moves filters to the lowest sample rate that still resolves them.
//!
//! A filter whose pole rotates slowly carries only low frequencies and can
//! run at a fraction of the full rate. Filter `i` with normalized
//! frequency `f = |arg(a1)| / 2pi` is decimated by the largest power of two
//! `M` that keeps `f * M` below `1 / (2 * padding)`, bounded so that the
//! lowest rate still covers `flower`.

use num::Complex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;

use crate::iir::FilterSet;
use crate::util::SpiirError;

/// Filters bucketed by the sample rate they run at.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DownsampledFilterGroup {
    pub groups: BTreeMap<u32, FilterSet>,
}

impl DownsampledFilterGroup {
    /// Every filter at the full rate.
    pub fn single_rate(sample_rate: u32, filters: FilterSet) -> Self {
        let mut groups = BTreeMap::new();
        groups.insert(sample_rate, filters);
        DownsampledFilterGroup { groups }
    }

    pub fn rates(&self) -> impl Iterator<Item = u32> + '_ {
        self.groups.keys().cloned()
    }

    pub fn get(&self, rate: u32) -> Option<&FilterSet> {
        self.groups.get(&rate)
    }

    pub fn n_filters(&self) -> usize {
        self.groups.values().map(|f| f.len()).sum()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decimator {
    sample_rate: u32,
    padding: f64,
    max_factor: u32,
}

impl Decimator {
    /// Creates a new `Decimator`.
    ///
    /// # Arguments
    ///
    /// * `sample_rate` - Rate the filters were designed at, in Hz.
    /// * `flower` - Lowest frequency the slowest rate must still cover.
    /// * `padding` - Oversampling kept above each filter's frequency.
    ///
    /// # Examples
    ///
    /// ```
    /// use spiir_bank::decimate::Decimator;
    ///
    /// let decimator = Decimator::new(4096, 15.0, 1.3).unwrap();
    /// assert_eq!(decimator.max_factor(), 256);
    /// ```
    pub fn new(
        sample_rate: u32,
        flower: f64,
        padding: f64,
    ) -> Result<Decimator, SpiirError> {
        if sample_rate == 0 || !(flower > 0.0) || !(padding > 0.0) {
            return Err(SpiirError::InvalidInput(format!(
                "cannot decimate {} Hz with flower {} and padding {}",
                sample_rate, flower, padding
            )));
        }
        let ratio = (sample_rate as f64 / flower).log2().floor();
        let by_flower = if ratio > 0.0 {
            2f64.powi(ratio.min(31.0) as i32) as u32
        } else {
            1
        };
        // Keep `sample_rate / M` integral.
        let by_rate = 1u32 << sample_rate.trailing_zeros();
        Ok(Decimator {
            sample_rate,
            padding,
            max_factor: by_flower.min(by_rate).max(1),
        })
    }

    pub fn max_factor(&self) -> u32 {
        self.max_factor
    }

    /// Decimation factor of a filter with pole `a1`.
    pub fn factor(&self, a1: Complex<f64>) -> u32 {
        let f = a1.arg().abs() / (2.0 * PI);
        if !(f > 0.0) {
            return self.max_factor;
        }
        let exponent = (-(f * 2.0 * self.padding).log2()).ceil();
        if exponent <= 0.0 {
            return 1;
        }
        if exponent >= 31.0 {
            return self.max_factor;
        }
        (1u32 << exponent as u32).min(self.max_factor)
    }

    /// Moves every filter to its own rate.
    ///
    /// The decimated filter runs on every `M`-th sample and starts at the
    /// first low-rate sample after the original delay; its gain absorbs
    /// the phase advance to that sample and the `sqrt(M)` noise scaling.
    pub fn decimate(&self, filters: &FilterSet) -> DownsampledFilterGroup {
        let mut groups: BTreeMap<u32, FilterSet> = BTreeMap::new();
        for (a1, b0, delay) in filters.iter() {
            let m = self.factor(a1);
            let new_delay = (delay + m) / m;
            let advance = new_delay * m - delay;
            groups.entry(self.sample_rate / m).or_default().push(
                a1.powu(m),
                b0 * (m as f64).sqrt() * a1.powu(advance),
                new_delay,
            );
        }
        DownsampledFilterGroup { groups }
    }
}
