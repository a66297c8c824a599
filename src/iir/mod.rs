//! Single-pole IIR filter sets and the primitives that produce them.
//!
//! A template is approximated by the sum of `N` first order filters, each
//! described by a complex pole `a1`, a complex gain `b0` and an integer
//! delay. Filter `i` contributes `b0[i] * a1[i]^m` to output sample
//! `delay[i] + m`. The summed response is the template reversed in time, so
//! filtering a data stream with it correlates the stream against the
//! template.

use num::Complex;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::util::SpiirError;

pub mod chirplet;
pub mod optimizer;

/// Parallel arrays of poles, gains and delays.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    pub a1: Vec<Complex<f64>>,
    pub b0: Vec<Complex<f64>>,
    pub delay: Vec<u32>,
}

impl FilterSet {
    /// Creates a new `FilterSet`, checking that the arrays line up.
    ///
    /// # Examples
    ///
    /// ```
    /// use spiir_bank::iir::FilterSet;
    /// use num::Complex;
    ///
    /// let filters = FilterSet::new(
    ///     vec![Complex::new(0.5, 0.0)],
    ///     vec![Complex::new(1.0, 0.0)],
    ///     vec![3],
    /// )
    /// .unwrap();
    /// assert_eq!(filters.len(), 1);
    /// ```
    pub fn new(
        a1: Vec<Complex<f64>>,
        b0: Vec<Complex<f64>>,
        delay: Vec<u32>,
    ) -> Result<FilterSet, SpiirError> {
        if a1.len() != b0.len() || a1.len() != delay.len() {
            return Err(SpiirError::Decomposition(format!(
                "mismatched filter arrays: {} poles, {} gains, {} delays",
                a1.len(),
                b0.len(),
                delay.len()
            )));
        }
        Ok(FilterSet { a1, b0, delay })
    }

    pub fn len(&self) -> usize {
        self.delay.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delay.is_empty()
    }

    pub fn push(&mut self, a1: Complex<f64>, b0: Complex<f64>, delay: u32) {
        self.a1.push(a1);
        self.b0.push(b0);
        self.delay.push(delay);
    }

    /// Iterates over `(a1, b0, delay)` triples.
    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (Complex<f64>, Complex<f64>, u32)> + '_ {
        self.a1
            .iter()
            .zip(self.b0.iter())
            .zip(self.delay.iter())
            .map(|((a1, b0), d)| (*a1, *b0, *d))
    }

    pub fn scale_gains(&mut self, factor: f64) {
        self.b0.iter_mut().for_each(|b| *b *= factor);
    }
}

/// Turns the amplitude and unwrapped phase of a template into a filter
/// set. Smaller `epsilon` means a closer approximation with more filters.
pub trait IirDecomposer: Send + Sync {
    fn decompose(
        &self,
        amp: &[f64],
        phase: &[f64],
        epsilon: f64,
        alpha: f64,
        beta: f64,
        padding: f64,
    ) -> Result<FilterSet, SpiirError>;
}

/// Opaque state carried between optimizer calls on the same template.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OptimizerState {
    pub gains: Vec<Complex<f64>>,
}

/// Result of one optimizer call.
#[derive(Clone, Debug, PartialEq)]
pub struct Refinement {
    pub a1: Vec<Complex<f64>>,
    pub b0: Vec<Complex<f64>>,
    /// Match between the refined response and the target.
    pub overlap: f64,
    pub state: OptimizerState,
}

/// Refines filter coefficients against a target.
///
/// The target is the reversed-in-time response the filters should
/// reproduce, normalized to unit inner product. Returned gains give a
/// response normalized the same way. `passes == 0` asks for a cheap
/// estimate only.
pub trait CoefficientOptimizer: Send + Sync {
    fn refine(
        &self,
        a1: &[Complex<f64>],
        delay: &[u32],
        target: &[Complex<f64>],
        passes: usize,
        state: OptimizerState,
    ) -> Result<Refinement, SpiirError>;
}

/// Impulse response of `filters` over `length` samples.
///
/// # Examples
///
/// ```
/// use spiir_bank::iir::{iir_response, FilterSet};
/// use num::Complex;
///
/// let filters = FilterSet::new(
///     vec![Complex::new(0.5, 0.0)],
///     vec![Complex::new(2.0, 0.0)],
///     vec![1],
/// )
/// .unwrap();
/// let response = iir_response(4, &filters);
/// assert_eq!(response[0], Complex::new(0.0, 0.0));
/// assert_eq!(response[1], Complex::new(2.0, 0.0));
/// assert_eq!(response[3], Complex::new(0.5, 0.0));
/// ```
pub fn iir_response(length: usize, filters: &FilterSet) -> Vec<Complex<f64>> {
    let mut out = vec![Complex::zero(); length];
    for (a1, b0, delay) in filters.iter() {
        let mut value = b0;
        for sample in out.iter_mut().skip(delay as usize) {
            *sample += value;
            value *= a1;
        }
    }
    out
}

/// Impulse response reversed in time, so that it lines up sample for
/// sample with the template it approximates.
pub fn spiir_response(length: usize, filters: &FilterSet) -> Vec<Complex<f64>> {
    let mut out = iir_response(length, filters);
    out.reverse();
    out
}

#[cfg(test)]
mod test {
    use crate::iir::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_mismatched_arrays() {
        let res = FilterSet::new(vec![Complex::zero()], vec![], vec![0]);
        assert!(res.is_err());
    }

    #[test]
    fn test_response_sums_filters() {
        let mut filters = FilterSet::default();
        filters.push(Complex::new(0.0, 1.0), Complex::new(1.0, 0.0), 0);
        filters.push(Complex::new(0.5, 0.0), Complex::new(1.0, 0.0), 2);
        let response = iir_response(5, &filters);
        assert_eq!(response[0], Complex::new(1.0, 0.0));
        assert_eq!(response[1], Complex::new(0.0, 1.0));
        assert_eq!(response[2], Complex::new(0.0, 0.0));
        assert_eq!(response[3], Complex::new(0.5, -1.0));
        assert_approx_eq!(response[4].re, 1.25);

        let reversed = spiir_response(5, &filters);
        assert_eq!(reversed[4], response[0]);
        assert_eq!(reversed[0], response[4]);
    }

    #[test]
    fn test_delay_past_length() {
        let mut filters = FilterSet::default();
        filters.push(Complex::new(0.5, 0.0), Complex::new(1.0, 0.0), 10);
        let response = iir_response(4, &filters);
        assert!(response.iter().all(|x| x.is_zero()));
    }

    #[test]
    fn test_scale_gains() {
        let mut filters = FilterSet::default();
        filters.push(Complex::new(0.5, 0.0), Complex::new(1.0, 2.0), 0);
        filters.scale_gains(2.0);
        assert_eq!(filters.b0[0], Complex::new(2.0, 4.0));
        assert_eq!(filters.iter().count(), 1);
    }
}
