//! Autocorrelation kernels for the signal-consistency veto.
//!
//! The kernel of a template is the normalized cross-correlation between the
//! whitened template and its SPIIR response, cut to a fixed odd length
//! around the correlation peak.

use log::debug;
use num::Complex;

use crate::fft::cross_correlate;
use crate::util::math::pad_front;
use crate::util::SpiirError;

/// Cross-correlation of `a` against `b`, `length` samples around its peak,
/// divided by the peak value and stored with lags reversed.
///
/// Inputs of different lengths are both front-padded to the longer one.
/// The centre sample of the result is exactly one.
///
/// # Examples
///
/// ```
/// use spiir_bank::autocorrelation::normalized_crosscorr;
/// use num::Complex;
///
/// let a: Vec<_> = (0..64)
///     .map(|i| Complex::from_polar(1.0, 0.1 * (i * i) as f64))
///     .collect();
/// let row = normalized_crosscorr(&a, &a, 11).unwrap();
/// assert_eq!(row.len(), 11);
/// assert!((row[5] - Complex::new(1.0, 0.0)).norm() < 1e-12);
/// ```
pub fn normalized_crosscorr(
    a: &[Complex<f64>],
    b: &[Complex<f64>],
    length: usize,
) -> Result<Vec<Complex<f64>>, SpiirError> {
    if length % 2 == 0 {
        return Err(SpiirError::InvalidInput(format!(
            "autocorrelation length must be odd: {}",
            length
        )));
    }
    let n = a.len().max(b.len());
    if length > n {
        return Err(SpiirError::InsufficientAutocorrelationData {
            peak: 0,
            length,
            available: n,
        });
    }
    let corr = cross_correlate(&pad_front(a, n), &pad_front(b, n));
    let half = length / 2;

    let window: Vec<_> = match argmax(&corr) {
        0 => corr[n - half..]
            .iter()
            .chain(corr[..=half].iter())
            .cloned()
            .collect(),
        peak => {
            debug!("correlation peaks at lag {}", peak);
            // Rotate zero lag to the middle and look again.
            let shift = (n - 1) / 2;
            let rolled: Vec<_> = corr[n - shift..]
                .iter()
                .chain(corr[..n - shift].iter())
                .cloned()
                .collect();
            let peak = argmax(&rolled);
            if peak < half || peak + half + 1 > n {
                return Err(SpiirError::InsufficientAutocorrelationData {
                    peak,
                    length,
                    available: n,
                });
            }
            rolled[peak - half..=peak + half].to_vec()
        }
    };

    let norm = window[half];
    if !(norm.norm() > 0.0) {
        return Err(SpiirError::ZeroNorm("cross-correlation peak"));
    }
    Ok(window.iter().rev().map(|x| x / norm).collect())
}

/// Mask selecting the kernel samples used by the veto. Every sample is
/// used.
pub fn autocorrelation_mask(length: usize) -> Vec<i32> {
    vec![1; length]
}

fn argmax(data: &[Complex<f64>]) -> usize {
    let mut best = 0;
    let mut best_norm = std::f64::NEG_INFINITY;
    for (i, x) in data.iter().enumerate() {
        let norm = x.norm();
        if norm > best_norm {
            best = i;
            best_norm = norm;
        }
    }
    best
}
