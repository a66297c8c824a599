//! FFT helpers used for whitening, terminal-frequency estimation and
//! correlation.

use num::Complex;
use num_traits::Zero;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Batch based wrapper of FFT implementation provided by
/// [RustFFT](https://github.com/ejmahler/RustFFT).
///
/// Holds a forward and an inverse plan for one transform size. Neither
/// direction is normalized; callers apply the scaling their convention
/// needs.
pub struct BatchFFT {
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    pub fft_size: usize,
}

impl BatchFFT {
    /// Creates a new `BatchFFT` for transforms of `fft_size` samples.
    ///
    /// # Examples
    ///
    /// ```
    /// use spiir_bank::fft::BatchFFT;
    ///
    /// let batch_fft = BatchFFT::new(1024);
    /// assert_eq!(batch_fft.fft_size, 1024);
    /// ```
    pub fn new(fft_size: usize) -> BatchFFT {
        let mut planner = FftPlanner::new();
        BatchFFT {
            forward: planner.plan_fft_forward(fft_size),
            inverse: planner.plan_fft_inverse(fft_size),
            fft_size,
        }
    }

    /// Runs the forward transform on a copy of `data`, zero-padding or
    /// truncating it to the plan size.
    ///
    /// # Examples
    ///
    /// ```
    /// use spiir_bank::fft::BatchFFT;
    /// use num::Complex;
    ///
    /// let batch_fft = BatchFFT::new(8);
    /// let spectrum = batch_fft.run_fft(&[Complex::new(1.0, 0.0)]);
    /// assert_eq!(spectrum, vec![Complex::new(1.0, 0.0); 8]);
    /// ```
    pub fn run_fft(&self, data: &[Complex<f64>]) -> Vec<Complex<f64>> {
        let mut buf = self.resized(data);
        self.forward.process(&mut buf);
        buf
    }

    /// Runs the unnormalized inverse transform on a copy of `data`.
    pub fn run_ifft(&self, data: &[Complex<f64>]) -> Vec<Complex<f64>> {
        let mut buf = self.resized(data);
        self.inverse.process(&mut buf);
        buf
    }

    fn resized(&self, data: &[Complex<f64>]) -> Vec<Complex<f64>> {
        let mut buf = vec![Complex::zero(); self.fft_size];
        let n = data.len().min(self.fft_size);
        buf[..n].copy_from_slice(&data[..n]);
        buf
    }
}

/// Forward transform of a real series, returning the `n / 2 + 1`
/// non-negative frequency bins.
pub fn real_forward(data: &[f64]) -> Vec<Complex<f64>> {
    let n = data.len();
    if n == 0 {
        return Vec::new();
    }
    let input: Vec<_> = data.iter().map(|&x| Complex::new(x, 0.0)).collect();
    let mut out = BatchFFT::new(n).run_fft(&input);
    out.truncate(n / 2 + 1);
    out
}

/// Inverse of `real_forward` for a real series of `n` samples, normalized
/// by `1 / n`.
///
/// The imaginary parts of the DC and (for even `n`) Nyquist bins are
/// ignored, as a real series cannot carry them.
pub fn real_inverse(bins: &[Complex<f64>], n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let mut full = vec![Complex::zero(); n];
    for (k, bin) in bins.iter().enumerate().take(n / 2 + 1) {
        full[k] = *bin;
        if k > 0 && k < n - k {
            full[n - k] = bin.conj();
        }
    }
    full[0].im = 0.0;
    if n % 2 == 0 {
        full[n / 2].im = 0.0;
    }
    BatchFFT::new(n)
        .run_ifft(&full)
        .iter()
        .map(|x| x.re / n as f64)
        .collect()
}

/// Circular cross-correlation `ifft(fft(a) * conj(fft(b)))`, normalized by
/// the transform length.
///
/// Both inputs are zero-padded to the length of the longer one; lag zero is
/// index zero of the output.
pub fn cross_correlate(
    a: &[Complex<f64>],
    b: &[Complex<f64>],
) -> Vec<Complex<f64>> {
    let n = a.len().max(b.len());
    if n == 0 {
        return Vec::new();
    }
    let batch_fft = BatchFFT::new(n);
    let fa = batch_fft.run_fft(a);
    let fb = batch_fft.run_fft(b);
    let product: Vec<_> =
        fa.iter().zip(fb.iter()).map(|(x, y)| x * y.conj()).collect();
    batch_fft
        .run_ifft(&product)
        .iter()
        .map(|x| *x / n as f64)
        .collect()
}

#[cfg(test)]
mod test {
    use crate::fft::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_real_transform_inverts() {
        let data: Vec<f64> =
            (0..64).map(|x| (0.3 * x as f64).sin() + 0.1).collect();
        let bins = real_forward(&data);
        assert_eq!(bins.len(), 33);
        let back = real_inverse(&bins, data.len());
        for (x, y) in data.iter().zip(back.iter()) {
            assert_approx_eq!(x, y, 1e-12);
        }
    }

    #[test]
    fn test_real_transform_odd_length() {
        let data: Vec<f64> = (0..15).map(|x| (x as f64).cos()).collect();
        let back = real_inverse(&real_forward(&data), data.len());
        for (x, y) in data.iter().zip(back.iter()) {
            assert_approx_eq!(x, y, 1e-12);
        }
    }

    #[test]
    fn test_cross_correlate_peak_at_lag() {
        let a: Vec<_> = (0..32)
            .map(|x| Complex::new(0.0, 0.7 * (x * x) as f64 / 32.0).exp())
            .collect();
        let mut b = vec![Complex::zero(); 32];
        b[..29].copy_from_slice(&a[3..]);
        let corr = cross_correlate(&a, &b);
        let peak = corr
            .iter()
            .enumerate()
            .max_by(|x, y| x.1.norm().partial_cmp(&y.1.norm()).unwrap())
            .unwrap()
            .0;
        assert_eq!(peak, 3);
    }
}
