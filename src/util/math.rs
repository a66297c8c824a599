use num::Complex;
use std::f64::consts::PI;

use crate::util::SpiirError;

/// Rounds `x` up to the nearest power of two. Zero rounds to one.
pub fn ceil_pow_2(x: usize) -> usize {
    x.max(1).next_power_of_two()
}

/// Inner product `sum(a * conj(b))`.
pub fn vdot(a: &[Complex<f64>], b: &[Complex<f64>]) -> Complex<f64> {
    a.iter().zip(b.iter()).map(|(x, y)| x * y.conj()).sum()
}

/// Sum of squared magnitudes.
pub fn energy(data: &[Complex<f64>]) -> f64 {
    data.iter().map(|x| x.norm_sqr()).sum()
}

/// Scales `data` in place so that its inner product with itself equals
/// `target`, returning the scale factor that was applied.
///
/// Zero-energy input is rejected rather than divided by.
pub fn normalize_to(
    data: &mut [Complex<f64>],
    target: f64,
    what: &'static str,
) -> Result<f64, SpiirError> {
    let norm = energy(data);
    if !(norm > 0.0) || !norm.is_finite() {
        return Err(SpiirError::ZeroNorm(what));
    }
    let scale = (target / norm).sqrt();
    data.iter_mut().for_each(|x| *x *= scale);
    Ok(scale)
}

/// Copies `data` into the tail of a zeroed buffer of `length` samples.
///
/// If `data` is longer than `length` only its last `length` samples are
/// kept.
pub fn pad_front(data: &[Complex<f64>], length: usize) -> Vec<Complex<f64>> {
    let mut out = vec![Complex::new(0.0, 0.0); length];
    let n = data.len().min(length);
    out[length - n..].copy_from_slice(&data[data.len() - n..]);
    out
}

/// Index of the first element at which the running fraction of the total
/// power reaches `fraction`.
///
/// Returns `None` for zero-energy input.
pub fn cumulative_power_index(
    data: &[Complex<f64>],
    fraction: f64,
) -> Option<usize> {
    let total = energy(data);
    if !(total > 0.0) || !total.is_finite() {
        return None;
    }
    let mut acc = 0.0;
    for (i, x) in data.iter().enumerate() {
        acc += x.norm_sqr();
        if acc / total >= fraction {
            return Some(i);
        }
    }
    Some(data.len() - 1)
}

/// Splits a complex series into amplitude and unwrapped phase.
///
/// Jumps of at least PI between neighbouring samples are treated as wraps,
/// and the phase is offset so that it starts at zero.
pub fn amp_phase(data: &[Complex<f64>]) -> (Vec<f64>, Vec<f64>) {
    let amp = data.iter().map(|x| x.norm()).collect();

    let mut phase = Vec::with_capacity(data.len());
    let mut count = 0.0;
    let mut prev: Option<f64> = None;
    for x in data {
        let val = x.im.atan2(x.re);
        if let Some(p) = prev {
            if p - val >= PI {
                count += 1.0;
            } else if val - p >= PI {
                count -= 1.0;
            }
        }
        phase.push(val + count * 2.0 * PI);
        prev = Some(val);
    }
    if let Some(&first) = phase.first() {
        phase.iter_mut().for_each(|p| *p -= first);
    }
    (amp, phase)
}

/// Tukey window of `length` samples whose tapered part spans `taper`
/// samples in total, split evenly between both ends.
///
/// Tapers use a sin^2 ramp that reaches zero at the end points.
pub fn tukey_window(length: usize, taper: usize) -> Vec<f64> {
    if length < 2 {
        return vec![1.0; length];
    }
    let beta = (taper as f64 / length as f64).min(1.0);
    if beta <= 0.0 {
        return vec![1.0; length];
    }
    let span = (length - 1) as f64;
    (0..length)
        .map(|i| {
            let y = (2.0 * i as f64 / span - 1.0).abs();
            if y >= 1.0 - beta {
                let s = (PI / 2.0 * (1.0 - y) / beta).sin();
                s * s
            } else {
                1.0
            }
        })
        .collect()
}

/// Chirp mass of a binary with component masses `m1`, `m2`.
pub fn chirp_mass(m1: f64, m2: f64) -> f64 {
    (m1 * m2).powf(0.6) / (m1 + m2).powf(0.2)
}

/// Symmetric mass ratio of a binary with component masses `m1`, `m2`.
pub fn symmetric_mass_ratio(m1: f64, m2: f64) -> f64 {
    m1 * m2 / ((m1 + m2) * (m1 + m2))
}
