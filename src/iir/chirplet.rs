use num::Complex;

use crate::iir::{FilterSet, IirDecomposer};
use crate::util::SpiirError;

/// Curvature floor, so that a template with perfectly linear phase still
/// gets finite segments.
const MIN_CURVATURE: f64 = 1e-12;

/// Reference decomposition that covers the template with chirplets.
///
/// Walking backwards from the last sample, each filter covers a segment
/// over which the phase deviates from a straight line by at most
/// `epsilon` radians. Its pole rotates at the local frequency and decays
/// over roughly `padding` segment lengths, scaled by `beta`. Its gain
/// carries the local amplitude and phase, scaled by `alpha`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChirpletDecomposer;

impl ChirpletDecomposer {
    fn frequency(phase: &[f64], j: usize) -> f64 {
        let last = phase.len() - 1;
        match j {
            _ if last == 0 => 0.0,
            0 => phase[1] - phase[0],
            _ if j == last => phase[last] - phase[last - 1],
            _ => 0.5 * (phase[j + 1] - phase[j - 1]),
        }
    }

    fn curvature(phase: &[f64], j: usize) -> f64 {
        let last = phase.len() - 1;
        if last < 2 {
            return 0.0;
        }
        let j = j.max(1).min(last - 1);
        phase[j + 1] - 2.0 * phase[j] + phase[j - 1]
    }
}

impl IirDecomposer for ChirpletDecomposer {
    fn decompose(
        &self,
        amp: &[f64],
        phase: &[f64],
        epsilon: f64,
        alpha: f64,
        beta: f64,
        padding: f64,
    ) -> Result<FilterSet, SpiirError> {
        if amp.len() != phase.len() {
            return Err(SpiirError::Decomposition(format!(
                "amplitude has {} samples but phase has {}",
                amp.len(),
                phase.len()
            )));
        }
        if !(epsilon > 0.0) || !(beta > 0.0) || !(padding > 0.0) {
            return Err(SpiirError::Decomposition(format!(
                "epsilon {}, beta {} and padding {} must be positive",
                epsilon, beta, padding
            )));
        }
        let length = amp.len();
        let mut filters = FilterSet::default();
        if length == 0 {
            return Ok(filters);
        }

        let mut j = length - 1;
        loop {
            let curvature =
                Self::curvature(phase, j).abs().max(MIN_CURVATURE);
            let seg = ((2.0 * epsilon / curvature).sqrt().ceil() as usize)
                .max(1)
                .min(j + 1);

            if amp[j] > 0.0 {
                let mid = j - (seg - 1) / 2;
                let omega = Self::frequency(phase, mid);
                let r = (-beta / (padding * seg as f64)).exp();
                let a1 = Complex::from_polar(r, -omega);
                let b0 = Complex::from_polar(
                    alpha * amp[j] * (1.0 - r.powi(seg as i32)),
                    phase[j],
                );
                filters.push(a1, b0, (length - 1 - j) as u32);
            }

            if seg > j {
                break;
            }
            j -= seg;
        }
        Ok(filters)
    }
}
