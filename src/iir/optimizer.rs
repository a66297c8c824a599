use num::Complex;
use num_traits::Zero;

use crate::iir::{CoefficientOptimizer, OptimizerState, Refinement};
use crate::util::math::{energy, vdot};
use crate::util::SpiirError;

/// Least-squares gain fit for fixed poles and delays.
///
/// With no passes each gain is the projection of the target onto its own
/// filter response. Every pass is one Gauss-Seidel sweep that refits each
/// gain against the residual left by all the others, starting from the
/// gains carried in the state when they match the filter count. Poles are
/// returned unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct GainFitOptimizer;

/// Unit-gain response of one filter, reversed and aligned to the end of a
/// `length` sample buffer, handed to `f` as `(index, value)` pairs.
fn for_each_basis<F>(a1: Complex<f64>, delay: u32, length: usize, mut f: F)
where
    F: FnMut(usize, Complex<f64>),
{
    let delay = delay as usize;
    if delay >= length {
        return;
    }
    let mut value = Complex::new(1.0, 0.0);
    for idx in (0..length - delay).rev() {
        f(idx, value);
        value *= a1;
        if value.norm_sqr() < 1e-300 {
            break;
        }
    }
}

fn basis_dot(a1: Complex<f64>, delay: u32, v: &[Complex<f64>]) -> Complex<f64> {
    let mut acc = Complex::zero();
    for_each_basis(a1, delay, v.len(), |i, b| acc += v[i] * b.conj());
    acc
}

fn basis_energy(a1: Complex<f64>, delay: u32, length: usize) -> f64 {
    let mut acc = 0.0;
    for_each_basis(a1, delay, length, |_, b| acc += b.norm_sqr());
    acc
}

fn add_basis(
    a1: Complex<f64>,
    delay: u32,
    coeff: Complex<f64>,
    v: &mut [Complex<f64>],
) {
    let length = v.len();
    for_each_basis(a1, delay, length, |i, b| v[i] += coeff * b);
}

impl CoefficientOptimizer for GainFitOptimizer {
    fn refine(
        &self,
        a1: &[Complex<f64>],
        delay: &[u32],
        target: &[Complex<f64>],
        passes: usize,
        state: OptimizerState,
    ) -> Result<Refinement, SpiirError> {
        if a1.len() != delay.len() {
            return Err(SpiirError::Optimizer(format!(
                "{} poles but {} delays",
                a1.len(),
                delay.len()
            )));
        }
        let target_norm = energy(target);
        if !(target_norm > 0.0) {
            return Err(SpiirError::ZeroNorm("optimizer target"));
        }
        let norms: Vec<f64> = a1
            .iter()
            .zip(delay.iter())
            .map(|(a, d)| basis_energy(*a, *d, target.len()))
            .collect();

        let mut gains: Vec<Complex<f64>> =
            if passes > 0 && state.gains.len() == a1.len() {
                state.gains
            } else {
                a1.iter()
                    .zip(delay.iter())
                    .zip(norms.iter())
                    .map(|((a, d), n)| {
                        if *n > 0.0 {
                            basis_dot(*a, *d, target) / n
                        } else {
                            Complex::zero()
                        }
                    })
                    .collect()
            };

        let mut model = vec![Complex::zero(); target.len()];
        for ((a, d), g) in a1.iter().zip(delay.iter()).zip(gains.iter()) {
            add_basis(*a, *d, *g, &mut model);
        }

        if passes > 0 {
            // Start the sweeps from the best common scaling of the start
            // gains, so that no pass can lower the overlap.
            let start_norm = energy(&model);
            if start_norm > 0.0 {
                let c = vdot(target, &model) / start_norm;
                gains.iter_mut().for_each(|g| *g *= c);
                model.iter_mut().for_each(|m| *m *= c);
            }
            let mut residual: Vec<_> = target
                .iter()
                .zip(model.iter())
                .map(|(t, m)| t - m)
                .collect();
            for _ in 0..passes {
                for i in 0..gains.len() {
                    if !(norms[i] > 0.0) {
                        continue;
                    }
                    let step = basis_dot(a1[i], delay[i], &residual) / norms[i];
                    add_basis(a1[i], delay[i], -step, &mut residual);
                    gains[i] += step;
                }
            }
            model = target
                .iter()
                .zip(residual.iter())
                .map(|(t, r)| t - r)
                .collect();
        }

        let model_norm = energy(&model);
        if !(model_norm > 0.0) {
            return Err(SpiirError::ZeroNorm("optimized response"));
        }
        // Rescale to the unit-norm convention of the target.
        let scale = 1.0 / model_norm.sqrt();
        gains.iter_mut().for_each(|g| *g *= scale);
        let overlap =
            vdot(&model, target).norm() / (model_norm * target_norm).sqrt();

        Ok(Refinement {
            a1: a1.to_vec(),
            b0: gains.clone(),
            overlap,
            state: OptimizerState { gains },
        })
    }
}

#[cfg(test)]
mod test {
    use crate::iir::optimizer::*;
    use crate::iir::{spiir_response, FilterSet};
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn filters(rng: &mut SmallRng, count: usize) -> FilterSet {
        let mut filters = FilterSet::default();
        for i in 0..count {
            let radius = 0.9 + 0.05 * rng.gen::<f64>();
            let pole = Complex::from_polar(radius, rng.gen::<f64>());
            let gain = Complex::new(rng.gen::<f64>(), rng.gen::<f64>());
            filters.push(pole, gain, (i * 7) as u32);
        }
        filters
    }

    #[test]
    fn test_recovers_exact_target() {
        let mut rng = SmallRng::seed_from_u64(7);
        let truth = filters(&mut rng, 6);
        let mut target = spiir_response(128, &truth);
        let norm = energy(&target).sqrt();
        target.iter_mut().for_each(|x| *x /= norm);

        let state = OptimizerState::default();
        let refined = GainFitOptimizer
            .refine(&truth.a1, &truth.delay, &target, 200, state)
            .unwrap();
        assert_approx_eq!(refined.overlap, 1.0, 1e-6);

        let fitted =
            FilterSet::new(refined.a1.clone(), refined.b0.clone(), truth.delay)
                .unwrap();
        let response = spiir_response(128, &fitted);
        assert_approx_eq!(energy(&response), 1.0, 1e-9);
    }

    #[test]
    fn test_passes_improve_overlap() {
        let mut rng = SmallRng::seed_from_u64(11);
        let truth = filters(&mut rng, 8);
        let target: Vec<_> = spiir_response(96, &truth)
            .into_iter()
            .map(|x| x + Complex::new(0.0, 0.05 * rng.gen::<f64>()))
            .collect();
        let mut unit = target.clone();
        let norm = energy(&unit).sqrt();
        unit.iter_mut().for_each(|x| *x /= norm);

        let state = OptimizerState::default();
        let probe = GainFitOptimizer
            .refine(&truth.a1, &truth.delay, &unit, 0, state)
            .unwrap();
        let full = GainFitOptimizer
            .refine(&truth.a1, &truth.delay, &unit, 10, probe.state.clone())
            .unwrap();
        assert!(full.overlap >= probe.overlap - 1e-9);
        assert!(full.overlap <= 1.0 + 1e-12);
        assert_eq!(full.state.gains.len(), 8);
    }

    #[test]
    fn test_zero_target_rejected() {
        let target = vec![Complex::zero(); 16];
        let res = GainFitOptimizer.refine(
            &[Complex::new(0.5, 0.0)],
            &[0],
            &target,
            1,
            OptimizerState::default(),
        );
        assert_eq!(res, Err(SpiirError::ZeroNorm("optimizer target")));
    }
}
