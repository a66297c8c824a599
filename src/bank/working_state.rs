use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::template::{ChirpBound, Template};
use crate::util::math::ceil_pow_2;
use crate::util::SpiirError;

/// Global sizing shared read-only by every per-template stage.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkingState {
    /// Low frequency at which waveforms are generated; below the nominal
    /// `f_low` so that the longest template gets extra lead-in.
    pub working_f_low: f64,
    /// Samples in the working buffer. Twice a power of two, so the first half
    /// can be discarded to remove cyclic wraparound.
    pub working_length: usize,
    pub working_duration: f64,
    pub length_max: usize,
}

impl WorkingState {
    /// Sizes the working buffers from the template with the smallest chirp
    /// mass, which is the longest one at a fixed `f_low`.
    ///
    /// The generation frequency is lowered until that template is
    /// `1.1 * tchirp + 3 / f_low` seconds long, where `tchirp` is its chirp
    /// time from `f_low`.
    ///
    /// # Arguments
    ///
    /// * `templates` - The full template set of the bank.
    /// * `f_low` - Nominal low-frequency cutoff in Hz.
    /// * `sample_rate` - Sample rate of the working buffers in Hz.
    /// * `bound` - Chirp-time bound used to size the longest template.
    ///
    /// # Examples
    ///
    /// ```
    /// use spiir_bank::bank::working_state::WorkingState;
    /// use spiir_bank::template::{PostNewtonianBound, Template};
    ///
    /// let templates = vec![Template::new(0, 10.0, 10.0)];
    /// let state =
    ///     WorkingState::compute(&templates, 40.0, 512.0, &PostNewtonianBound)
    ///         .unwrap();
    /// assert!(state.working_f_low < 40.0);
    /// assert!(state.working_length.is_power_of_two());
    /// ```
    pub fn compute(
        templates: &[Template],
        f_low: f64,
        sample_rate: f64,
        bound: &dyn ChirpBound,
    ) -> Result<WorkingState, SpiirError> {
        if templates.is_empty() {
            return Err(SpiirError::InvalidInput(
                "template list is empty".to_string(),
            ));
        }
        if !(f_low > 0.0) {
            return Err(SpiirError::InvalidInput(format!(
                "f_low must be > 0: {}",
                f_low
            )));
        }
        if !(sample_rate > 0.0) {
            return Err(SpiirError::InvalidInput(format!(
                "sample rate must be > 0: {}",
                sample_rate
            )));
        }

        let template = longest_template(templates);
        let (m1, m2) = (template.mass1, template.mass2);

        // Spins are zeroed: the start-frequency bound does not model them.
        let tchirp = bound.chirp_time(f_low, m1, m2, 0.0);
        if !tchirp.is_finite() || tchirp <= 0.0 {
            return Err(SpiirError::InvalidInput(format!(
                "chirp time of template {} is not usable: {}",
                template.index, tchirp
            )));
        }
        let working_f_low =
            bound.start_frequency(1.1 * tchirp + 3.0 / f_low, m1, m2);

        // The lead-in is about a tenth of the longest template.
        let extra_time = 0.1 * tchirp + 1.0;
        let length_max = (extra_time * 10.0 * sample_rate).round() as usize;
        // 16 s of room for PSD ringing, then doubled for wraparound.
        let working_length = 2 * ceil_pow_2(
            length_max + ((16.0 + extra_time) * sample_rate).round() as usize,
        );
        let working_duration = working_length as f64 / sample_rate;

        Ok(WorkingState {
            working_f_low,
            working_length,
            working_duration,
            length_max,
        })
    }

    pub fn delta_f(&self) -> f64 {
        1.0 / self.working_duration
    }
}

/// Template with the smallest chirp mass. Ties resolve on total mass and
/// then `mass1`, so the choice does not depend on input order.
fn longest_template(templates: &[Template]) -> &Template {
    let key = |t: &Template| (t.chirp_mass(), t.total_mass(), t.mass1);
    templates
        .iter()
        .min_by(|a, b| {
            let (ka, kb) = (key(a), key(b));
            ka.0.partial_cmp(&kb.0)
                .unwrap_or(Ordering::Equal)
                .then(ka.1.partial_cmp(&kb.1).unwrap_or(Ordering::Equal))
                .then(ka.2.partial_cmp(&kb.2).unwrap_or(Ordering::Equal))
        })
        .unwrap_or(&templates[0])
}

#[cfg(test)]
mod test {
    use crate::bank::working_state::*;
    use crate::template::PostNewtonianBound;

    #[test]
    fn test_uses_minimum_chirp_mass() {
        let light = Template::new(0, 5.0, 5.0);
        let heavy = Template::new(1, 20.0, 20.0);
        let bound = PostNewtonianBound;

        let both = vec![light.clone(), heavy.clone()];
        let swapped = vec![heavy.clone(), light.clone()];
        let alone = vec![light];

        let a = WorkingState::compute(&both, 30.0, 1024.0, &bound).unwrap();
        let b = WorkingState::compute(&swapped, 30.0, 1024.0, &bound).unwrap();
        let c = WorkingState::compute(&alone, 30.0, 1024.0, &bound).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_sizes() {
        let templates = vec![Template::new(0, 10.0, 10.0)];
        let bound = PostNewtonianBound;
        let state =
            WorkingState::compute(&templates, 40.0, 512.0, &bound).unwrap();
        let tchirp = bound.chirp_time(40.0, 10.0, 10.0, 0.0);
        let expected_max = ((0.1 * tchirp + 1.0) * 10.0 * 512.0).round();
        assert_eq!(state.length_max, expected_max as usize);
        assert!(state.working_length >= 2 * state.length_max);
        assert!((state.working_length / 2).is_power_of_two());
        assert!(
            (state.working_duration * 512.0 - state.working_length as f64)
                .abs()
                < 1e-9
        );
    }

    #[test]
    fn test_rejects_bad_input() {
        let bound = PostNewtonianBound;
        assert!(WorkingState::compute(&[], 40.0, 512.0, &bound).is_err());
        let templates = vec![Template::new(0, 10.0, 10.0)];
        assert!(
            WorkingState::compute(&templates, -1.0, 512.0, &bound).is_err()
        );
    }
}
