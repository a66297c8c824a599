//! Waveform series types and the generator interface.

use num::Complex;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::fft::real_forward;
use crate::template::{ChirpBound, PostNewtonianBound, Template};
use crate::template::{C_SI, MTSUN_SI, PC_SI};
use crate::util::SpiirError;

/// Domain in which a generator is asked to produce its waveform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Domain {
    Time,
    Frequency,
}

/// One-sided frequency series of a real signal.
///
/// Bin `k` holds frequency `k * delta_f`. The inverse transform covers
/// `[epoch, epoch + 1 / delta_f)` seconds, with the merger at time zero.
#[derive(Clone, Debug, PartialEq)]
pub struct FrequencySeries {
    pub epoch: f64,
    pub delta_f: f64,
    pub data: Vec<Complex<f64>>,
}

/// Real time series whose first sample sits at `epoch` seconds relative to
/// merger.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeries {
    pub epoch: f64,
    pub delta_t: f64,
    pub data: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Waveform {
    Frequency(FrequencySeries),
    Time(TimeSeries),
}

/// What the bank builder asks a generator for.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaveformRequest {
    pub f_low: f64,
    pub f_high: f64,
    pub sample_rate: f64,
    /// Duration of the working buffer; frequency-domain output must use
    /// `delta_f = 1 / duration` and hold `duration * sample_rate / 2 + 1`
    /// bins.
    pub duration: f64,
    pub domain: Domain,
}

/// Synthesizes the strain of a template at a canonical distance of 1 Mpc.
pub trait WaveformGenerator: Send + Sync {
    fn generate(
        &self,
        template: &Template,
        request: &WaveformRequest,
    ) -> Result<Waveform, SpiirError>;
}

/// Restricted post-Newtonian inspiral chirp.
///
/// The phase and frequency follow the 2PN expansions in the dimensionless
/// time-to-merger `theta`, and the amplitude is the leading quadrupole
/// term. The waveform stops once the frequency would pass `f_high` or stop
/// increasing. Spins are ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct NewtonianChirpGenerator;

impl NewtonianChirpGenerator {
    fn theta(eta: f64, mtot: f64, t: f64) -> f64 {
        eta / (5.0 * mtot * MTSUN_SI) * -t
    }

    fn freq(eta: f64, mtot: f64, t: f64) -> f64 {
        let theta = Self::theta(eta, mtot, t);
        1.0 / (8.0 * MTSUN_SI * PI * mtot)
            * (theta.powf(-3.0 / 8.0)
                + (743.0 / 2688.0 + 11.0 / 32.0 * eta) * theta.powf(-5.0 / 8.0)
                - 3.0 * PI / 10.0 * theta.powf(-3.0 / 4.0)
                + (1_855_099.0 / 14_450_688.0
                    + 56975.0 / 258_048.0 * eta
                    + 371.0 / 2048.0 * eta * eta)
                    * theta.powf(-7.0 / 8.0))
    }

    fn phase(eta: f64, mtot: f64, t: f64) -> f64 {
        let theta = Self::theta(eta, mtot, t);
        -2.0 / eta
            * (theta.powf(5.0 / 8.0)
                + (3715.0 / 8064.0 + 55.0 / 96.0 * eta) * theta.powf(3.0 / 8.0)
                - 3.0 * PI / 4.0 * theta.powf(1.0 / 4.0)
                + (9_275_495.0 / 14_450_688.0
                    + 284_875.0 / 258_048.0 * eta
                    + 1855.0 / 2048.0 * eta * eta)
                    * theta.powf(1.0 / 8.0))
    }

    fn amp(eta: f64, mtot: f64, t: f64) -> f64 {
        let theta = Self::theta(eta, mtot, t);
        let f = 1.0 / (8.0 * MTSUN_SI * PI * mtot) * theta.powf(-3.0 / 8.0);
        let mpc = 1e6 * PC_SI;
        -4.0 / mpc
            * MTSUN_SI
            * C_SI
            * (eta * mtot)
            * (MTSUN_SI * PI * mtot * f).powf(2.0 / 3.0)
    }

    /// Time before merger at which the chirp passes `f_low`.
    fn start_time(eta: f64, mtot: f64, f_low: f64, m1: f64, m2: f64) -> f64 {
        let bound = PostNewtonianBound.chirp_time(f_low, m1, m2, 0.0);
        let mut lo = -2.0 * bound;
        let mut hi = -1e-6;
        for _ in 0..100 {
            let mid = 0.5 * (lo + hi);
            if Self::freq(eta, mtot, mid) < f_low {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Generates the plus polarization sampled at `sample_rate`.
    pub fn time_series(
        &self,
        template: &Template,
        f_low: f64,
        f_high: f64,
        sample_rate: f64,
    ) -> Result<TimeSeries, SpiirError> {
        if !(f_low > 0.0) || !(f_high > f_low) || !(sample_rate > 0.0) {
            return Err(SpiirError::Generator(format!(
                "bad band [{}, {}] Hz at {} Hz",
                f_low, f_high, sample_rate
            )));
        }
        let mtot = template.total_mass();
        let eta = template.eta();
        let dt = 1.0 / sample_rate;
        let t_start =
            Self::start_time(eta, mtot, f_low, template.mass1, template.mass2);

        let mut data = Vec::new();
        let mut prev_f = 0.0;
        let mut t = t_start;
        while t < -dt {
            let f = Self::freq(eta, mtot, t);
            if !f.is_finite() || f > f_high || f < prev_f {
                break;
            }
            let h = Self::amp(eta, mtot, t) * Self::phase(eta, mtot, t).cos();
            data.push(h);
            prev_f = f;
            t = t_start + data.len() as f64 * dt;
        }
        if data.is_empty() {
            return Err(SpiirError::Generator(format!(
                "template {} has no samples in band",
                template.index
            )));
        }
        Ok(TimeSeries {
            epoch: t_start,
            delta_t: dt,
            data,
        })
    }
}

impl WaveformGenerator for NewtonianChirpGenerator {
    fn generate(
        &self,
        template: &Template,
        request: &WaveformRequest,
    ) -> Result<Waveform, SpiirError> {
        let series = self.time_series(
            template,
            request.f_low,
            request.f_high,
            request.sample_rate,
        )?;
        match request.domain {
            Domain::Time => Ok(Waveform::Time(series)),
            Domain::Frequency => {
                let n =
                    (request.duration * request.sample_rate).round() as usize;
                if series.data.len() > n {
                    return Err(SpiirError::Generator(format!(
                        "template {} is longer than {} samples",
                        template.index, n
                    )));
                }
                let mut buf = vec![0.0; n];
                buf[n - series.data.len()..].copy_from_slice(&series.data);
                let data = real_forward(&buf)
                    .into_iter()
                    .map(|x| x * series.delta_t)
                    .collect();
                Ok(Waveform::Frequency(FrequencySeries {
                    epoch: series.epoch
                        - (n - series.data.len()) as f64 * series.delta_t,
                    delta_f: 1.0 / request.duration,
                    data,
                }))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::template::waveform::*;

    #[test]
    fn test_chirp_sweeps_up() {
        let template = Template::new(0, 10.0, 10.0);
        let series = NewtonianChirpGenerator
            .time_series(&template, 40.0, 256.0, 1024.0)
            .unwrap();
        assert!(series.epoch < 0.0);
        assert!(series.data.len() > 512);
        // The chirp ends before merger.
        let end = series.epoch + series.data.len() as f64 * series.delta_t;
        assert!(end <= 0.0);
    }

    #[test]
    fn test_frequency_domain_matches_request() {
        let template = Template::new(0, 10.0, 10.0);
        let request = WaveformRequest {
            f_low: 40.0,
            f_high: 256.0,
            sample_rate: 1024.0,
            duration: 32.0,
            domain: Domain::Frequency,
        };
        match NewtonianChirpGenerator.generate(&template, &request).unwrap() {
            Waveform::Frequency(series) => {
                assert_eq!(series.data.len(), 32 * 1024 / 2 + 1);
                assert!((series.delta_f - 1.0 / 32.0).abs() < 1e-12);
                assert!(series.epoch < -16.0);
            }
            Waveform::Time(_) => panic!("expected a frequency series"),
        }
    }

    #[test]
    fn test_rejects_bad_band() {
        let template = Template::new(0, 10.0, 10.0);
        assert!(NewtonianChirpGenerator
            .time_series(&template, 40.0, 30.0, 1024.0)
            .is_err());
    }
}
