//! Whitening and time-domain conditioning of a single template.
//!
//! A raw template (frequency or time domain) is whitened against the
//! detector PSD, turned into its analytic signal, brought back to the time
//! domain, tapered and normalized. The result is then trimmed at both ends:
//! the tail by the requested negative latency, and the head where it holds
//! only a negligible share of the template's energy. The amplitude and
//! unwrapped phase of what is left feed the IIR decomposition.

use num::Complex;
use num_traits::Zero;

use crate::bank::working_state::WorkingState;
use crate::fft::{real_forward, real_inverse, BatchFFT};
use crate::psd::Psd;
use crate::template::waveform::Waveform;
use crate::util::math::{amp_phase, cumulative_power_index, tukey_window};
use crate::util::SpiirError;

/// Samples tapered by the Tukey window, split over both ends.
pub const TAPER_SAMPLES: usize = 32;
/// Cumulative power fraction at which the terminal frequency is read off.
pub const FHIGH_POWER_FRACTION: f64 = 0.999;

/// One template after whitening and trimming.
#[derive(Clone, Debug, PartialEq)]
pub struct ConditionedWaveform {
    /// Amplitude of the trimmed template.
    pub amp: Vec<f64>,
    /// Unwrapped phase of the trimmed template, starting at zero.
    pub phase: Vec<f64>,
    /// The trimmed complex template.
    pub data: Vec<Complex<f64>>,
    /// The full whitened template, before any trimming.
    pub data_full: Vec<Complex<f64>>,
    /// Offset of the merger sample from the end of the trimmed template.
    pub epoch_index: i64,
    /// Terminal frequency of the untruncated template.
    pub fhigh: f64,
    /// Terminal frequency once the negative-latency tail is removed.
    pub fhigh_negative_latency: f64,
}

pub struct WaveformConditioner<'a> {
    psd: Option<&'a Psd>,
    sample_rate: f64,
    state: &'a WorkingState,
    negative_latency: f64,
    snr_cut: f64,
}

impl<'a> WaveformConditioner<'a> {
    /// Creates a new `WaveformConditioner`.
    ///
    /// # Arguments
    ///
    /// * `psd` - Noise PSD to whiten against; `None` skips whitening.
    /// * `sample_rate` - Sample rate of the working buffer in Hz.
    /// * `state` - Working buffer sizing shared by the whole bank.
    /// * `negative_latency` - Seconds removed from the end of the template.
    /// * `snr_cut` - Share of the template energy kept when trimming the
    ///   head, in `(0, 1]`.
    pub fn new(
        psd: Option<&'a Psd>,
        sample_rate: f64,
        state: &'a WorkingState,
        negative_latency: f64,
        snr_cut: f64,
    ) -> Result<Self, SpiirError> {
        if !(negative_latency >= 0.0) {
            return Err(SpiirError::InvalidInput(format!(
                "negative latency must be >= 0: {}",
                negative_latency
            )));
        }
        if !(snr_cut > 0.0 && snr_cut <= 1.0) {
            return Err(SpiirError::InvalidInput(format!(
                "snr_cut must be in (0, 1]: {}",
                snr_cut
            )));
        }
        if state.working_length < 2 * TAPER_SAMPLES {
            return Err(SpiirError::InvalidInput(format!(
                "working length {} is shorter than the taper",
                state.working_length
            )));
        }
        Ok(WaveformConditioner {
            psd,
            sample_rate,
            state,
            negative_latency,
            snr_cut,
        })
    }

    /// Samples dropped from the tail of the template.
    pub fn tail_cut(&self) -> usize {
        (self.negative_latency * self.sample_rate).round() as usize
    }

    pub fn condition(
        &self,
        waveform: &Waveform,
    ) -> Result<ConditionedWaveform, SpiirError> {
        let n = self.state.working_length;
        let (mut bins, merger_index) = self.spectrum(waveform)?;

        let (fhigh, fhigh_negative_latency) =
            self.terminal_frequencies(&bins)?;

        self.whiten(&mut bins);
        let mut data = self.analytic_signal(&bins);
        let window = tukey_window(n, TAPER_SAMPLES);
        let norm = (2.0 / self.state.working_duration).sqrt();
        for (x, w) in data.iter_mut().zip(window.iter()) {
            *x *= *w / norm;
        }

        // The first half only holds wraparound.
        let data_full = data.split_off(n / 2);

        let tail_cut = self.tail_cut();
        if tail_cut >= data_full.len() {
            return Err(SpiirError::InvalidInput(format!(
                "negative latency of {} s removes the whole template",
                self.negative_latency
            )));
        }
        let end = data_full.len() - tail_cut;
        let filter_start =
            cumulative_power_index(&data_full, 1.0 - self.snr_cut)
                .ok_or(SpiirError::ZeroNorm("whitened template"))?;
        if filter_start >= end {
            return Err(SpiirError::InvalidInput(
                "trimming leaves no template samples".to_string(),
            ));
        }

        let cut = data_full[filter_start..end].to_vec();
        let (amp, phase) = amp_phase(&cut);

        Ok(ConditionedWaveform {
            amp,
            phase,
            data: cut,
            data_full,
            epoch_index: merger_index - n as i64 + tail_cut as i64,
            fhigh,
            fhigh_negative_latency,
        })
    }

    /// One-sided spectrum on the working grid plus the merger sample index
    /// within the working buffer.
    fn spectrum(
        &self,
        waveform: &Waveform,
    ) -> Result<(Vec<Complex<f64>>, i64), SpiirError> {
        let n = self.state.working_length;
        match waveform {
            Waveform::Frequency(series) => {
                let expected_df = self.state.delta_f();
                if series.data.len() != n / 2 + 1
                    || (series.delta_f - expected_df).abs() > 1e-9 * expected_df
                {
                    return Err(SpiirError::InvalidInput(format!(
                        "frequency series has {} bins at {} Hz, expected {} \
                         at {} Hz",
                        series.data.len(),
                        series.delta_f,
                        n / 2 + 1,
                        expected_df
                    )));
                }
                let merger = (-series.epoch * self.sample_rate) as i64;
                Ok((series.data.clone(), merger))
            }
            Waveform::Time(series) => {
                let dt = 1.0 / self.sample_rate;
                if (series.delta_t - dt).abs() > 1e-9 * dt {
                    return Err(SpiirError::InvalidInput(format!(
                        "time series sampled every {} s, expected {} s",
                        series.delta_t, dt
                    )));
                }
                let len = series.data.len();
                if len > n {
                    return Err(SpiirError::InvalidInput(format!(
                        "time series of {} samples exceeds working length {}",
                        len, n
                    )));
                }
                let mut buf = vec![0.0; n];
                buf[n - len..].copy_from_slice(&series.data);
                let bins =
                    real_forward(&buf).into_iter().map(|x| x * dt).collect();
                let offset = (-series.epoch * self.sample_rate) as i64;
                let merger = (n - len) as i64 + offset;
                Ok((bins, merger))
            }
        }
    }

    /// Frequencies below which 99.9% of the template power lies, for the
    /// full template and for the template with its negative-latency tail
    /// removed.
    pub fn terminal_frequencies(
        &self,
        bins: &[Complex<f64>],
    ) -> Result<(f64, f64), SpiirError> {
        let n = self.state.working_length;
        let idx = cumulative_power_index(bins, FHIGH_POWER_FRACTION)
            .ok_or(SpiirError::ZeroNorm("template spectrum"))?;
        let fhigh = idx as f64 * self.state.delta_f();

        let mut tdata = real_inverse(bins, n);
        apply_taper(&mut tdata);
        let tail_cut = self.tail_cut().min(n - 1);
        tdata.truncate(n - tail_cut);
        apply_taper(&mut tdata);

        let fdata = real_forward(&tdata);
        let idx = cumulative_power_index(&fdata, FHIGH_POWER_FRACTION)
            .ok_or(SpiirError::ZeroNorm("truncated template spectrum"))?;
        let fhigh_negative_latency =
            idx as f64 * self.sample_rate / tdata.len() as f64;

        Ok((fhigh, fhigh_negative_latency))
    }

    fn whiten(&self, bins: &mut [Complex<f64>]) {
        if let Some(psd) = self.psd {
            let df = self.state.delta_f();
            for (k, bin) in bins.iter_mut().enumerate() {
                *bin *= psd.whitening_weight(k as f64 * df, df);
            }
        }
    }

    /// Time series whose real part is the template and whose imaginary part
    /// is its quadrature phase: DC, Nyquist and negative frequencies are
    /// dropped, positive frequencies doubled.
    fn analytic_signal(&self, bins: &[Complex<f64>]) -> Vec<Complex<f64>> {
        let n = self.state.working_length;
        let mut spectrum = vec![Complex::zero(); n];
        for k in 1..(n + 1) / 2 {
            if let Some(bin) = bins.get(k) {
                spectrum[k] = 2.0 * bin;
            }
        }
        let df = self.state.delta_f();
        BatchFFT::new(n)
            .run_ifft(&spectrum)
            .into_iter()
            .map(|x| x * df)
            .collect()
    }
}

fn apply_taper(data: &mut [f64]) {
    let window = tukey_window(data.len(), TAPER_SAMPLES);
    data.iter_mut().zip(window.iter()).for_each(|(x, w)| *x *= w);
}
