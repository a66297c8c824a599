use serde::{Deserialize, Serialize};

use crate::search::SearchParams;
use crate::template::waveform::Domain;
use crate::template::Template;
use crate::util::SpiirError;

/// Every tunable of a bank build.
///
/// Missing fields take their defaults when deserializing, so a partial
/// configuration only needs to name what it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankConfig {
    /// Nominal low-frequency cutoff in Hz. Also the lowest frequency the
    /// slowest decimated rate must cover.
    pub flower: f64,
    /// Full sample rate in Hz. Inferred from the templates' terminal
    /// frequencies when absent.
    pub sample_rate: Option<u32>,
    /// Seconds removed before merger so that triggers can fire early.
    pub negative_latency: f64,
    /// Share of the template energy kept when trimming its start.
    pub snr_cut: f64,
    pub autocorrelation_length: usize,
    /// Spread the filters over several sample rates.
    pub downsample: bool,
    /// Domain requested from the waveform generator.
    pub domain: Domain,
    pub search: SearchParams,
}

impl Default for BankConfig {
    fn default() -> Self {
        BankConfig {
            flower: 15.0,
            sample_rate: None,
            negative_latency: 0.0,
            snr_cut: 0.998,
            autocorrelation_length: 201,
            downsample: false,
            domain: Domain::Frequency,
            search: SearchParams::default(),
        }
    }
}

impl BankConfig {
    /// Checks every setting that would otherwise abort the build halfway.
    ///
    /// # Examples
    ///
    /// ```
    /// use spiir_bank::bank::config::BankConfig;
    ///
    /// let mut config = BankConfig::default();
    /// assert!(config.validate().is_ok());
    /// config.autocorrelation_length = 200;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), SpiirError> {
        if !(self.flower > 0.0) {
            return Err(SpiirError::InvalidInput(format!(
                "flower must be > 0: {}",
                self.flower
            )));
        }
        if self.sample_rate == Some(0) {
            return Err(SpiirError::InvalidInput(
                "sample rate must be > 0".to_string(),
            ));
        }
        if !(self.negative_latency >= 0.0) {
            return Err(SpiirError::InvalidInput(format!(
                "negative latency must be >= 0: {}",
                self.negative_latency
            )));
        }
        if !(self.snr_cut > 0.0 && self.snr_cut <= 1.0) {
            return Err(SpiirError::InvalidInput(format!(
                "snr_cut must be in (0, 1]: {}",
                self.snr_cut
            )));
        }
        if self.autocorrelation_length % 2 == 0 {
            return Err(SpiirError::InvalidInput(format!(
                "autocorrelation length must be odd: {}",
                self.autocorrelation_length
            )));
        }
        self.search.validate()
    }

    /// The configured sample rate, or twice the power of two above the
    /// highest terminal frequency in the bank.
    pub fn resolve_sample_rate(
        &self,
        templates: &[Template],
    ) -> Result<u32, SpiirError> {
        if let Some(rate) = self.sample_rate {
            return Ok(rate);
        }
        let mut f_max: f64 = 0.0;
        for template in templates {
            match template.f_final {
                Some(f) if f > 0.0 && f.is_finite() => f_max = f_max.max(f),
                _ => {
                    return Err(SpiirError::InvalidInput(format!(
                        "no sample rate given and template {} has no usable \
                         f_final",
                        template.index
                    )))
                }
            }
        }
        if !(f_max > 0.0) {
            return Err(SpiirError::InvalidInput(
                "template list is empty".to_string(),
            ));
        }
        let exponent = f_max.log2().ceil() + 1.0;
        if exponent > 31.0 {
            return Err(SpiirError::InvalidInput(format!(
                "terminal frequency {} Hz is too high",
                f_max
            )));
        }
        Ok(2f64.powi(exponent.max(0.0) as i32) as u32)
    }
}

#[cfg(test)]
mod test {
    use crate::bank::config::*;

    #[test]
    fn test_defaults() {
        let config = BankConfig::default();
        assert_eq!(config.flower, 15.0);
        assert_eq!(config.search.padding, 1.3);
        assert_eq!(config.search.epsilon_start, 0.02);
        assert_eq!(config.search.nround_max, 10);
        assert_eq!(config.autocorrelation_length, 201);
        assert!(!config.downsample);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let mut config = BankConfig::default();
        config.flower = 30.0;
        config.downsample = true;
        let bytes = serde_cbor::to_vec(&config).unwrap();
        let back: BankConfig = serde_cbor::from_slice(&bytes).unwrap();
        assert_eq!(back, config);

        let empty = serde_cbor::to_vec(&serde_cbor::Value::Map(
            Default::default(),
        ))
        .unwrap();
        let defaulted: BankConfig = serde_cbor::from_slice(&empty).unwrap();
        assert_eq!(defaulted, BankConfig::default());
    }

    #[test]
    fn test_validate() {
        let mut config = BankConfig::default();
        config.snr_cut = 0.0;
        assert!(config.validate().is_err());
        let mut config = BankConfig::default();
        config.flower = -1.0;
        assert!(config.validate().is_err());
        let mut config = BankConfig::default();
        config.search.nround_max = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sample_rate_inference() {
        let config = BankConfig::default();
        let templates = vec![
            Template::new(0, 10.0, 10.0).with_f_final(200.0),
            Template::new(1, 5.0, 5.0).with_f_final(400.0),
        ];
        assert_eq!(config.resolve_sample_rate(&templates).unwrap(), 1024);

        let missing = vec![Template::new(0, 10.0, 10.0)];
        assert!(config.resolve_sample_rate(&missing).is_err());

        let mut fixed = BankConfig::default();
        fixed.sample_rate = Some(2048);
        assert_eq!(fixed.resolve_sample_rate(&missing).unwrap(), 2048);
    }
}
