//! Building a complete SPIIR template bank.
//!
//! `BankBuilder::build` sizes the working buffers once for the whole bank,
//! runs every template through conditioning, the tolerance search,
//! decimation and the autocorrelation kernel in parallel, and finally
//! reduces the per-template results into the bank matrices on the calling
//! thread.

use log::{info, warn};
use num::Complex;
use num_traits::Zero;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::io::{Read, Write};

use crate::autocorrelation::{autocorrelation_mask, normalized_crosscorr};
use crate::bank::assembler::{BankAssembler, Matrix, RateMatrices};
use crate::bank::config::BankConfig;
use crate::bank::observer::{BankObserver, TemplateSummary};
use crate::bank::working_state::WorkingState;
use crate::condition::WaveformConditioner;
use crate::decimate::{Decimator, DownsampledFilterGroup};
use crate::iir::{CoefficientOptimizer, FilterSet, IirDecomposer};
use crate::psd::Psd;
use crate::search::{EpsilonSearchController, SearchStatus};
use crate::template::waveform::{WaveformGenerator, WaveformRequest};
use crate::template::{ChirpBound, Template};
use crate::util::math::{ceil_pow_2, energy, pad_front};
use crate::util::SpiirError;

pub mod assembler;
pub mod config;
pub mod observer;
pub mod working_state;

/// Template parameters as written to the bank.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateRow {
    pub template: Template,
    /// Time of the last filtered sample relative to merger, in seconds.
    pub end_time: f64,
    /// Terminal frequency of the template once truncated for negative
    /// latency.
    pub f_final: f64,
}

/// How a template fared.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateStatus {
    pub search: SearchStatus,
    pub epsilon: f64,
    pub rounds: usize,
    pub n_filters: usize,
    /// Why the autocorrelation row is left empty, if it is.
    pub autocorrelation_error: Option<String>,
}

/// A finished bank.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bank {
    pub templates: Vec<TemplateRow>,
    /// Output rates in ascending order.
    pub sample_rates: Vec<u32>,
    pub matrices: BTreeMap<u32, RateMatrices>,
    pub autocorrelation_bank: Matrix<Complex<f64>>,
    pub autocorrelation_mask: Matrix<i32>,
    pub sigmasq: Vec<f64>,
    pub matches: Vec<f64>,
    pub status: Vec<TemplateStatus>,
    pub sample_rate: u32,
    pub flower: f64,
    pub epsilon: f64,
    pub alpha: f64,
    pub beta: f64,
    pub negative_latency: f64,
    pub working_state: WorkingState,
}

impl Bank {
    /// Serializes the bank as CBOR.
    pub fn write_cbor<W: Write>(&self, writer: W) -> Result<(), SpiirError> {
        serde_cbor::to_writer(writer, self)?;
        Ok(())
    }

    pub fn read_cbor<R: Read>(reader: R) -> Result<Bank, SpiirError> {
        Ok(serde_cbor::from_reader(reader)?)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Spreads the filters of a single-rate bank over decimated rates.
    ///
    /// Each template's filters are read back from the full-rate matrices,
    /// decimated on their own and restacked with the usual padding. A bank
    /// that already has several rates is left alone.
    pub fn downsample(
        &mut self,
        flower: f64,
        padding: f64,
    ) -> Result<(), SpiirError> {
        if self.matrices.len() > 1 {
            info!("bank already downsampled");
            return Ok(());
        }
        let (&rate, full) = match self.matrices.iter().next() {
            Some(entry) => entry,
            None => return Ok(()),
        };
        let n_rows = self.len();
        if [full.a.rows, self.status.len(), self.sigmasq.len()]
            .iter()
            .chain([self.matches.len()].iter())
            .any(|&len| len != n_rows)
        {
            return Err(SpiirError::InvalidInput(format!(
                "bank of {} templates has inconsistent row counts",
                n_rows
            )));
        }
        let decimator = Decimator::new(rate, flower, padding)?;

        let mut assembler = BankAssembler::new(self.len());
        for (row, status) in self.status.iter().enumerate() {
            let n = status.n_filters.min(full.a.cols);
            let delay = full.d.row(row)[..n]
                .iter()
                .map(|&d| {
                    u32::try_from(d).map_err(|_| {
                        SpiirError::InvalidInput(format!(
                            "template {} has negative delay {}",
                            row, d
                        ))
                    })
                })
                .collect::<Result<Vec<_>, SpiirError>>()?;
            let filters = FilterSet::new(
                full.a.row(row)[..n].to_vec(),
                full.b.row(row)[..n].to_vec(),
                delay,
            )?;
            assembler.push(
                row,
                decimator.decimate(&filters),
                self.sigmasq[row],
                self.matches[row],
            )?;
        }

        let assembled = assembler.close();
        for (rate, matrices) in &assembled.matrices {
            let delays = &matrices.d.data;
            info!(
                "rate {} Hz: delays {} to {}, {} columns",
                rate,
                delays.iter().min().unwrap_or(&0),
                delays.iter().max().unwrap_or(&0),
                matrices.a.cols
            );
        }
        self.sample_rates = assembled.matrices.keys().cloned().collect();
        self.matrices = assembled.matrices;
        Ok(())
    }
}

/// What one template contributes to the bank.
struct TemplateResult {
    row: TemplateRow,
    group: DownsampledFilterGroup,
    autocorrelation: Result<Vec<Complex<f64>>, SpiirError>,
    sigmasq: f64,
    spiir_match: f64,
    status: TemplateStatus,
}

/// Read-only state shared by every template of one build.
struct BuildContext<'a> {
    sample_rate: u32,
    state: WorkingState,
    conditioner: WaveformConditioner<'a>,
    controller: EpsilonSearchController<'a>,
    decimator: Option<Decimator>,
    pad_length: usize,
}

/// Builds banks from templates using the supplied physics and
/// decomposition collaborators.
pub struct BankBuilder<'a> {
    config: BankConfig,
    generator: &'a dyn WaveformGenerator,
    bound: &'a dyn ChirpBound,
    decomposer: &'a dyn IirDecomposer,
    optimizer: Option<&'a dyn CoefficientOptimizer>,
    observer: &'a dyn BankObserver,
}

impl<'a> BankBuilder<'a> {
    /// Creates a new `BankBuilder`, rejecting an invalid configuration up
    /// front.
    pub fn new(
        config: BankConfig,
        generator: &'a dyn WaveformGenerator,
        bound: &'a dyn ChirpBound,
        decomposer: &'a dyn IirDecomposer,
    ) -> Result<Self, SpiirError> {
        config.validate()?;
        Ok(BankBuilder {
            config,
            generator,
            bound,
            decomposer,
            optimizer: None,
            observer: &(),
        })
    }

    pub fn with_optimizer(
        mut self,
        optimizer: &'a dyn CoefficientOptimizer,
    ) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn BankObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &BankConfig {
        &self.config
    }

    /// Builds the bank for `templates`, whitening against `psd` when one
    /// is given.
    ///
    /// Templates whose search does not converge keep their last filter
    /// set and are flagged in the bank status. Generator, conditioning and
    /// decomposition errors abort the build.
    pub fn build(
        &self,
        templates: &[Template],
        psd: Option<&Psd>,
    ) -> Result<Bank, SpiirError> {
        let config = &self.config;
        let sample_rate = config.resolve_sample_rate(templates)?;
        let state = WorkingState::compute(
            templates,
            config.flower,
            sample_rate as f64,
            self.bound,
        )?;
        info!(
            "building {} templates at {} Hz: working f_low {:.3} Hz, {} \
             samples",
            templates.len(),
            sample_rate,
            state.working_f_low,
            state.working_length
        );

        let decimator = if config.downsample {
            Some(Decimator::new(
                sample_rate,
                config.flower,
                config.search.padding,
            )?)
        } else {
            None
        };
        let context = BuildContext {
            sample_rate,
            state,
            conditioner: WaveformConditioner::new(
                psd,
                sample_rate as f64,
                &state,
                config.negative_latency,
                config.snr_cut,
            )?,
            controller: EpsilonSearchController::new(
                &config.search,
                self.decomposer,
                self.optimizer,
                self.observer,
            )?,
            decimator,
            // The first half of the working buffer is wraparound.
            pad_length: ceil_pow_2(
                state.working_length / 2 + config.autocorrelation_length,
            ),
        };

        let results = templates
            .par_iter()
            .map(|template| self.process_template(template, &context))
            .collect::<Result<Vec<_>, SpiirError>>()?;

        self.assemble(results, &context)
    }

    fn process_template(
        &self,
        template: &Template,
        context: &BuildContext,
    ) -> Result<TemplateResult, SpiirError> {
        let sample_rate = context.sample_rate as f64;
        let request = WaveformRequest {
            f_low: context.state.working_f_low,
            f_high: sample_rate / 2.0,
            sample_rate,
            duration: context.state.working_duration,
            domain: self.config.domain,
        };
        let waveform = self.generator.generate(template, &request)?;
        let conditioned = context.conditioner.condition(&waveform)?;
        let outcome = context.controller.search(
            template.index,
            &conditioned,
            context.pad_length,
        )?;

        let h_full = pad_front(&conditioned.data_full, context.pad_length);
        let autocorrelation = normalized_crosscorr(
            &h_full,
            &outcome.response,
            self.config.autocorrelation_length,
        );
        if let Err(err) = &autocorrelation {
            warn!(
                "template {}: no autocorrelation row: {}",
                template.index, err
            );
        }

        let group = match &context.decimator {
            Some(decimator) => decimator.decimate(&outcome.filters),
            None => DownsampledFilterGroup::single_rate(
                context.sample_rate,
                outcome.filters.clone(),
            ),
        };

        // Time integral of the cut template, scaled by the fidelity of the
        // approximation.
        let sigmasq = energy(&conditioned.data) / sample_rate
            * outcome.spiir_match
            * outcome.spiir_match;

        self.observer.template_finished(&TemplateSummary {
            template_index: template.index,
            n_filters: outcome.n_filters,
            spiir_match: outcome.spiir_match,
            epsilon: outcome.epsilon,
            rounds: outcome.rounds,
            status: outcome.status,
            sample_rates: group.rates().collect(),
        });

        Ok(TemplateResult {
            row: TemplateRow {
                template: template.clone(),
                end_time: conditioned.epoch_index as f64 / sample_rate,
                f_final: conditioned.fhigh_negative_latency,
            },
            group,
            sigmasq,
            spiir_match: outcome.spiir_match,
            status: TemplateStatus {
                search: outcome.status,
                epsilon: outcome.epsilon,
                rounds: outcome.rounds,
                n_filters: outcome.n_filters,
                autocorrelation_error: autocorrelation
                    .as_ref()
                    .err()
                    .map(|e| e.to_string()),
            },
            autocorrelation,
        })
    }

    fn assemble(
        &self,
        results: Vec<TemplateResult>,
        context: &BuildContext,
    ) -> Result<Bank, SpiirError> {
        let n = results.len();
        let length = self.config.autocorrelation_length;
        let mut assembler = BankAssembler::new(n);
        let mut autocorrelation_bank =
            Matrix::filled(n, length, Complex::zero());
        let mut templates = Vec::with_capacity(n);
        let mut status = Vec::with_capacity(n);

        for (row, result) in results.into_iter().enumerate() {
            if let Ok(kernel) = &result.autocorrelation {
                autocorrelation_bank.row_mut(row).copy_from_slice(kernel);
            }
            assembler.push(
                row,
                result.group,
                result.sigmasq,
                result.spiir_match,
            )?;
            templates.push(result.row);
            status.push(result.status);
        }

        let assembled = assembler.close();
        let failed = status.iter().filter(|s| !s.search.is_converged()).count();
        if failed > 0 {
            warn!("{} of {} templates did not converge", failed, n);
        }

        Ok(Bank {
            templates,
            sample_rates: assembled.matrices.keys().cloned().collect(),
            matrices: assembled.matrices,
            autocorrelation_mask: Matrix {
                rows: n,
                cols: length,
                data: autocorrelation_mask(n * length),
            },
            autocorrelation_bank,
            sigmasq: assembled.sigmasq,
            matches: assembled.matches,
            status,
            sample_rate: context.sample_rate,
            flower: self.config.flower,
            epsilon: self.config.search.epsilon_start,
            alpha: self.config.search.alpha,
            beta: self.config.search.beta,
            negative_latency: self.config.negative_latency,
            working_state: context.state,
        })
    }
}
