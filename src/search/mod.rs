//! Adaptive search over the decomposition tolerance `epsilon`.
//!
//! Each round decomposes the conditioned template at the current `epsilon`,
//! scores the resulting filter set against the template, and decides
//! whether the next round needs a tighter tolerance (more filters, better
//! match), a looser one, or none at all. The tolerance is bracketed from
//! both sides as soon as it has overshot in each direction, after which it
//! bisects geometrically.

use log::{debug, warn};
use num::Complex;
use serde::{Deserialize, Serialize};
use std::f64::consts::SQRT_2;
use std::fmt;

use crate::bank::observer::BankObserver;
use crate::condition::ConditionedWaveform;
use crate::iir::{
    spiir_response, CoefficientOptimizer, FilterSet, IirDecomposer,
    OptimizerState, Refinement,
};
use crate::util::math::{normalize_to, pad_front, vdot};
use crate::util::SpiirError;

/// Acceptance band for the match between a filter set and its template.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchGate {
    pub min: f64,
    pub max: f64,
}

impl MatchGate {
    pub fn new(min: f64, max: f64) -> MatchGate {
        MatchGate { min, max }
    }

    /// A gate that accepts any match.
    pub fn open() -> MatchGate {
        MatchGate { min: 0.0, max: 1.0 }
    }

    /// Which way `epsilon` has to move for `spiir_match` to land in the
    /// gate.
    pub fn direction(&self, spiir_match: f64) -> Direction {
        if spiir_match < self.min {
            Direction::Tighten
        } else if spiir_match > self.max {
            Direction::Loosen
        } else {
            Direction::Hold
        }
    }
}

impl Default for MatchGate {
    fn default() -> Self {
        MatchGate::open()
    }
}

/// Limits on the number of filters, either absolute or per `log2` of the
/// template length. Where both forms are given the tighter one wins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterBounds {
    pub filters_min: usize,
    pub filters_max: Option<usize>,
    pub filters_per_loglen_min: f64,
    pub filters_per_loglen_max: Option<f64>,
}

impl FilterBounds {
    /// Lower and upper filter counts for a template of `length` samples.
    ///
    /// # Examples
    ///
    /// ```
    /// use spiir_bank::search::FilterBounds;
    ///
    /// let bounds = FilterBounds {
    ///     filters_min: 10,
    ///     filters_max: Some(500),
    ///     filters_per_loglen_min: 2.0,
    ///     filters_per_loglen_max: Some(30.0),
    /// };
    /// let (min, max) = bounds.resolve(1024);
    /// assert_eq!(min, 20.0);
    /// assert_eq!(max, Some(300.0));
    /// ```
    pub fn resolve(&self, length: usize) -> (f64, Option<f64>) {
        let loglen = (length.max(1) as f64).log2();
        let min = (self.filters_min as f64)
            .max(self.filters_per_loglen_min * loglen);
        let max = match (self.filters_max, self.filters_per_loglen_max) {
            (Some(abs), Some(per)) => Some((abs as f64).min(per * loglen)),
            (Some(abs), None) => Some(abs as f64),
            (None, Some(per)) => Some(per * loglen),
            (None, None) => None,
        };
        (min, max)
    }
}

/// Every knob of the search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    pub alpha: f64,
    pub beta: f64,
    pub padding: f64,
    pub bounds: FilterBounds,
    pub initial_gate: MatchGate,
    pub b0_gate: MatchGate,
    pub final_gate: MatchGate,
    pub epsilon_start: f64,
    pub epsilon_min: f64,
    pub epsilon_max: Option<f64>,
    pub epsilon_factor: f64,
    pub nround_max: usize,
    /// Passes of a full optimizer run.
    pub optimizer_passes: usize,
    /// Run a full optimizer pass after the search if the last round did
    /// not already do so.
    pub final_refine: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams {
            alpha: 0.99,
            beta: 0.25,
            padding: 1.3,
            bounds: FilterBounds::default(),
            initial_gate: MatchGate::open(),
            b0_gate: MatchGate::open(),
            final_gate: MatchGate::open(),
            epsilon_start: 0.02,
            epsilon_min: 0.001,
            epsilon_max: None,
            epsilon_factor: 2.0,
            nround_max: 10,
            optimizer_passes: 8,
            final_refine: true,
        }
    }
}

impl SearchParams {
    /// A single decomposition at `epsilon` with every bound and gate open.
    pub fn fixed(epsilon: f64) -> SearchParams {
        SearchParams {
            epsilon_start: epsilon,
            epsilon_min: epsilon,
            epsilon_max: Some(epsilon),
            nround_max: 1,
            ..SearchParams::default()
        }
    }

    /// The optimizer is only consulted when a gate past `initial` asks
    /// for a minimum match.
    pub fn refinement_requested(&self) -> bool {
        self.b0_gate.min > 0.0 || self.final_gate.min > 0.0
    }

    pub fn validate(&self) -> Result<(), SpiirError> {
        if !(self.epsilon_start > 0.0) || !(self.epsilon_min > 0.0) {
            return Err(SpiirError::InvalidInput(format!(
                "epsilon_start {} and epsilon_min {} must be positive",
                self.epsilon_start, self.epsilon_min
            )));
        }
        if self.epsilon_min > self.epsilon_start
            || self.epsilon_max.map_or(false, |max| max < self.epsilon_start)
        {
            return Err(SpiirError::InvalidInput(format!(
                "epsilon_start {} lies outside [{}, {:?}]",
                self.epsilon_start, self.epsilon_min, self.epsilon_max
            )));
        }
        if !(self.epsilon_factor > 1.0) {
            return Err(SpiirError::InvalidInput(format!(
                "epsilon_factor must be > 1: {}",
                self.epsilon_factor
            )));
        }
        if self.nround_max == 0 {
            return Err(SpiirError::InvalidInput(
                "nround_max must be at least 1".to_string(),
            ));
        }
        for gate in &[self.initial_gate, self.b0_gate, self.final_gate] {
            if gate.min > gate.max {
                return Err(SpiirError::InvalidInput(format!(
                    "match gate [{}, {}] is empty",
                    gate.min, gate.max
                )));
            }
        }
        Ok(())
    }
}

/// Where the next round's `epsilon` should go.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Lower `epsilon`: more filters, better match.
    Tighten,
    Hold,
    /// Raise `epsilon`: fewer filters.
    Loosen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchFailure {
    EpsilonMaxExhausted,
    EpsilonMinExhausted,
    BracketInconsistency,
    RoundBudgetExceeded,
}

impl fmt::Display for SearchFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let reason = match self {
            SearchFailure::EpsilonMaxExhausted => "epsilon_max exhausted",
            SearchFailure::EpsilonMinExhausted => "epsilon_min exhausted",
            SearchFailure::BracketInconsistency => "bracket inconsistency",
            SearchFailure::RoundBudgetExceeded => "round budget exceeded",
        };
        write!(f, "{}", reason)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchStatus {
    Converged,
    Failed(SearchFailure),
}

impl SearchStatus {
    pub fn is_converged(&self) -> bool {
        *self == SearchStatus::Converged
    }
}

/// Search position: the current tolerance, the bracket around it and the
/// number of rounds completed.
///
/// `epsilon_a` is the last tolerance that gave too many filters (or too
/// good a match), `epsilon_b` the last that gave too few. Whenever both are
/// known `epsilon_a < epsilon < epsilon_b`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpsilonBracket {
    pub epsilon: f64,
    pub epsilon_a: Option<f64>,
    pub epsilon_b: Option<f64>,
    pub rounds: usize,
}

impl EpsilonBracket {
    pub fn new(epsilon: f64) -> EpsilonBracket {
        EpsilonBracket {
            epsilon,
            epsilon_a: None,
            epsilon_b: None,
            rounds: 0,
        }
    }

    /// Closes a round that asked to move in `direction`, choosing the next
    /// tolerance.
    ///
    /// # Examples
    ///
    /// ```
    /// use spiir_bank::search::{Direction, EpsilonBracket, SearchParams};
    ///
    /// let params = SearchParams::default();
    /// let mut bracket = EpsilonBracket::new(0.02);
    /// bracket.step(Direction::Loosen, &params).unwrap();
    /// assert_eq!(bracket.epsilon, 0.04);
    /// bracket.step(Direction::Tighten, &params).unwrap();
    /// assert!((bracket.epsilon - (0.02f64 * 0.04).sqrt()).abs() < 1e-15);
    /// ```
    pub fn step(
        &mut self,
        direction: Direction,
        params: &SearchParams,
    ) -> Result<(), SearchFailure> {
        match direction {
            Direction::Hold => (),
            Direction::Loosen => {
                self.epsilon_a = Some(self.epsilon);
                self.epsilon = match (self.epsilon_b, params.epsilon_max) {
                    (Some(b), _) => (self.epsilon * b).sqrt(),
                    (None, Some(max)) if self.epsilon < max => {
                        (self.epsilon * params.epsilon_factor).min(max)
                    }
                    (None, Some(_)) => {
                        return Err(SearchFailure::EpsilonMaxExhausted)
                    }
                    (None, None) => self.epsilon * params.epsilon_factor,
                };
            }
            Direction::Tighten => {
                self.epsilon_b = Some(self.epsilon);
                self.epsilon = match self.epsilon_a {
                    Some(a) => (a * self.epsilon).sqrt(),
                    None if self.epsilon > params.epsilon_min => {
                        (self.epsilon / params.epsilon_factor)
                            .max(params.epsilon_min)
                    }
                    None => return Err(SearchFailure::EpsilonMinExhausted),
                };
            }
        }

        if let (Some(a), Some(b)) = (self.epsilon_a, self.epsilon_b) {
            if !(a < self.epsilon && self.epsilon < b) {
                return Err(SearchFailure::BracketInconsistency);
            }
        }
        self.rounds += 1;
        if self.rounds >= params.nround_max {
            return Err(SearchFailure::RoundBudgetExceeded);
        }
        Ok(())
    }
}

/// Progress of one search round, handed to the observer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundReport {
    pub template_index: usize,
    pub round: usize,
    pub epsilon: f64,
    pub epsilon_a: Option<f64>,
    pub epsilon_b: Option<f64>,
    pub spiir_match: f64,
    pub n_filters: usize,
    pub direction: Direction,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchOutcome {
    pub filters: FilterSet,
    pub spiir_match: f64,
    pub n_filters: usize,
    /// Tolerance of the round that produced `filters`.
    pub epsilon: f64,
    pub rounds: usize,
    pub status: SearchStatus,
    /// Reversed response of `filters`, padded to the match length and
    /// normalized to inner product 2.
    pub response: Vec<Complex<f64>>,
}

struct Round {
    filters: FilterSet,
    spiir_match: f64,
    direction: Direction,
    fully_refined: bool,
    state: OptimizerState,
}

/// Runs the tolerance search for one template.
pub struct EpsilonSearchController<'a> {
    params: &'a SearchParams,
    decomposer: &'a dyn IirDecomposer,
    optimizer: Option<&'a dyn CoefficientOptimizer>,
    observer: &'a dyn BankObserver,
}

impl<'a> EpsilonSearchController<'a> {
    pub fn new(
        params: &'a SearchParams,
        decomposer: &'a dyn IirDecomposer,
        optimizer: Option<&'a dyn CoefficientOptimizer>,
        observer: &'a dyn BankObserver,
    ) -> Result<Self, SpiirError> {
        params.validate()?;
        if optimizer.is_none() && params.refinement_requested() {
            return Err(SpiirError::InvalidInput(format!(
                "match gates b0 [{}, {}] and final [{}, {}] need an optimizer",
                params.b0_gate.min,
                params.b0_gate.max,
                params.final_gate.min,
                params.final_gate.max
            )));
        }
        Ok(EpsilonSearchController {
            params,
            decomposer,
            optimizer,
            observer,
        })
    }

    /// Searches for a filter set approximating `waveform`.
    ///
    /// The match is computed over `pad_length` samples, with the cut
    /// template aligned to the end of the buffer. Failing to converge is
    /// reported in the outcome's status along with the last filter set;
    /// only decomposition, optimizer and normalization problems are errors.
    pub fn search(
        &self,
        template_index: usize,
        waveform: &ConditionedWaveform,
        pad_length: usize,
    ) -> Result<SearchOutcome, SpiirError> {
        let (n_min, n_max) = self.params.bounds.resolve(waveform.data.len());
        debug!(
            "template {}: n_filters_min {}, n_filters_max {:?}",
            template_index, n_min, n_max
        );

        let mut h = pad_front(&waveform.data, pad_length);
        normalize_to(&mut h, 2.0, "cut template")?;
        // The optimizer works with a unit-norm target.
        let target: Vec<_> = h.iter().map(|x| x / SQRT_2).collect();

        let mut bracket = EpsilonBracket::new(self.params.epsilon_start);
        let mut rounds = 0;
        let (mut round, epsilon, status) = loop {
            rounds += 1;
            let round = self.round(
                waveform,
                &h,
                &target,
                bracket.epsilon,
                n_min,
                n_max,
            )?;
            self.observer.round_finished(&RoundReport {
                template_index,
                round: rounds,
                epsilon: bracket.epsilon,
                epsilon_a: bracket.epsilon_a,
                epsilon_b: bracket.epsilon_b,
                spiir_match: round.spiir_match,
                n_filters: round.filters.len(),
                direction: round.direction,
            });
            debug!(
                "template {} round {}: epsilon {} in ({:?}, {:?}), match {}, \
                 {} filters",
                template_index,
                rounds,
                bracket.epsilon,
                bracket.epsilon_a,
                bracket.epsilon_b,
                round.spiir_match,
                round.filters.len()
            );

            let epsilon = bracket.epsilon;
            if round.direction == Direction::Hold {
                break (round, epsilon, SearchStatus::Converged);
            }
            if let Err(failure) = bracket.step(round.direction, self.params) {
                warn!(
                    "template {}: failed to meet requirements ({})",
                    template_index, failure
                );
                break (round, epsilon, SearchStatus::Failed(failure));
            }
        };

        if let Some(optimizer) = self.optimizer {
            if self.params.final_refine && !round.fully_refined {
                let refinement = optimizer.refine(
                    &round.filters.a1,
                    &round.filters.delay,
                    &target,
                    self.params.optimizer_passes,
                    round.state.clone(),
                )?;
                round.spiir_match = refinement.overlap;
                round.filters = refined_filters(&round.filters, refinement)?;
            }
        }

        let response = spiir_response(pad_length, &round.filters);
        Ok(SearchOutcome {
            n_filters: round.filters.len(),
            spiir_match: round.spiir_match,
            filters: round.filters,
            epsilon,
            rounds,
            status,
            response,
        })
    }

    fn round(
        &self,
        waveform: &ConditionedWaveform,
        h: &[Complex<f64>],
        target: &[Complex<f64>],
        epsilon: f64,
        n_min: f64,
        n_max: Option<f64>,
    ) -> Result<Round, SpiirError> {
        let params = self.params;
        let mut filters = self.decomposer.decompose(
            &waveform.amp,
            &waveform.phase,
            epsilon,
            params.alpha,
            params.beta,
            params.padding,
        )?;

        let mut u = spiir_response(h.len(), &filters);
        // A filter set with no response has no overlap with anything.
        let normalized = normalize_to(&mut u, 2.0, "spiir response");
        let mut spiir_match = match normalized {
            Ok(scale) => {
                filters.scale_gains(scale);
                vdot(&u, h).norm() / 2.0
            }
            Err(_) => 0.0,
        };

        let n = filters.len() as f64;
        let mut state = OptimizerState::default();
        let mut fully_refined = false;
        let direction = if n_max.map_or(false, |max| n > max) {
            Direction::Loosen
        } else if n >= n_min {
            let mut gate = params.initial_gate;
            if let Some(optimizer) = self.optimizer {
                if spiir_match >= gate.min && params.refinement_requested() {
                    let probe = optimizer.refine(
                        &filters.a1,
                        &filters.delay,
                        target,
                        0,
                        OptimizerState::default(),
                    )?;
                    gate = params.b0_gate;
                    spiir_match = probe.overlap;
                    state = probe.state.clone();
                    filters = refined_filters(&filters, probe)?;

                    if spiir_match >= gate.min && params.final_gate.min > 0.0 {
                        let full = optimizer.refine(
                            &filters.a1,
                            &filters.delay,
                            target,
                            params.optimizer_passes,
                            state.clone(),
                        )?;
                        gate = params.final_gate;
                        spiir_match = full.overlap;
                        state = full.state.clone();
                        filters = refined_filters(&filters, full)?;
                        fully_refined = true;
                    }
                }
            }
            gate.direction(spiir_match)
        } else {
            Direction::Tighten
        };

        Ok(Round {
            filters,
            spiir_match,
            direction,
            fully_refined,
            state,
        })
    }
}

/// Filter set from an optimizer result, with gains moved from the
/// optimizer's unit-norm convention to inner product 2.
fn refined_filters(
    filters: &FilterSet,
    refinement: Refinement,
) -> Result<FilterSet, SpiirError> {
    let mut refined =
        FilterSet::new(refinement.a1, refinement.b0, filters.delay.clone())?;
    refined.scale_gains(SQRT_2);
    Ok(refined)
}

#[cfg(test)]
mod test {
    use crate::search::*;
    use crate::util::math::amp_phase;
    use assert_approx_eq::assert_approx_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Produces `floor(10 / epsilon)` decaying filters.
    struct CountingDecomposer;

    impl IirDecomposer for CountingDecomposer {
        fn decompose(
            &self,
            _amp: &[f64],
            _phase: &[f64],
            epsilon: f64,
            _alpha: f64,
            _beta: f64,
            _padding: f64,
        ) -> Result<FilterSet, SpiirError> {
            let n = (10.0 / epsilon).floor() as usize;
            let mut filters = FilterSet::default();
            for i in 0..n {
                filters.push(
                    Complex::from_polar(0.9, 0.3),
                    Complex::new(1.0, 0.0),
                    (i % 64) as u32,
                );
            }
            Ok(filters)
        }
    }

    /// Reports a fixed overlap per call type and counts the calls.
    struct FixedOptimizer {
        probe_overlap: f64,
        full_overlap: f64,
        probes: AtomicUsize,
        full_runs: AtomicUsize,
    }

    impl FixedOptimizer {
        fn new(probe_overlap: f64, full_overlap: f64) -> FixedOptimizer {
            FixedOptimizer {
                probe_overlap,
                full_overlap,
                probes: AtomicUsize::new(0),
                full_runs: AtomicUsize::new(0),
            }
        }
    }

    impl CoefficientOptimizer for FixedOptimizer {
        fn refine(
            &self,
            a1: &[Complex<f64>],
            _delay: &[u32],
            _target: &[Complex<f64>],
            passes: usize,
            _state: OptimizerState,
        ) -> Result<Refinement, SpiirError> {
            let overlap = if passes == 0 {
                self.probes.fetch_add(1, Ordering::SeqCst);
                self.probe_overlap
            } else {
                self.full_runs.fetch_add(1, Ordering::SeqCst);
                self.full_overlap
            };
            Ok(Refinement {
                a1: a1.to_vec(),
                b0: vec![Complex::new(0.5, 0.0); a1.len()],
                overlap,
                state: OptimizerState::default(),
            })
        }
    }

    #[derive(Default)]
    struct Recorder {
        rounds: Mutex<Vec<RoundReport>>,
    }

    impl BankObserver for Recorder {
        fn round_finished(&self, report: &RoundReport) {
            self.rounds.lock().unwrap().push(report.clone());
        }
    }

    fn waveform() -> ConditionedWaveform {
        let data: Vec<_> = (0..64)
            .map(|i| Complex::from_polar(1.0, 0.3 * i as f64))
            .collect();
        let (amp, phase) = amp_phase(&data);
        ConditionedWaveform {
            amp,
            phase,
            data_full: data.clone(),
            data,
            epoch_index: 0,
            fhigh: 100.0,
            fhigh_negative_latency: 100.0,
        }
    }

    fn bounded(min: usize, max: Option<usize>) -> SearchParams {
        SearchParams {
            bounds: FilterBounds {
                filters_min: min,
                filters_max: max,
                ..FilterBounds::default()
            },
            ..SearchParams::default()
        }
    }

    fn run(
        params: &SearchParams,
        observer: &dyn BankObserver,
    ) -> SearchOutcome {
        EpsilonSearchController::new(
            params,
            &CountingDecomposer,
            None,
            observer,
        )
        .unwrap()
        .search(0, &waveform(), 128)
        .unwrap()
    }

    fn run_optimized(
        params: &SearchParams,
        optimizer: &FixedOptimizer,
    ) -> SearchOutcome {
        EpsilonSearchController::new(
            params,
            &CountingDecomposer,
            Some(optimizer),
            &(),
        )
        .unwrap()
        .search(0, &waveform(), 128)
        .unwrap()
    }

    #[test]
    fn test_converges_inside_bounds() {
        let params = bounded(100, Some(300));
        let outcome = run(&params, &());
        assert_eq!(outcome.status, SearchStatus::Converged);
        assert_eq!(outcome.n_filters, 250);
        assert_approx_eq!(outcome.epsilon, 0.04);
        assert_eq!(outcome.rounds, 2);
        assert!(outcome.spiir_match > 0.0 && outcome.spiir_match <= 1.0);
    }

    #[test]
    fn test_epsilon_max_exhausted_keeps_filters() {
        let mut params = bounded(0, Some(1));
        params.epsilon_max = Some(0.08);
        let outcome = run(&params, &());
        assert_eq!(
            outcome.status,
            SearchStatus::Failed(SearchFailure::EpsilonMaxExhausted)
        );
        assert_eq!(outcome.n_filters, 125);
        assert!(!outcome.filters.is_empty());
        assert_eq!(outcome.response.len(), 128);
        assert_eq!(
            format!("{}", SearchFailure::EpsilonMaxExhausted),
            "epsilon_max exhausted"
        );
    }

    #[test]
    fn test_epsilon_min_exhausted() {
        let mut params = bounded(1_000_000, None);
        params.epsilon_min = 0.005;
        let outcome = run(&params, &());
        assert_eq!(
            outcome.status,
            SearchStatus::Failed(SearchFailure::EpsilonMinExhausted)
        );
        assert_eq!(outcome.n_filters, 2000);
        assert_eq!(outcome.rounds, 3);
    }

    #[test]
    fn test_bisection_keeps_bracket_ordered() {
        let params = bounded(300, Some(350));
        let recorder = Recorder::default();
        let outcome = run(&params, &recorder);
        assert_eq!(outcome.status, SearchStatus::Converged);
        assert!(outcome.n_filters >= 300 && outcome.n_filters <= 350);

        let rounds = recorder.rounds.lock().unwrap();
        assert_eq!(rounds.len(), outcome.rounds);
        for report in rounds.iter() {
            if let (Some(a), Some(b)) = (report.epsilon_a, report.epsilon_b) {
                assert!(a < report.epsilon && report.epsilon < b);
            }
        }
        assert_eq!(rounds[0].direction, Direction::Loosen);
        assert_eq!(rounds[1].direction, Direction::Tighten);
        assert_eq!(rounds.last().unwrap().direction, Direction::Hold);
    }

    #[test]
    fn test_round_budget_exceeded() {
        let mut params = bounded(300, Some(350));
        params.nround_max = 2;
        let outcome = run(&params, &());
        assert_eq!(
            outcome.status,
            SearchStatus::Failed(SearchFailure::RoundBudgetExceeded)
        );
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.n_filters, 250);
    }

    #[test]
    fn test_fixed_epsilon_is_single_round() {
        let params = SearchParams::fixed(0.05);
        let outcome = run(&params, &());
        assert_eq!(outcome.status, SearchStatus::Converged);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.n_filters, 200);
    }

    #[test]
    fn test_gates_escalate_through_optimizer() {
        let mut params = SearchParams::fixed(0.05);
        params.b0_gate = MatchGate::new(0.9, 1.0);
        params.final_gate = MatchGate::new(0.97, 1.0);
        let optimizer = FixedOptimizer::new(0.95, 0.99);
        let outcome = run_optimized(&params, &optimizer);
        assert_eq!(outcome.status, SearchStatus::Converged);
        assert_approx_eq!(outcome.spiir_match, 0.99);
        assert_eq!(optimizer.probes.load(Ordering::SeqCst), 1);
        assert_eq!(optimizer.full_runs.load(Ordering::SeqCst), 1);
        assert_approx_eq!(outcome.filters.b0[0].re, 0.5 * SQRT_2);
    }

    #[test]
    fn test_probe_below_gate_tightens() {
        let mut params = SearchParams::fixed(0.05);
        params.b0_gate = MatchGate::new(0.96, 1.0);
        params.final_gate = MatchGate::new(0.97, 1.0);
        params.final_refine = false;
        let optimizer = FixedOptimizer::new(0.95, 0.99);
        let outcome = run_optimized(&params, &optimizer);
        assert_eq!(
            outcome.status,
            SearchStatus::Failed(SearchFailure::EpsilonMinExhausted)
        );
        assert_approx_eq!(outcome.spiir_match, 0.95);
        assert_eq!(optimizer.full_runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_final_refine_after_search() {
        let params = SearchParams::fixed(0.05);
        let optimizer = FixedOptimizer::new(0.5, 0.8);
        let outcome = run_optimized(&params, &optimizer);
        assert_eq!(optimizer.probes.load(Ordering::SeqCst), 0);
        assert_eq!(optimizer.full_runs.load(Ordering::SeqCst), 1);
        assert_approx_eq!(outcome.spiir_match, 0.8);
    }

    #[test]
    fn test_bounds_resolve_tighter() {
        let bounds = FilterBounds {
            filters_min: 50,
            filters_max: Some(100),
            filters_per_loglen_min: 1.0,
            filters_per_loglen_max: Some(20.0),
        };
        assert_eq!(bounds.resolve(256), (50.0, Some(100.0)));
        assert_eq!(bounds.resolve(8), (50.0, Some(60.0)));
        assert_eq!(FilterBounds::default().resolve(256), (0.0, None));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut params = SearchParams::default();
        params.epsilon_factor = 1.0;
        assert!(params.validate().is_err());
        let mut params = SearchParams::default();
        params.epsilon_min = 0.5;
        assert!(params.validate().is_err());
        assert!(SearchParams::fixed(0.1).validate().is_ok());
    }

    #[test]
    fn test_gates_without_optimizer_rejected() {
        let mut params = SearchParams::fixed(0.05);
        params.b0_gate = MatchGate::new(0.99, 1.0);
        params.final_gate = MatchGate::new(0.99, 1.0);
        match EpsilonSearchController::new(
            &params,
            &CountingDecomposer,
            None,
            &(),
        ) {
            Err(SpiirError::InvalidInput(_)) => (),
            _ => panic!("gated search accepted without an optimizer"),
        }

        let mut params = SearchParams::fixed(0.05);
        params.final_gate = MatchGate::new(0.8, 1.0);
        assert!(EpsilonSearchController::new(
            &params,
            &CountingDecomposer,
            None,
            &()
        )
        .is_err());

        let optimizer = FixedOptimizer::new(0.99, 0.99);
        assert!(EpsilonSearchController::new(
            &params,
            &CountingDecomposer,
            Some(&optimizer),
            &()
        )
        .is_ok());
    }
}
