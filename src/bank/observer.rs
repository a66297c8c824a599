//! Progress reporting for bank builds.
//!
//! The builder calls an observer at the end of every search round and every
//! template. Observers must not block for long: they run on the worker
//! threads processing templates.

use crossbeam::channel::Sender;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::search::{RoundReport, SearchStatus};

/// Summary of one finished template.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub template_index: usize,
    pub n_filters: usize,
    pub spiir_match: f64,
    pub epsilon: f64,
    pub rounds: usize,
    pub status: SearchStatus,
    pub sample_rates: Vec<u32>,
}

pub trait BankObserver: Send + Sync {
    fn round_finished(&self, _report: &RoundReport) {}
    fn template_finished(&self, _summary: &TemplateSummary) {}
}

impl BankObserver for () {}

/// Writes progress through the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl BankObserver for LogObserver {
    fn round_finished(&self, report: &RoundReport) {
        debug!(
            "template {} round {}: epsilon {}, match {:.6}, {} filters, {:?}",
            report.template_index,
            report.round,
            report.epsilon,
            report.spiir_match,
            report.n_filters,
            report.direction
        );
    }

    fn template_finished(&self, summary: &TemplateSummary) {
        info!(
            "template {}: {} filters over rates {:?}, match {:.6} after {} \
             rounds ({:?})",
            summary.template_index,
            summary.n_filters,
            summary.sample_rates,
            summary.spiir_match,
            summary.rounds,
            summary.status
        );
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BankEvent {
    Round(RoundReport),
    Template(TemplateSummary),
}

/// Forwards every event over a channel, dropping events once the receiver
/// has gone away.
#[derive(Clone, Debug)]
pub struct ChannelObserver {
    sender: Sender<BankEvent>,
}

impl ChannelObserver {
    pub fn new(sender: Sender<BankEvent>) -> ChannelObserver {
        ChannelObserver { sender }
    }
}

impl BankObserver for ChannelObserver {
    fn round_finished(&self, report: &RoundReport) {
        let _ = self.sender.send(BankEvent::Round(report.clone()));
    }

    fn template_finished(&self, summary: &TemplateSummary) {
        let _ = self.sender.send(BankEvent::Template(summary.clone()));
    }
}

#[cfg(test)]
mod test {
    use crate::bank::observer::*;
    use crate::search::Direction;
    use crossbeam::channel;

    fn report() -> RoundReport {
        RoundReport {
            template_index: 4,
            round: 1,
            epsilon: 0.02,
            epsilon_a: None,
            epsilon_b: None,
            spiir_match: 0.97,
            n_filters: 120,
            direction: Direction::Hold,
        }
    }

    #[test]
    fn test_channel_observer_forwards() {
        let (send, recv) = channel::unbounded();
        let observer = ChannelObserver::new(send);
        observer.round_finished(&report());
        let summary = TemplateSummary {
            template_index: 4,
            n_filters: 120,
            spiir_match: 0.97,
            epsilon: 0.02,
            rounds: 1,
            status: SearchStatus::Converged,
            sample_rates: vec![512, 1024],
        };
        observer.template_finished(&summary);

        assert_eq!(recv.recv().unwrap(), BankEvent::Round(report()));
        assert_eq!(recv.recv().unwrap(), BankEvent::Template(summary));
    }

    #[test]
    fn test_channel_observer_survives_closed_receiver() {
        let (send, recv) = channel::bounded(1);
        drop(recv);
        ChannelObserver::new(send).round_finished(&report());
        LogObserver.round_finished(&report());
        ().round_finished(&report());
    }
}
