//! Builds a small SPIIR bank against a white PSD and writes it out as CBOR.
#[macro_use]
extern crate log;
extern crate simple_logger;
extern crate spiir_bank;

use spiir_bank::prelude::*;
use spiir_bank::search::FilterBounds;
use std::fs::File;

fn main() {
    simple_logger::init_with_level(log::Level::Info).unwrap();

    let templates: Vec<_> = [(10.0, 10.0), (12.0, 8.0), (15.0, 10.0)]
        .iter()
        .enumerate()
        .map(|(i, &(m1, m2))| Template::new(i, m1, m2).with_f_final(400.0))
        .collect();

    let mut config = BankConfig::default();
    config.flower = 30.0;
    config.downsample = true;
    config.negative_latency = 0.1;
    config.search.bounds = FilterBounds {
        filters_max: Some(400),
        ..FilterBounds::default()
    };
    config.search.epsilon_max = Some(1.0);
    config.search.b0_gate = MatchGate::new(0.5, 1.0);
    config.search.final_gate = MatchGate::new(0.8, 1.0);

    let psd = Psd::flat(2048.0, 0.125, 1.0).unwrap();
    let optimizer = GainFitOptimizer;
    let builder = BankBuilder::new(
        config,
        &NewtonianChirpGenerator,
        &PostNewtonianBound,
        &ChirpletDecomposer,
    )
    .unwrap()
    .with_optimizer(&optimizer)
    .with_observer(&LogObserver);

    let bank = match builder.build(&templates, Some(&psd)) {
        Ok(bank) => bank,
        Err(e) => {
            error!("bank build failed: {}", e);
            return;
        }
    };

    for (row, status) in bank.status.iter().enumerate() {
        info!(
            "template {}: {:?}, {} filters, match {:.4}",
            row, status.search, status.n_filters, bank.matches[row]
        );
    }
    info!("output rates: {:?}", bank.sample_rates);

    let file = File::create("spiir_bank.cbor").unwrap();
    bank.write_cbor(file).unwrap();
}
