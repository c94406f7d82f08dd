//! One federated round per attack scenario: five simulated clients submit
//! concurrently, then the aggregator screens them and compares accuracy.
//!
//! Run with `RUST_LOG=debug` to see per-client signals.

use std::sync::Arc;

use env_logger::Env;
use fedguard::protocol::SubmitRequest;
use fedguard::simulation::{iris, simulate_clients, ClientBehavior};
use fedguard::{AggregatorService, FedGuardError, ServiceConfig};

use ClientBehavior::{GaussianNoise, Honest, LabelFlip, SingleFeatureBlowup};

const FOLD_SEED: u64 = 2;

const SCENARIOS: [(&str, [ClientBehavior; 5]); 3] = [
    ("1 byzantine", [Honest, Honest, Honest, Honest, LabelFlip]),
    ("2 byzantine", [Honest, Honest, Honest, GaussianNoise, LabelFlip]),
    (
        "3 byzantine",
        [Honest, Honest, SingleFeatureBlowup, GaussianNoise, LabelFlip],
    ),
];

fn run(name: &str, behaviors: &[ClientBehavior]) -> Result<(), FedGuardError> {
    println!("== {} ==", name);
    let service = Arc::new(AggregatorService::new(ServiceConfig::default())?);
    let (x, y) = iris();
    let requests: Vec<SubmitRequest> = simulate_clients(&x, &y, behaviors, FOLD_SEED)?
        .iter()
        .map(SubmitRequest::from)
        .collect();

    let pool = service.worker_pool()?;
    let replies: Vec<Result<_, FedGuardError>> = pool.install(|| {
        use rayon::prelude::*;
        requests
            .par_iter()
            .map(|request| service.handle_submit(request))
            .collect()
    });
    for reply in replies {
        reply?;
    }

    let report = service.train(behaviors.len())?;
    let byzantine: Vec<usize> = behaviors
        .iter()
        .enumerate()
        .filter(|(_, b)| b.is_byzantine())
        .map(|(i, _)| i)
        .collect();

    for (id, m) in &report.detection.metrics {
        println!(
            "  client {} ({}): centroid_deviation={:.3} label_inconsistency={:.3}",
            id, behaviors[*id as usize], m.centroid_deviation, m.label_inconsistency
        );
    }
    println!("  actual byzantine:   {:?}", byzantine);
    println!("  suspected:          {:?}", report.suspect_client_ids);
    println!(
        "  all:      train={:.4} test={:.4}",
        report.all.train, report.all.test
    );
    println!(
        "  filtered: train={:.4} test={:.4}\n",
        report.filtered.train, report.filtered.test
    );
    Ok(())
}

fn main() -> Result<(), FedGuardError> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    for (name, behaviors) in SCENARIOS.iter() {
        run(name, behaviors)?;
    }
    Ok(())
}
