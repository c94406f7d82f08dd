//! Integration tests for FedGuard screening and reporting

use std::collections::BTreeMap;
use std::sync::Arc;

use fedguard::detection::{flag_suspects, robust_threshold, ClientMetrics};
use fedguard::error::FedGuardError;
use fedguard::protocol::{decode, ErrorCode, ErrorReply, ReportRequest, SubmitRequest};
use fedguard::simulation::{iris, simulate_clients, ClientBehavior};
use fedguard::{
    AggregatorService, ClientBatch, ClientId, EvaluationConfig, ForestConfig, Phase, Sample,
    ServiceConfig,
};

fn fast_config() -> ServiceConfig {
    ServiceConfig {
        evaluation: EvaluationConfig {
            forest: ForestConfig {
                n_estimators: 25,
                ..ForestConfig::default()
            },
            ..EvaluationConfig::default()
        },
        ..ServiceConfig::default()
    }
}

/// Fold shuffle under which no honest Iris shard is a centroid outlier.
const FOLD_SEED: u64 = 2;

fn iris_round(behaviors: &[ClientBehavior]) -> Vec<ClientBatch> {
    let (x, y) = iris();
    simulate_clients(&x, &y, behaviors, FOLD_SEED).unwrap()
}

/// One Iris fold shared by every honest client.
fn honest_fold() -> ClientBatch {
    iris_round(&[ClientBehavior::Honest; 5]).remove(0)
}

fn as_client(id: ClientId, batch: &ClientBatch) -> ClientBatch {
    ClientBatch::from_arrays(id, batch.features().to_owned(), batch.labels().to_owned()).unwrap()
}

fn flipped(id: ClientId, batch: &ClientBatch) -> ClientBatch {
    let labels = batch.labels().mapv(|y| (y + 1) % 3);
    ClientBatch::from_arrays(id, batch.features().to_owned(), labels).unwrap()
}

#[test]
fn test_insufficient_then_ready() {
    let service = AggregatorService::new(fast_config()).unwrap();
    let fold = honest_fold();

    for id in 0..4 {
        service.submit(as_client(id, &fold)).unwrap();
    }
    // One submission short
    let err = service.train(5).unwrap_err();
    assert_eq!(
        err,
        FedGuardError::InsufficientParticipants {
            expected: 5,
            actual: 4
        }
    );

    service.submit(as_client(4, &fold)).unwrap();
    assert_eq!(service.phase(5), Phase::Ready { registered: 5 });
    let report = service.train(5).unwrap();
    assert_eq!(report.total_clients, 5);
}

#[test]
fn test_insufficient_leaves_registry_unaffected() {
    let service = AggregatorService::new(fast_config()).unwrap();
    let fold = honest_fold();
    for id in 0..3 {
        service.submit(as_client(id, &fold)).unwrap();
    }
    let before = service.registry().snapshot();

    let err = service.train(5).unwrap_err();
    assert!(matches!(
        err,
        FedGuardError::InsufficientParticipants {
            expected: 5,
            actual: 3
        }
    ));
    assert_eq!(service.registry().snapshot(), before);
    assert_eq!(service.registry().count(), 3);
}

#[test]
fn test_resubmission_replaces_prior_data() {
    let service = AggregatorService::new(fast_config()).unwrap();
    let first = vec![Sample::new(vec![1.0, 1.0], 0)];
    let second = vec![Sample::new(vec![2.0, 2.0], 1), Sample::new(vec![3.0, 3.0], 0)];

    service.submit_samples(0, &first).unwrap();
    let total = service.submit_samples(0, &second).unwrap();

    assert_eq!(total, 1);
    assert_eq!(service.registry().count(), 1);
    let stored = service.registry().get(0).unwrap();
    assert_eq!(stored.to_samples(), second);
}

#[test]
fn test_reports_are_deterministic() {
    let service = AggregatorService::new(fast_config()).unwrap();
    let fold = honest_fold();
    for id in 0..4 {
        service.submit(as_client(id, &fold)).unwrap();
    }
    service.submit(flipped(4, &fold)).unwrap();

    let first = service.train(5).unwrap();
    let second = service.train(5).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.detection, second.detection);
    assert_eq!(first.all.test.to_bits(), second.all.test.to_bits());
}

#[test]
fn test_threshold_boundary_not_flagged() {
    // median 0, IQR 0 -> threshold 0 + 3.0; the last client sits exactly on it
    let deviations = [0.0, 0.0, 0.0, 0.0, 3.0];
    let threshold = robust_threshold(&deviations, 3.0, 3.0).unwrap();
    assert_eq!(threshold, 3.0);

    let metrics: BTreeMap<ClientId, ClientMetrics> = deviations
        .iter()
        .enumerate()
        .map(|(i, &d)| {
            (
                i as ClientId,
                ClientMetrics {
                    centroid_deviation: d,
                    label_inconsistency: 0.0,
                },
            )
        })
        .collect();
    assert!(flag_suspects(&metrics, threshold, 0.35).is_empty());
}

#[test]
fn test_label_flip_attacker_isolated() {
    let service = AggregatorService::new(fast_config()).unwrap();
    let fold = honest_fold();
    for id in 0..4 {
        service.submit(as_client(id, &fold)).unwrap();
    }
    service.submit(flipped(4, &fold)).unwrap();

    let report = service.train(5).unwrap();
    assert_eq!(report.suspect_client_ids, vec![4]);
    assert!(report.detection.metrics[&4].label_inconsistency > 0.35);
    assert!(
        report.filtered.test >= report.all.test,
        "filtered {} should not trail unfiltered {}",
        report.filtered.test,
        report.all.test
    );
}

#[test]
fn test_all_honest_filtered_equals_unfiltered() {
    let service = AggregatorService::new(fast_config()).unwrap();
    let fold = honest_fold();
    for id in 0..5 {
        service.submit(as_client(id, &fold)).unwrap();
    }

    let report = service.train(5).unwrap();
    assert!(report.suspect_client_ids.is_empty());
    assert_eq!(report.filtered, report.all);
}

#[test]
fn test_every_client_flagged_reports_zero() {
    // Two mirrored clients: class centroids coincide, ties resolve to class 0,
    // and each client disagrees with half of its own labels.
    let service = AggregatorService::new(fast_config()).unwrap();
    let mut a = Vec::new();
    let mut b = Vec::new();
    for _ in 0..5 {
        a.push(Sample::new(vec![0.0, 0.0], 0));
        a.push(Sample::new(vec![2.0, 2.0], 1));
        b.push(Sample::new(vec![0.0, 0.0], 1));
        b.push(Sample::new(vec![2.0, 2.0], 0));
    }
    service.submit_samples(0, &a).unwrap();
    service.submit_samples(1, &b).unwrap();

    let report = service.train(2).unwrap();
    assert_eq!(report.suspect_client_ids, vec![0, 1]);
    assert_eq!(report.detection.metrics[&0].label_inconsistency, 0.5);
    assert_eq!(report.filtered.train, 0.0);
    assert_eq!(report.filtered.test, 0.0);
}

#[test]
fn test_iris_round_isolates_flipper() {
    use ClientBehavior::{Honest, LabelFlip};
    let service = AggregatorService::new(fast_config()).unwrap();
    for batch in iris_round(&[Honest, Honest, Honest, Honest, LabelFlip]) {
        service.submit(batch).unwrap();
    }

    let report = service.train(5).unwrap();
    assert_eq!(report.suspect_client_ids, vec![4]);
    assert!(report.detection.metrics[&4].label_inconsistency > 0.35);
    for id in 0..4 {
        let m = report.detection.metrics[&id];
        assert!(
            m.label_inconsistency <= 0.35,
            "honest client {} looks label-inconsistent",
            id
        );
        assert!(m.centroid_deviation <= report.detection.centroid_threshold);
    }
    assert!(
        report.filtered.test >= report.all.test,
        "filtered {} should not trail unfiltered {}",
        report.filtered.test,
        report.all.test
    );
}

#[test]
fn test_iris_round_all_honest() {
    let service = AggregatorService::new(fast_config()).unwrap();
    for batch in iris_round(&[ClientBehavior::Honest; 5]) {
        service.submit(batch).unwrap();
    }

    let report = service.train(5).unwrap();
    assert!(report.suspect_client_ids.is_empty());
    assert_eq!(report.filtered, report.all);
}

#[test]
fn test_non_finite_submission_rejected() {
    let service = AggregatorService::new(fast_config()).unwrap();
    for batch in iris_round(&[ClientBehavior::Honest; 5]) {
        service.submit(batch).unwrap();
    }
    let before = service.registry().snapshot();

    for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
        let mut samples = honest_fold().to_samples();
        samples[3].features[1] = bad;
        let err = service.submit_samples(4, &samples).unwrap_err();
        assert!(
            matches!(err, FedGuardError::MalformedBatch { client_id: 4, .. }),
            "{} feature accepted",
            bad
        );
    }
    assert_eq!(service.registry().snapshot(), before);

    // The round is still screened on the well-formed batches
    let report = service.train(5).unwrap();
    assert!(report.suspect_client_ids.is_empty());
}

#[test]
fn test_blowup_client_flagged_by_centroid() {
    let fold = honest_fold();
    let service = AggregatorService::new(fast_config()).unwrap();
    // Slightly different honest clients keep the IQR above zero
    for id in 0..4 {
        let features = fold.features().mapv(|v| v + id as f32 * 0.01);
        service
            .submit(ClientBatch::from_arrays(id, features, fold.labels().to_owned()).unwrap())
            .unwrap();
    }
    let mut features = fold.features().to_owned();
    features.column_mut(2).fill(0.0);
    features[[0, 2]] = 1e6;
    service
        .submit(ClientBatch::from_arrays(4, features, fold.labels().to_owned()).unwrap())
        .unwrap();

    let detection = service.detect().unwrap();
    assert!(detection.is_suspect(4));
    assert!(detection.metrics[&4].centroid_deviation > detection.centroid_threshold);
}

#[test]
fn test_reports_follow_registry_growth() {
    let service = AggregatorService::new(fast_config()).unwrap();
    let fold = honest_fold();
    for id in 0..3 {
        service.submit(as_client(id, &fold)).unwrap();
    }
    let before = service.train(3).unwrap();
    assert!(before.suspect_client_ids.is_empty());

    service.submit(flipped(3, &fold)).unwrap();
    let after = service.train(3).unwrap();
    assert_eq!(after.total_clients, 4);
    assert_eq!(after.suspect_client_ids, vec![3]);
}

#[test]
fn test_concurrent_submissions_on_worker_pool() {
    let service = Arc::new(AggregatorService::new(fast_config()).unwrap());
    let fold = honest_fold();
    let pool = service.worker_pool().unwrap();

    pool.scope(|scope| {
        for id in 0..20u64 {
            let service = Arc::clone(&service);
            let batch = as_client(id, &fold);
            scope.spawn(move |_| {
                service.submit(batch).unwrap();
            });
        }
    });

    assert_eq!(service.registry().count(), 20);
    assert_eq!(service.registered_clients(), (0..20).collect::<Vec<_>>());
}

#[test]
fn test_protocol_roundtrip() {
    let service = AggregatorService::new(fast_config()).unwrap();
    let fold = honest_fold();
    for id in 0..2 {
        let request = SubmitRequest {
            client_id: id,
            samples: fold.to_samples(),
        };
        let json = serde_json::to_string(&request).unwrap();
        let reply = service.handle_submit(&decode(&json).unwrap()).unwrap();
        assert!(reply.accepted);
        assert_eq!(reply.total_registered, id as usize + 1);
        assert!(reply.message.contains(&format!("client_id={}", id)));
    }

    let err = service
        .handle_report(&ReportRequest { expected_clients: 3 })
        .unwrap_err();
    let reply = ErrorReply::from(&err);
    assert_eq!(reply.code, ErrorCode::FailedPrecondition);
    assert_eq!((reply.expected, reply.actual), (Some(3), Some(2)));

    let response = service
        .handle_report(&decode::<ReportRequest>(r#"{"expected_clients": 2}"#).unwrap())
        .unwrap();
    assert_eq!(response.total_clients, 2);
    assert_eq!(response.filtered_clients, 0);
    for acc in [
        response.train_accuracy_all,
        response.test_accuracy_all,
        response.train_accuracy_filtered,
        response.test_accuracy_filtered,
    ] {
        assert!((0.0..=1.0).contains(&acc));
    }
}

#[test]
fn test_error_display_impls() {
    let e = FedGuardError::InsufficientParticipants {
        expected: 5,
        actual: 2,
    };
    let msg = format!("{}", e);
    assert!(msg.contains('5') && msg.contains('2'));

    let e = FedGuardError::DegenerateDetectionInput {
        clients: 1,
        classes: 3,
    };
    assert!(format!("{}", e).contains("1 client"));

    let e = FedGuardError::MalformedBatch {
        client_id: 9,
        reason: "oops".to_string(),
    };
    assert!(format!("{}", e).contains("client 9: oops"));

    let e = FedGuardError::InvalidConfig("bad".to_string());
    assert!(format!("{}", e).contains("bad"));
}
