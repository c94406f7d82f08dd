//! Aggregator service: accepts submissions and produces screening reports.
//!
//! The service is `Sync`: submissions from many request threads and
//! report requests may run concurrently. The registry serializes them;
//! every report works on its own snapshot and recomputes from scratch.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;
use crate::data::{ClientBatch, ClientId, Sample};
use crate::detection::{AnomalyDetector, DetectionResult};
use crate::error::FedGuardError;
use crate::evaluation::{Accuracy, Classifier, EvaluationPipeline, RandomForest};
use crate::registry::{Registry, RegistrySnapshot};

/// Participation phase relative to an expected client count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Fewer clients than expected have submitted
    Collecting {
        /// Clients registered so far
        registered: usize,
        /// Clients awaited
        expected: usize,
    },
    /// Enough clients have submitted; reports can be produced
    Ready {
        /// Clients registered so far
        registered: usize,
    },
}

/// Comparative training report for one request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Clients in the snapshot the report was computed on
    pub total_clients: usize,
    /// Flagged clients, ascending
    pub suspect_client_ids: Vec<ClientId>,
    /// Accuracy trained on every client's data
    pub all: Accuracy,
    /// Accuracy trained without the suspects' data
    pub filtered: Accuracy,
    /// Per-client signals and thresholds behind the suspect list
    pub detection: DetectionResult,
}

/// Federated aggregator screening Byzantine contributors.
///
/// # Example
///
/// ```rust
/// use fedguard::{AggregatorService, ClientBatch, Sample, ServiceConfig};
///
/// let service = AggregatorService::new(ServiceConfig::default()).unwrap();
/// let batch = ClientBatch::from_samples(0, &[Sample::new(vec![1.0, 2.0], 0)]).unwrap();
/// assert_eq!(service.submit(batch).unwrap(), 1);
///
/// // Still waiting for four more clients
/// assert!(service.train(5).is_err());
/// ```
#[derive(Debug)]
pub struct AggregatorService<C = RandomForest> {
    config: ServiceConfig,
    registry: Registry,
    detector: AnomalyDetector,
    pipeline: EvaluationPipeline<C>,
}

impl AggregatorService<RandomForest> {
    /// Create a service with an empty registry and the configured random forest.
    pub fn new(config: ServiceConfig) -> Result<Self, FedGuardError> {
        let pipeline = EvaluationPipeline::new(config.evaluation.clone())?;
        Self::with_pipeline(config, pipeline)
    }
}

impl<C: Classifier + Clone> AggregatorService<C> {
    /// Create a service around a custom evaluation pipeline.
    pub fn with_pipeline(
        config: ServiceConfig,
        pipeline: EvaluationPipeline<C>,
    ) -> Result<Self, FedGuardError> {
        config.validate()?;
        let detector = AnomalyDetector::new(config.detector.clone())?;
        Ok(Self {
            config,
            registry: Registry::new(),
            detector,
            pipeline,
        })
    }

    /// Service settings.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Underlying registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Store a client's batch, replacing any earlier one.
    ///
    /// Returns the number of distinct clients registered afterwards.
    pub fn submit(&self, batch: ClientBatch) -> Result<usize, FedGuardError> {
        let client_id = batch.client_id();
        let samples = batch.len();
        let total = self.registry.upsert(batch)?;
        info!(
            "received client_id={} | samples={} | total_clients={}",
            client_id, samples, total
        );
        Ok(total)
    }

    /// Build a batch from wire samples and store it.
    pub fn submit_samples(
        &self,
        client_id: ClientId,
        samples: &[Sample],
    ) -> Result<usize, FedGuardError> {
        self.submit(ClientBatch::from_samples(client_id, samples)?)
    }

    /// Ascending ids of every registered client.
    pub fn registered_clients(&self) -> Vec<ClientId> {
        self.registry.snapshot().client_ids()
    }

    /// `0` means "use the configured default".
    fn resolve_expected(&self, expected_clients: usize) -> usize {
        if expected_clients == 0 {
            self.config.default_expected_clients
        } else {
            expected_clients
        }
    }

    /// Current phase with respect to `expected_clients`.
    pub fn phase(&self, expected_clients: usize) -> Phase {
        let expected = self.resolve_expected(expected_clients);
        let registered = self.registry.count();
        if registered < expected {
            Phase::Collecting {
                registered,
                expected,
            }
        } else {
            Phase::Ready { registered }
        }
    }

    /// Run detection on the current registry without training.
    pub fn detect(&self) -> Result<DetectionResult, FedGuardError> {
        self.detector.detect(&self.registry.snapshot())
    }

    /// Screen the current submissions and train with and without suspects.
    ///
    /// Fails with [`FedGuardError::InsufficientParticipants`] while fewer
    /// than `expected_clients` have submitted, and with
    /// [`FedGuardError::DegenerateDetectionInput`] if detection has no peer
    /// basis. Neither failure changes the registry.
    pub fn train(&self, expected_clients: usize) -> Result<TrainingReport, FedGuardError> {
        let expected = self.resolve_expected(expected_clients);
        let snapshot = self.registry.snapshot();
        if snapshot.len() < expected {
            warn!(
                "report requested with {} of {} expected clients",
                snapshot.len(),
                expected
            );
            return Err(FedGuardError::InsufficientParticipants {
                expected,
                actual: snapshot.len(),
            });
        }
        self.report_on(&snapshot)
    }

    /// Produce a report for an explicit snapshot.
    pub fn report_on(&self, snapshot: &RegistrySnapshot) -> Result<TrainingReport, FedGuardError> {
        info!(
            "screening {} clients ({} samples)",
            snapshot.len(),
            snapshot.total_samples()
        );
        let detection = self.detector.detect(snapshot)?;

        for (id, m) in &detection.metrics {
            debug!(
                "client_id={}: centroid_deviation={:.3}, label_inconsistency={:.3}",
                id, m.centroid_deviation, m.label_inconsistency
            );
        }
        debug!(
            "thresholds: centroid_deviation={:.3}, label_inconsistency={:.2}",
            detection.centroid_threshold, detection.label_threshold
        );
        let suspect_client_ids = detection.suspect_ids();
        info!("suspected byzantine clients: {:?}", suspect_client_ids);

        let all = match snapshot.combined()? {
            Some((x, y)) => self.pipeline.evaluate(x.view(), y.view())?,
            None => Accuracy::default(),
        };
        let filtered = match snapshot.combined_where(|id| !detection.is_suspect(id))? {
            Some((x, y)) => self.pipeline.evaluate(x.view(), y.view())?,
            None => {
                warn!("every client was flagged; filtered accuracy reported as zero");
                Accuracy::default()
            }
        };

        info!(
            "accuracy all: train={:.4} test={:.4} | filtered: train={:.4} test={:.4}",
            all.train, all.test, filtered.train, filtered.test
        );

        Ok(TrainingReport {
            total_clients: snapshot.len(),
            suspect_client_ids,
            all,
            filtered,
            detection,
        })
    }

    /// Bounded pool for dispatching concurrent requests to this service.
    pub fn worker_pool(&self) -> Result<rayon::ThreadPool, FedGuardError> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.worker_threads)
            .thread_name(|i| format!("fedguard-worker-{}", i))
            .build()
            .map_err(|e| FedGuardError::InvalidConfig(e.to_string()))
    }
}
