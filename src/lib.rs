//! # FedGuard: Byzantine contributor screening for federated learning
//!
//! FedGuard sits at the aggregator of a federated round. Clients submit
//! labeled batches; before training, the aggregator flags contributors
//! whose data looks statistically out of place and reports accuracy both
//! with and without them.
//!
//! ## Pipeline
//!
//! - [`Registry`] - one batch per client, last write wins
//! - [`AnomalyDetector`] - centroid deviation (feature shift) and label
//!   inconsistency (label flipping) per client, with a robust
//!   `median + k * IQR` threshold
//! - [`EvaluationPipeline`] - stratified split and a random forest, run on
//!   the full pool and on the pool without suspects
//!
//! ## High-Level API
//!
//! Use [`AggregatorService`] to accept submissions and produce
//! [`TrainingReport`]s; [`protocol`] holds transport-independent records.

#![deny(missing_docs)]

pub mod config;
pub mod data;
pub mod detection;
pub mod error;
pub mod evaluation;
pub mod math;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod simulation;

// Re-exports
pub use config::{DetectorConfig, EvaluationConfig, ForestConfig, ServiceConfig};
pub use data::{ClientBatch, ClientId, Label, Sample};
pub use detection::{AnomalyDetector, ClientMetrics, DetectionResult};
pub use error::FedGuardError;
pub use evaluation::{Accuracy, Classifier, EvaluationPipeline, RandomForest};
pub use protocol::{ReportRequest, ReportResponse, SubmitReply, SubmitRequest};
pub use registry::{Registry, RegistrySnapshot};
pub use service::{AggregatorService, Phase, TrainingReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Python bindings via PyO3
#[cfg(feature = "python")]
mod python {
    use numpy::PyReadonlyArray2;
    use pyo3::prelude::*;
    use pyo3::types::PyDict;

    use crate::{AggregatorService, ClientBatch, FedGuardError, ServiceConfig};

    fn fedguard_err(e: FedGuardError) -> PyErr {
        match e {
            FedGuardError::InsufficientParticipants { .. } => {
                PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e))
            }
            _ => PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{}", e)),
        }
    }

    #[pyclass(name = "AggregatorService")]
    struct PyAggregatorService {
        inner: AggregatorService,
    }

    #[pymethods]
    impl PyAggregatorService {
        #[new]
        #[pyo3(signature = (config_json=None))]
        fn new(config_json: Option<String>) -> PyResult<Self> {
            let config = match config_json {
                Some(json) => ServiceConfig::from_json_str(&json).map_err(fedguard_err)?,
                None => ServiceConfig::default(),
            };
            Ok(Self {
                inner: AggregatorService::new(config).map_err(fedguard_err)?,
            })
        }

        fn submit(
            &self,
            client_id: u64,
            features: PyReadonlyArray2<'_, f32>,
            labels: Vec<i64>,
        ) -> PyResult<usize> {
            let batch = ClientBatch::from_arrays(
                client_id,
                features.as_array().to_owned(),
                ndarray::Array1::from(labels),
            )
            .map_err(fedguard_err)?;
            self.inner.submit(batch).map_err(fedguard_err)
        }

        fn train<'py>(&self, py: Python<'py>, expected_clients: usize) -> PyResult<&'py PyDict> {
            let report = self.inner.train(expected_clients).map_err(fedguard_err)?;
            let out = PyDict::new(py);
            out.set_item("total_clients", report.total_clients)?;
            out.set_item("suspect_client_ids", report.suspect_client_ids.clone())?;
            out.set_item("train_accuracy_all", report.all.train)?;
            out.set_item("test_accuracy_all", report.all.test)?;
            out.set_item("train_accuracy_filtered", report.filtered.train)?;
            out.set_item("test_accuracy_filtered", report.filtered.test)?;
            Ok(out)
        }

        fn registered_clients(&self) -> Vec<u64> {
            self.inner.registered_clients()
        }
    }

    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_class::<PyAggregatorService>()?;
        Ok(())
    }
}
