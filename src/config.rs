//! Tunable parameters for detection, evaluation and the service.
//!
//! Every record implements [`Default`] with the values the screening
//! pipeline was calibrated against, and deserializes with
//! `#[serde(default)]` so partial JSON documents are accepted.

use serde::{Deserialize, Serialize};

use crate::error::FedGuardError;

/// Default IQR multiplier for the centroid-deviation threshold.
pub const DEFAULT_IQR_K: f64 = 3.0;

/// Absolute offset above the median used when the IQR collapses to zero.
pub const DEFAULT_DEGENERATE_OFFSET: f64 = 3.0;

/// Default bound on the label-inconsistency rate.
pub const DEFAULT_LABEL_THRESHOLD: f64 = 0.35;

/// Default seed for splits and forests.
pub const DEFAULT_SEED: u64 = 42;

/// Anomaly detector parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Multiplier `k` in `median + k * IQR`
    pub iqr_k: f64,
    /// Offset used instead of `k * IQR` when the IQR is zero
    pub degenerate_offset: f64,
    /// Fixed bound on the label-inconsistency rate
    pub label_threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            iqr_k: DEFAULT_IQR_K,
            degenerate_offset: DEFAULT_DEGENERATE_OFFSET,
            label_threshold: DEFAULT_LABEL_THRESHOLD,
        }
    }
}

impl DetectorConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), FedGuardError> {
        if !self.iqr_k.is_finite() || self.iqr_k < 0.0 {
            return Err(FedGuardError::InvalidConfig(format!(
                "iqr_k must be finite and non-negative, got {}",
                self.iqr_k
            )));
        }
        if !self.degenerate_offset.is_finite() || self.degenerate_offset < 0.0 {
            return Err(FedGuardError::InvalidConfig(format!(
                "degenerate_offset must be finite and non-negative, got {}",
                self.degenerate_offset
            )));
        }
        if !(0.0..=1.0).contains(&self.label_threshold) {
            return Err(FedGuardError::InvalidConfig(format!(
                "label_threshold must be in [0, 1], got {}",
                self.label_threshold
            )));
        }
        Ok(())
    }
}

/// Random-forest parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum tree depth (`None` grows until leaves are pure)
    pub max_depth: Option<usize>,
    /// Minimum number of samples required to split a node
    pub min_samples_split: usize,
    /// Seed for bootstrap draws
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: None,
            min_samples_split: 2,
            seed: DEFAULT_SEED,
        }
    }
}

impl ForestConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), FedGuardError> {
        if self.n_estimators == 0 {
            return Err(FedGuardError::InvalidConfig(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if self.min_samples_split < 2 {
            return Err(FedGuardError::InvalidConfig(format!(
                "min_samples_split must be at least 2, got {}",
                self.min_samples_split
            )));
        }
        if self.max_depth == Some(0) {
            return Err(FedGuardError::InvalidConfig(
                "max_depth must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Evaluation pipeline parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Fraction of each class held out for testing
    pub test_fraction: f64,
    /// Seed for the stratified split
    pub seed: u64,
    /// Default classifier settings
    pub forest: ForestConfig,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: DEFAULT_SEED,
            forest: ForestConfig::default(),
        }
    }
}

impl EvaluationConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), FedGuardError> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(FedGuardError::InvalidConfig(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        self.forest.validate()
    }
}

/// Aggregator service parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Participants awaited when a report request leaves the count unset (0)
    pub default_expected_clients: usize,
    /// Size of the bounded worker pool that dispatches requests
    pub worker_threads: usize,
    /// Detector settings
    pub detector: DetectorConfig,
    /// Evaluation settings
    pub evaluation: EvaluationConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_expected_clients: 5,
            worker_threads: 8,
            detector: DetectorConfig::default(),
            evaluation: EvaluationConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, FedGuardError> {
        let config: ServiceConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges of this record and every nested one.
    pub fn validate(&self) -> Result<(), FedGuardError> {
        if self.default_expected_clients == 0 {
            return Err(FedGuardError::InvalidConfig(
                "default_expected_clients must be at least 1".to_string(),
            ));
        }
        if self.worker_threads == 0 {
            return Err(FedGuardError::InvalidConfig(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        self.detector.validate()?;
        self.evaluation.validate()
    }
}
