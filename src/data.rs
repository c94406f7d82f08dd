//! Client submissions: labeled samples and per-client batches.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::FedGuardError;

/// Identifier of a federated client (non-negative, unique per submission).
pub type ClientId = u64;

/// Integer class label.
pub type Label = i64;

/// One labeled feature vector as it arrives from a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Real-valued features
    pub features: Vec<f32>,
    /// Class label
    pub label: Label,
}

impl Sample {
    /// Create a sample.
    pub fn new(features: Vec<f32>, label: Label) -> Self {
        Self { features, label }
    }
}

/// A client's batch, stored row-major as a feature matrix plus a label vector.
///
/// Immutable once built; the registry hands out shared references to it.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientBatch {
    client_id: ClientId,
    features: Array2<f32>,
    labels: Array1<Label>,
}

impl ClientBatch {
    /// Build a batch from submitted samples.
    ///
    /// Fails with [`FedGuardError::MalformedBatch`] if `samples` is empty,
    /// has zero-width feature vectors, is ragged, or carries a NaN or
    /// infinite feature.
    pub fn from_samples(client_id: ClientId, samples: &[Sample]) -> Result<Self, FedGuardError> {
        let first = samples.first().ok_or_else(|| FedGuardError::MalformedBatch {
            client_id,
            reason: "batch contains no samples".to_string(),
        })?;

        let n_features = first.features.len();
        if n_features == 0 {
            return Err(FedGuardError::MalformedBatch {
                client_id,
                reason: "samples have no features".to_string(),
            });
        }

        let mut flat = Vec::with_capacity(samples.len() * n_features);
        let mut labels = Vec::with_capacity(samples.len());
        for (row, sample) in samples.iter().enumerate() {
            if sample.features.len() != n_features {
                return Err(FedGuardError::MalformedBatch {
                    client_id,
                    reason: format!(
                        "sample {} has {} features, expected {}",
                        row,
                        sample.features.len(),
                        n_features
                    ),
                });
            }
            flat.extend_from_slice(&sample.features);
            labels.push(sample.label);
        }

        let features = Array2::from_shape_vec((samples.len(), n_features), flat)?;
        Self::from_arrays(client_id, features, Array1::from(labels))
    }

    /// Build a batch directly from arrays, with the same checks as
    /// [`ClientBatch::from_samples`].
    pub fn from_arrays(
        client_id: ClientId,
        features: Array2<f32>,
        labels: Array1<Label>,
    ) -> Result<Self, FedGuardError> {
        if features.nrows() == 0 || features.ncols() == 0 {
            return Err(FedGuardError::MalformedBatch {
                client_id,
                reason: "batch contains no samples".to_string(),
            });
        }
        if features.nrows() != labels.len() {
            return Err(FedGuardError::MalformedBatch {
                client_id,
                reason: format!(
                    "{} feature rows but {} labels",
                    features.nrows(),
                    labels.len()
                ),
            });
        }
        if let Some(((row, col), value)) = features.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(FedGuardError::MalformedBatch {
                client_id,
                reason: format!("sample {} feature {} is {}", row, col, value),
            });
        }
        Ok(Self {
            client_id,
            features,
            labels,
        })
    }

    /// Submitting client.
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Feature matrix, one row per sample.
    pub fn features(&self) -> ArrayView2<'_, f32> {
        self.features.view()
    }

    /// Labels, aligned with the feature rows.
    pub fn labels(&self) -> ArrayView1<'_, Label> {
        self.labels.view()
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the batch has no samples (never true for a constructed batch).
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Feature dimensionality.
    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Convert back to wire samples.
    pub fn to_samples(&self) -> Vec<Sample> {
        self.features
            .rows()
            .into_iter()
            .zip(self.labels.iter())
            .map(|(row, &label)| Sample::new(row.to_vec(), label))
            .collect()
    }
}
