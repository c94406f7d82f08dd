//! Byzantine contributor detection over a registry snapshot.
//!
//! Two per-client signals are computed in a global z-score space:
//!
//! | Signal | Catches | Threshold |
//! |--------|---------|-----------|
//! | centroid deviation | feature shift, noise injection | `median + k * IQR` across clients |
//! | label inconsistency | label flipping | fixed rate (default 0.35) |
//!
//! A client is a suspect if either signal strictly exceeds its threshold.
//! The centroid threshold is computed once over the whole population,
//! suspects included.

pub mod standardize;
pub mod threshold;

pub use standardize::Standardizer;
pub use threshold::{exceeds, robust_threshold};

use std::collections::{BTreeMap, BTreeSet};

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::DetectorConfig;
use crate::data::{ClientId, Label};
use crate::error::FedGuardError;
use crate::math::norms::l2_dist_sq;
use crate::registry::RegistrySnapshot;

/// Both detection signals for one client.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientMetrics {
    /// Max absolute offset of the client's standardized feature means from the global mean
    pub centroid_deviation: f64,
    /// Fraction of the client's samples whose nearest class centroid disagrees with the label
    pub label_inconsistency: f64,
}

/// Outcome of one detection pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Per-client signals, ascending by id
    pub metrics: BTreeMap<ClientId, ClientMetrics>,
    /// Threshold applied to centroid deviation
    pub centroid_threshold: f64,
    /// Threshold applied to label inconsistency
    pub label_threshold: f64,
    /// Clients flagged by either signal
    pub suspects: BTreeSet<ClientId>,
}

impl DetectionResult {
    /// Suspect ids in ascending order.
    pub fn suspect_ids(&self) -> Vec<ClientId> {
        self.suspects.iter().copied().collect()
    }

    /// Whether `client_id` was flagged.
    pub fn is_suspect(&self, client_id: ClientId) -> bool {
        self.suspects.contains(&client_id)
    }

    /// Ids that were not flagged, ascending.
    pub fn retained_ids(&self) -> Vec<ClientId> {
        self.metrics
            .keys()
            .filter(|id| !self.suspects.contains(id))
            .copied()
            .collect()
    }
}

/// Apply both thresholds to precomputed metrics.
pub fn flag_suspects(
    metrics: &BTreeMap<ClientId, ClientMetrics>,
    centroid_threshold: f64,
    label_threshold: f64,
) -> BTreeSet<ClientId> {
    metrics
        .iter()
        .filter(|(_, m)| {
            exceeds(m.centroid_deviation, centroid_threshold)
                || exceeds(m.label_inconsistency, label_threshold)
        })
        .map(|(&id, _)| id)
        .collect()
}

/// Stateless detector configured once and run against snapshots.
#[derive(Clone, Debug, Default)]
pub struct AnomalyDetector {
    config: DetectorConfig,
}

impl AnomalyDetector {
    /// Create a detector.
    pub fn new(config: DetectorConfig) -> Result<Self, FedGuardError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Detector settings.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Run detection over `snapshot`.
    ///
    /// Requires at least two clients and two label classes across the pool,
    /// otherwise returns [`FedGuardError::DegenerateDetectionInput`].
    pub fn detect(&self, snapshot: &RegistrySnapshot) -> Result<DetectionResult, FedGuardError> {
        let (features, labels) = match snapshot.combined()? {
            Some(pool) => pool,
            None => {
                return Err(FedGuardError::DegenerateDetectionInput {
                    clients: 0,
                    classes: 0,
                })
            }
        };

        let classes: Vec<Label> = labels
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if snapshot.len() < 2 || classes.len() < 2 {
            return Err(FedGuardError::DegenerateDetectionInput {
                clients: snapshot.len(),
                classes: classes.len(),
            });
        }

        let pooled = features.mapv(f64::from);
        let (_, z) = Standardizer::fit_transform(pooled.view())?;
        let global_mean = z
            .mean_axis(Axis(0))
            .ok_or_else(|| FedGuardError::ShapeError("empty pool".to_string()))?;
        let centroids = class_centroids(z.view(), labels.view(), &classes)?;

        let mut ranges = Vec::with_capacity(snapshot.len());
        let mut start = 0;
        for (id, batch) in snapshot.iter() {
            ranges.push((id, start, start + batch.len()));
            start += batch.len();
        }

        let computed: Vec<(ClientId, ClientMetrics)> = ranges
            .par_iter()
            .map(|&(id, s, e)| {
                let zc = z.slice(ndarray::s![s..e, ..]);
                let yc = labels.slice(ndarray::s![s..e]);
                let metrics = ClientMetrics {
                    centroid_deviation: centroid_deviation(zc, global_mean.view()),
                    label_inconsistency: label_inconsistency(zc, yc, centroids.view(), &classes),
                };
                (id, metrics)
            })
            .collect();
        let metrics: BTreeMap<ClientId, ClientMetrics> = computed.into_iter().collect();

        let deviations: Vec<f64> = metrics.values().map(|m| m.centroid_deviation).collect();
        let centroid_threshold = robust_threshold(
            &deviations,
            self.config.iqr_k,
            self.config.degenerate_offset,
        )
        .ok_or_else(|| FedGuardError::ShapeError("no client metrics".to_string()))?;
        let label_threshold = self.config.label_threshold;
        let suspects = flag_suspects(&metrics, centroid_threshold, label_threshold);

        Ok(DetectionResult {
            metrics,
            centroid_threshold,
            label_threshold,
            suspects,
        })
    }
}

/// Mean standardized vector of each class, rows ordered like `classes`.
fn class_centroids(
    z: ArrayView2<'_, f64>,
    labels: ArrayView1<'_, Label>,
    classes: &[Label],
) -> Result<Array2<f64>, FedGuardError> {
    let mut sums = Array2::<f64>::zeros((classes.len(), z.ncols()));
    let mut counts = vec![0usize; classes.len()];
    for (row, label) in z.rows().into_iter().zip(labels.iter()) {
        let k = classes
            .binary_search(label)
            .map_err(|_| FedGuardError::ShapeError(format!("unknown label {}", label)))?;
        let mut acc = sums.row_mut(k);
        acc += &row;
        counts[k] += 1;
    }
    for (mut row, &count) in sums.rows_mut().into_iter().zip(counts.iter()) {
        // Every class in `classes` was observed at least once.
        row /= count as f64;
    }
    Ok(sums)
}

fn centroid_deviation(zc: ArrayView2<'_, f64>, global_mean: ArrayView1<'_, f64>) -> f64 {
    match zc.mean_axis(Axis(0)) {
        Some(client_mean) => (&client_mean - &global_mean)
            .iter()
            .fold(0.0f64, |acc, d| acc.max(d.abs())),
        None => 0.0,
    }
}

/// Index of the nearest centroid; ties go to the lowest class.
fn nearest_centroid(sample: ArrayView1<'_, f64>, centroids: ArrayView2<'_, f64>) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (k, centroid) in centroids.rows().into_iter().enumerate() {
        let dist = l2_dist_sq(sample, centroid);
        // Batches reject non-finite features, so every distance is finite
        debug_assert!(dist.is_finite(), "non-finite distance to centroid {}", k);
        if dist < best_dist {
            best = k;
            best_dist = dist;
        }
    }
    best
}

fn label_inconsistency(
    zc: ArrayView2<'_, f64>,
    yc: ArrayView1<'_, Label>,
    centroids: ArrayView2<'_, f64>,
    classes: &[Label],
) -> f64 {
    if yc.is_empty() {
        return 0.0;
    }
    let assigned = nearest_centroid_labels(zc, centroids, classes);
    let mismatches = assigned
        .iter()
        .zip(yc.iter())
        .filter(|(a, y)| a != y)
        .count();
    mismatches as f64 / yc.len() as f64
}

/// Label each row of `z` with its nearest centroid's class.
fn nearest_centroid_labels(
    z: ArrayView2<'_, f64>,
    centroids: ArrayView2<'_, f64>,
    classes: &[Label],
) -> Array1<Label> {
    z.rows()
        .into_iter()
        .map(|row| classes[nearest_centroid(row, centroids)])
        .collect()
}
