//! Synthetic federated clients for exercising the aggregator.
//!
//! Serves the Iris dataset, deals it into stratified per-client folds, and
//! applies one of several client behaviours before submission. Client `i`
//! perturbs its shard with seed `1000 + i`.

mod iris;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::data::{ClientBatch, ClientId, Label};
use crate::error::FedGuardError;

/// Standard deviation of the noise a [`ClientBehavior::GaussianNoise`] client adds.
pub const NOISE_STD: f64 = 3.0;

/// Value a [`ClientBehavior::SingleFeatureBlowup`] client writes into surviving rows.
pub const BLOWUP_VALUE: f32 = 1e6;

/// Share of rows a [`ClientBehavior::SingleFeatureBlowup`] client zeroes.
pub const BLOWUP_ZERO_FRACTION: f64 = 0.99;

/// Offset of the per-client perturbation seed.
pub const CLIENT_SEED_BASE: u64 = 1000;

/// How a simulated client treats its shard before submitting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientBehavior {
    /// Submits the shard unchanged
    Honest,
    /// Adds N(0, 3) noise to every feature
    GaussianNoise,
    /// Zeroes one random feature in ~99% of rows and sets it to 1e6 elsewhere
    SingleFeatureBlowup,
    /// Replaces every label `y` with `(y + 1) mod K`
    LabelFlip,
}

impl ClientBehavior {
    /// Whether the behaviour is adversarial.
    pub fn is_byzantine(self) -> bool {
        self != ClientBehavior::Honest
    }

    /// Perturb a shard according to this behaviour.
    pub fn apply<R: Rng>(
        self,
        mut features: Array2<f32>,
        mut labels: Array1<Label>,
        rng: &mut R,
    ) -> (Array2<f32>, Array1<Label>) {
        match self {
            ClientBehavior::Honest => {}
            ClientBehavior::GaussianNoise => {
                if let Ok(noise) = Normal::new(0.0, NOISE_STD) {
                    features.mapv_inplace(|v| v + noise.sample(&mut *rng) as f32);
                }
            }
            ClientBehavior::SingleFeatureBlowup => {
                let (n, d) = features.dim();
                if n > 0 && d > 0 {
                    let j = rng.gen_range(0..d);
                    let mut zeroed: Vec<bool> =
                        (0..n).map(|_| rng.gen::<f64>() < BLOWUP_ZERO_FRACTION).collect();
                    if zeroed.iter().all(|&z| z) {
                        zeroed[rng.gen_range(0..n)] = false;
                    }
                    for (row, &z) in zeroed.iter().enumerate() {
                        features[[row, j]] = if z { 0.0 } else { BLOWUP_VALUE };
                    }
                }
            }
            ClientBehavior::LabelFlip => {
                let k = labels.iter().collect::<BTreeSet<_>>().len() as Label;
                if k > 0 {
                    labels.mapv_inplace(|y| (y + 1).rem_euclid(k));
                }
            }
        }
        (features, labels)
    }
}

impl fmt::Display for ClientBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientBehavior::Honest => "honest",
            ClientBehavior::GaussianNoise => "gaussian_noise",
            ClientBehavior::SingleFeatureBlowup => "single_feature_blowup",
            ClientBehavior::LabelFlip => "label_flip",
        };
        f.write_str(name)
    }
}

impl FromStr for ClientBehavior {
    type Err = FedGuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "honest" => Ok(ClientBehavior::Honest),
            "gaussian_noise" => Ok(ClientBehavior::GaussianNoise),
            "single_feature_blowup" => Ok(ClientBehavior::SingleFeatureBlowup),
            "label_flip" => Ok(ClientBehavior::LabelFlip),
            other => Err(FedGuardError::InvalidRequest(format!(
                "unknown client behaviour '{}'",
                other
            ))),
        }
    }
}

/// The 150-row Iris dataset as `(features, labels)`, rows ordered by class.
pub fn iris() -> (Array2<f32>, Array1<Label>) {
    let features = Array2::from_shape_fn((iris::IRIS.len(), 4), |(row, j)| iris::IRIS[row].0[j]);
    let labels = iris::IRIS.iter().map(|&(_, label)| label).collect();
    (features, labels)
}

/// Deal rows into `k` disjoint folds, each class spread evenly.
///
/// Rows of every class are shuffled and assigned round-robin.
pub fn stratified_folds(labels: &[Label], k: usize, seed: u64) -> Vec<Vec<usize>> {
    let mut folds = vec![Vec::new(); k];
    if k == 0 {
        return folds;
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let classes: BTreeSet<Label> = labels.iter().copied().collect();
    for class in classes {
        let mut rows: Vec<usize> = (0..labels.len()).filter(|&r| labels[r] == class).collect();
        rows.shuffle(&mut rng);
        for (i, row) in rows.into_iter().enumerate() {
            folds[i % k].push(row);
        }
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    folds
}

/// Build one batch per behaviour: client `i` gets fold `i` perturbed by `behaviors[i]`.
pub fn simulate_clients(
    features: &Array2<f32>,
    labels: &Array1<Label>,
    behaviors: &[ClientBehavior],
    seed: u64,
) -> Result<Vec<ClientBatch>, FedGuardError> {
    let label_vec = labels.to_vec();
    let folds = stratified_folds(&label_vec, behaviors.len(), seed);
    folds
        .into_iter()
        .zip(behaviors.iter())
        .enumerate()
        .map(|(i, (rows, &behavior))| {
            let client_id = i as ClientId;
            let x = features.select(Axis(0), &rows);
            let y = labels.select(Axis(0), &rows);
            let mut rng = ChaCha8Rng::seed_from_u64(CLIENT_SEED_BASE + client_id);
            let (x, y) = behavior.apply(x, y, &mut rng);
            ClientBatch::from_arrays(client_id, x, y)
        })
        .collect()
}
