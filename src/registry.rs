//! Submission registry: one batch per client, last write wins.
//!
//! All mutations and snapshot reads go through a single mutex, so a
//! snapshot never observes a half-applied upsert. Batches are stored
//! behind [`Arc`], which makes snapshots cheap and isolated: a later
//! upsert swaps the `Arc` in the live map and leaves existing snapshots
//! untouched.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use ndarray::{Array1, Array2, Axis};

use crate::data::{ClientBatch, ClientId, Label};
use crate::error::FedGuardError;

/// Thread-safe map from client id to its most recent batch.
#[derive(Debug, Default)]
pub struct Registry {
    batches: Mutex<BTreeMap<ClientId, Arc<ClientBatch>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ClientId, Arc<ClientBatch>>> {
        // The map is only ever replaced entry-wise, so a poisoned guard
        // still holds a consistent state.
        self.batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store or replace the batch for `batch.client_id()`.
    ///
    /// The feature width must match every *other* registered client; the
    /// batch being replaced does not constrain its own successor. Returns
    /// the number of distinct clients after the upsert.
    pub fn upsert(&self, batch: ClientBatch) -> Result<usize, FedGuardError> {
        let client_id = batch.client_id();
        let mut batches = self.lock();

        if let Some(other) = batches.values().find(|b| b.client_id() != client_id) {
            if other.n_features() != batch.n_features() {
                return Err(FedGuardError::MalformedBatch {
                    client_id,
                    reason: format!(
                        "batch has {} features, registry holds {}",
                        batch.n_features(),
                        other.n_features()
                    ),
                });
            }
        }

        batches.insert(client_id, Arc::new(batch));
        Ok(batches.len())
    }

    /// Number of distinct clients stored.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Latest batch for a client.
    pub fn get(&self, client_id: ClientId) -> Option<Arc<ClientBatch>> {
        self.lock().get(&client_id).cloned()
    }

    /// Point-in-time view of every stored batch.
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            batches: self.lock().clone(),
        }
    }
}

/// Immutable view of the registry, ordered by ascending client id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegistrySnapshot {
    batches: BTreeMap<ClientId, Arc<ClientBatch>>,
}

impl RegistrySnapshot {
    /// Build a snapshot from batches directly (later duplicates win).
    pub fn from_batches(batches: impl IntoIterator<Item = ClientBatch>) -> Self {
        Self {
            batches: batches
                .into_iter()
                .map(|b| (b.client_id(), Arc::new(b)))
                .collect(),
        }
    }

    /// Ascending client ids.
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.batches.keys().copied().collect()
    }

    /// Number of clients.
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Whether the snapshot holds no clients.
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Batch of one client.
    pub fn get(&self, client_id: ClientId) -> Option<&ClientBatch> {
        self.batches.get(&client_id).map(Arc::as_ref)
    }

    /// Iterate `(id, batch)` in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (ClientId, &ClientBatch)> {
        self.batches.iter().map(|(&id, b)| (id, b.as_ref()))
    }

    /// Total number of samples across all clients.
    pub fn total_samples(&self) -> usize {
        self.batches.values().map(|b| b.len()).sum()
    }

    /// Concatenate the batches of the clients accepted by `keep`, in
    /// ascending id order. Returns `None` when no client is selected.
    pub fn combined_where<F>(
        &self,
        mut keep: F,
    ) -> Result<Option<(Array2<f32>, Array1<Label>)>, FedGuardError>
    where
        F: FnMut(ClientId) -> bool,
    {
        let selected: Vec<&ClientBatch> = self
            .batches
            .iter()
            .filter(|(&id, _)| keep(id))
            .map(|(_, b)| b.as_ref())
            .collect();
        if selected.is_empty() {
            return Ok(None);
        }

        let feature_views: Vec<_> = selected.iter().map(|b| b.features()).collect();
        let label_views: Vec<_> = selected.iter().map(|b| b.labels()).collect();
        let features = ndarray::concatenate(Axis(0), &feature_views)?;
        let labels = ndarray::concatenate(Axis(0), &label_views)?;
        Ok(Some((features, labels)))
    }

    /// Concatenate every batch, in ascending id order.
    pub fn combined(&self) -> Result<Option<(Array2<f32>, Array1<Label>)>, FedGuardError> {
        self.combined_where(|_| true)
    }
}
