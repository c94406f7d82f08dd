//! Error types for FedGuard

use thiserror::Error;

use crate::data::ClientId;

/// All possible errors in FedGuard
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FedGuardError {
    /// A submitted batch was empty, ragged, or disagreed with the registry's feature width
    #[error("Malformed batch from client {client_id}: {reason}")]
    MalformedBatch {
        /// Client that submitted the batch
        client_id: ClientId,
        /// What was wrong with it
        reason: String,
    },

    /// A report was requested before enough clients had submitted
    #[error("Insufficient participants: expected {expected}, got {actual}")]
    InsufficientParticipants {
        /// Number of clients the caller waits for
        expected: usize,
        /// Number of distinct clients currently registered
        actual: usize,
    },

    /// Detection needs at least two clients and two label classes
    #[error("Degenerate detection input: {clients} client(s), {classes} label class(es)")]
    DegenerateDetectionInput {
        /// Distinct clients in the snapshot
        clients: usize,
        /// Distinct label classes across all clients
        classes: usize,
    },

    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be parsed
    #[error("Configuration parse error: {0}")]
    Config(String),

    /// A protocol record failed boundary validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The classifier failed to fit
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// Array shape mismatch
    #[error("Array shape error: {0}")]
    ShapeError(String),
}

impl FedGuardError {
    /// Whether the caller can recover by waiting for more submissions.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FedGuardError::InsufficientParticipants { .. })
    }
}

impl From<ndarray::ShapeError> for FedGuardError {
    fn from(e: ndarray::ShapeError) -> Self {
        FedGuardError::ShapeError(e.to_string())
    }
}

impl From<serde_json::Error> for FedGuardError {
    fn from(e: serde_json::Error) -> Self {
        FedGuardError::Config(e.to_string())
    }
}
