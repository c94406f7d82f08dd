//! Transport-independent request and response records.
//!
//! A transport (gRPC, HTTP, in-process channels) decodes its payloads into
//! these records, hands them to [`AggregatorService`], and encodes the
//! replies. Failures map onto [`ErrorReply`] with a stable code.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::data::{ClientBatch, ClientId, Sample};
use crate::error::FedGuardError;
use crate::evaluation::Classifier;
use crate::service::{AggregatorService, TrainingReport};

/// A client's batch submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Submitting client
    pub client_id: ClientId,
    /// Labeled samples, in client order
    pub samples: Vec<Sample>,
}

impl From<&ClientBatch> for SubmitRequest {
    fn from(batch: &ClientBatch) -> Self {
        Self {
            client_id: batch.client_id(),
            samples: batch.to_samples(),
        }
    }
}

/// Acknowledgment of a stored submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmitReply {
    /// Whether the batch was stored
    pub accepted: bool,
    /// Distinct clients registered after this submission
    pub total_registered: usize,
    /// Human-readable detail
    pub message: String,
}

/// Request for a screening report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    /// Participants to wait for (`0` selects the service default)
    pub expected_clients: usize,
}

/// Report returned to the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportResponse {
    /// Clients the report was computed over
    pub total_clients: usize,
    /// Number of clients excluded from the filtered run
    pub filtered_clients: usize,
    /// Flagged clients, ascending
    pub suspect_client_ids: Vec<ClientId>,
    /// Training accuracy with every client
    pub train_accuracy_all: f64,
    /// Test accuracy with every client
    pub test_accuracy_all: f64,
    /// Training accuracy without suspects
    pub train_accuracy_filtered: f64,
    /// Test accuracy without suspects
    pub test_accuracy_filtered: f64,
}

impl From<&TrainingReport> for ReportResponse {
    fn from(report: &TrainingReport) -> Self {
        Self {
            total_clients: report.total_clients,
            filtered_clients: report.suspect_client_ids.len(),
            suspect_client_ids: report.suspect_client_ids.clone(),
            train_accuracy_all: report.all.train,
            test_accuracy_all: report.all.test,
            train_accuracy_filtered: report.filtered.train,
            test_accuracy_filtered: report.filtered.test,
        }
    }
}

/// Stable failure category for transports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request payload was rejected
    InvalidArgument,
    /// State does not allow the request yet; retry later
    FailedPrecondition,
    /// Detection cannot run on the current submissions
    DegenerateInput,
    /// Anything else
    Internal,
}

/// Structured failure reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    /// Failure category
    pub code: ErrorCode,
    /// Human-readable detail
    pub message: String,
    /// Participants awaited, set for precondition failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<usize>,
    /// Participants registered, set for precondition failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<usize>,
}

impl From<&FedGuardError> for ErrorReply {
    fn from(err: &FedGuardError) -> Self {
        let (code, expected, actual) = match err {
            FedGuardError::MalformedBatch { .. } | FedGuardError::InvalidRequest(_) => {
                (ErrorCode::InvalidArgument, None, None)
            }
            FedGuardError::InsufficientParticipants { expected, actual } => (
                ErrorCode::FailedPrecondition,
                Some(*expected),
                Some(*actual),
            ),
            FedGuardError::DegenerateDetectionInput { .. } => {
                (ErrorCode::DegenerateInput, None, None)
            }
            _ => (ErrorCode::Internal, None, None),
        };
        Self {
            code,
            message: err.to_string(),
            expected,
            actual,
        }
    }
}

/// Decode a JSON request, reporting missing or mistyped fields.
pub fn decode<T: DeserializeOwned>(json: &str) -> Result<T, FedGuardError> {
    serde_json::from_str(json).map_err(|e| FedGuardError::InvalidRequest(e.to_string()))
}

impl<C: Classifier + Clone> AggregatorService<C> {
    /// Handle a decoded submission.
    pub fn handle_submit(&self, request: &SubmitRequest) -> Result<SubmitReply, FedGuardError> {
        let total = self.submit_samples(request.client_id, &request.samples)?;
        Ok(SubmitReply {
            accepted: true,
            total_registered: total,
            message: format!(
                "received client_id={} | samples={} | total_clients={}",
                request.client_id,
                request.samples.len(),
                total
            ),
        })
    }

    /// Handle a decoded report request.
    pub fn handle_report(&self, request: &ReportRequest) -> Result<ReportResponse, FedGuardError> {
        let report = self.train(request.expected_clients)?;
        Ok(ReportResponse::from(&report))
    }
}
