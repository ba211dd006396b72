use serde_json::Value;
use shared::domain::SubmissionId;
use tracing::{error, info};

use crate::error::SubmitError;

/// Receives the outcome of each dispatched submission. Exactly one of the two
/// methods is called per submission.
pub trait DiagnosticSink: Send + Sync {
    fn log(&self, submission_id: SubmissionId, value: &Value);
    fn error(&self, submission_id: SubmissionId, error: &SubmitError);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn log(&self, submission_id: SubmissionId, value: &Value) {
        info!(%submission_id, response = %value, "submit: response received");
    }

    fn error(&self, submission_id: SubmissionId, error: &SubmitError) {
        error!(%submission_id, %error, "submit: request failed");
    }
}
