//! Caller-side rendering of failure envelopes.

use crate::core::StageKind;
use crate::failure::FailureEnvelope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

/// A serializable summary of a [`FailureEnvelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Identifier of the failed invocation.
    pub invocation_id: Uuid,
    /// Type name of the failing stage.
    pub stage: String,
    /// Declared position of the failing stage.
    pub position: usize,
    /// Role of the failing stage.
    pub kind: StageKind,
    /// Rendered causes, each with its source chain.
    pub causes: Vec<String>,
    /// When the fault was wrapped.
    pub failed_at: DateTime<Utc>,
}

impl FailureReport {
    /// Summarizes `envelope`.
    #[must_use]
    pub fn from_envelope<C>(envelope: &FailureEnvelope<C>) -> Self {
        let stage = envelope.stage();
        Self {
            invocation_id: envelope.invocation_id(),
            stage: stage.short_name().to_string(),
            position: stage.position(),
            kind: stage.kind(),
            causes: envelope
                .causes()
                .iter()
                .map(|cause| format!("{cause:#}"))
                .collect(),
            failed_at: envelope.failed_at(),
        }
    }

    /// Converts to a JSON value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Logs `envelope` at error level and returns its report.
pub fn report_failure<C>(envelope: &FailureEnvelope<C>) -> FailureReport {
    let report = FailureReport::from_envelope(envelope);
    error!(
        invocation_id = %report.invocation_id,
        stage = %report.stage,
        position = report.position,
        kind = %report.kind,
        causes = ?report.causes,
        "Pipeline invocation failed"
    );
    report
}
