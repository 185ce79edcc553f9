//! Error types for the stagechain framework.
//!
//! Build-time and resolution errors live here. Faults raised while a
//! pipeline runs travel through [`crate::failure::Fault`] and surface to the
//! caller as a [`crate::failure::FailureEnvelope`].

use crate::core::StageKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by the builder, the compiler, and stage factories.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// A declared stage does not implement the capability its role requires.
    #[error("Invalid stage kind: '{type_name}' does not implement the {expected} stage capability")]
    InvalidStageKind {
        /// Name of the offending type.
        type_name: &'static str,
        /// The role the type was declared for.
        expected: StageKind,
    },

    /// A factory could not produce an instance of the requested type.
    #[error("Unresolved type: no registration for '{type_name}'")]
    UnresolvedType {
        /// Name of the requested type.
        type_name: &'static str,
    },

    /// Cancellation was observed before a stage could be created.
    #[error("Pipeline cancelled: {reason}")]
    Cancelled {
        /// The cancellation reason recorded on the token.
        reason: String,
    },
}

impl PipelineError {
    /// Creates an invalid stage kind error.
    #[must_use]
    pub fn invalid_kind(type_name: &'static str, expected: StageKind) -> Self {
        Self::InvalidStageKind {
            type_name,
            expected,
        }
    }

    /// Creates an unresolved type error.
    #[must_use]
    pub fn unresolved(type_name: &'static str) -> Self {
        Self::UnresolvedType { type_name }
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Returns the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidStageKind { .. } => "PIPELINE-001-KIND",
            Self::UnresolvedType { .. } => "PIPELINE-002-UNRESOLVED",
            Self::Cancelled { .. } => "PIPELINE-003-CANCELLED",
        }
    }

    /// Builds structured diagnostics for this error.
    #[must_use]
    pub fn error_info(&self) -> ContractErrorInfo {
        let info = ContractErrorInfo::new(self.code(), self.to_string());
        let info = match ErrorSuggestions::get(self.code()) {
            Some(hint) => info.with_fix_hint(hint),
            None => info,
        };

        match self {
            Self::InvalidStageKind {
                type_name,
                expected,
            } => info
                .with_context_entry("type", *type_name)
                .with_context_entry("expected", expected.to_string()),
            Self::UnresolvedType { type_name } => info.with_context_entry("type", *type_name),
            Self::Cancelled { reason } => info.with_context_entry("reason", reason.clone()),
        }
    }
}

/// Metadata about an error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "PIPELINE-001-KIND").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts to a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("code".to_string(), serde_json::json!(self.code));
        map.insert("summary".to_string(), serde_json::json!(self.summary));

        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::json!(hint));
        }
        if !self.context.is_empty() {
            map.insert("context".to_string(), serde_json::json!(self.context));
        }

        serde_json::Value::Object(map)
    }
}

/// Provides default suggestions for pipeline error codes.
pub struct ErrorSuggestions;

impl ErrorSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "PIPELINE-001-KIND" => Some(
                "Declare the type with the matching token: StageType::stage for normal \
                 stages, StageType::recovery for recovery stages.",
            ),
            "PIPELINE-002-UNRESOLVED" => Some(
                "Register the type with the resolver (or teach your factory about it) \
                 before invoking the pipeline.",
            ),
            "PIPELINE-003-CANCELLED" => Some(
                "The invocation was cancelled by its token; add a recovery stage if the \
                 pipeline should resume instead.",
            ),
            _ => None,
        }
    }
}
