//! Stage kind and capability flags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The role a stage plays in a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// A stage run during normal traversal.
    Normal,
    /// A stage run only when a fault reaches it.
    Recovery,
}

impl Default for StageKind {
    fn default() -> Self {
        Self::Normal
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Recovery => write!(f, "recovery"),
        }
    }
}

/// Capabilities a stage type implements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StageCapabilities {
    /// Whether the type implements [`crate::stages::Stage`].
    pub stage: bool,
    /// Whether the type implements [`crate::stages::RecoveryStage`].
    pub recovery: bool,
}

impl StageCapabilities {
    /// Creates an empty capability set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stage capability.
    #[must_use]
    pub fn with_stage(mut self) -> Self {
        self.stage = true;
        self
    }

    /// Sets the recovery capability.
    #[must_use]
    pub fn with_recovery(mut self) -> Self {
        self.recovery = true;
        self
    }

    /// Returns true if the set satisfies the given role.
    #[must_use]
    pub fn supports(&self, kind: StageKind) -> bool {
        match kind {
            StageKind::Normal => self.stage,
            StageKind::Recovery => self.recovery,
        }
    }
}
