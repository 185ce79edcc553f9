//! Stage descriptors.

use crate::core::{Context, StageKind, StageType};
use crate::errors::PipelineError;
use std::fmt;

/// One declared entry of a pipeline: a stage type tagged with its role.
pub enum StageDescriptor<C> {
    /// A stage run during normal traversal.
    Normal(StageType<C>),
    /// A stage run only when a fault reaches it.
    Recovery(StageType<C>),
}

impl<C: Context> StageDescriptor<C> {
    /// The declared role.
    #[must_use]
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Normal(_) => StageKind::Normal,
            Self::Recovery(_) => StageKind::Recovery,
        }
    }

    /// The declared type.
    #[must_use]
    pub fn stage_type(&self) -> StageType<C> {
        match self {
            Self::Normal(stage_type) | Self::Recovery(stage_type) => *stage_type,
        }
    }

    /// Checks that the type implements the capability its role requires.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidStageKind`] on a mismatch.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let stage_type = self.stage_type();
        if stage_type.capabilities().supports(self.kind()) {
            Ok(())
        } else {
            Err(PipelineError::invalid_kind(stage_type.name(), self.kind()))
        }
    }
}

impl<C> Clone for StageDescriptor<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for StageDescriptor<C> {}

impl<C> PartialEq for StageDescriptor<C> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Normal(a), Self::Normal(b)) | (Self::Recovery(a), Self::Recovery(b)) => a == b,
            _ => false,
        }
    }
}

impl<C> Eq for StageDescriptor<C> {}

impl<C> fmt::Debug for StageDescriptor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal(stage_type) => write!(f, "Normal({})", stage_type.short_name()),
            Self::Recovery(stage_type) => write!(f, "Recovery({})", stage_type.short_name()),
        }
    }
}
