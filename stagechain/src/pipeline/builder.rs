//! Append-only pipeline builder.

use super::{compile, CompiledPipeline, StageDescriptor};
use crate::core::{Context, StageType};
use crate::errors::PipelineError;
use crate::resilience::PolicyStage;
use crate::stages::{RecoveryStage, Stage};
use std::fmt;

/// Builder for pipeline declarations.
///
/// Appending is the only mutation and declaration order is pipeline order.
/// The same type may be appended any number of times.
pub struct PipelineBuilder<C> {
    descriptors: Vec<StageDescriptor<C>>,
}

impl<C: Context> Default for PipelineBuilder<C> {
    fn default() -> Self {
        Self {
            descriptors: Vec::new(),
        }
    }
}

impl<C: Context> PipelineBuilder<C> {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a normal stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidStageKind`] if the type does not
    /// implement [`Stage`]. The builder is left unchanged.
    pub fn append_normal(&mut self, stage_type: StageType<C>) -> Result<&mut Self, PipelineError> {
        self.append(StageDescriptor::Normal(stage_type))
    }

    /// Appends a recovery stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidStageKind`] if the type does not
    /// implement [`RecoveryStage`]. The builder is left unchanged.
    pub fn append_recovery(
        &mut self,
        stage_type: StageType<C>,
    ) -> Result<&mut Self, PipelineError> {
        self.append(StageDescriptor::Recovery(stage_type))
    }

    /// Appends a descriptor after checking its capability.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidStageKind`] on a capability mismatch.
    pub fn append(&mut self, descriptor: StageDescriptor<C>) -> Result<&mut Self, PipelineError> {
        descriptor.validate()?;
        self.descriptors.push(descriptor);
        Ok(self)
    }

    /// Appends the normal stage `S`.
    pub fn stage<S: Stage<C> + 'static>(&mut self) -> &mut Self {
        self.descriptors
            .push(StageDescriptor::Normal(StageType::stage::<S>()));
        self
    }

    /// Appends the recovery stage `R`.
    pub fn recovery<R: RecoveryStage<C> + 'static>(&mut self) -> &mut Self {
        self.descriptors
            .push(StageDescriptor::Recovery(StageType::recovery::<R>()));
        self
    }

    /// Appends `S` wrapped in its resilience decorator.
    ///
    /// The factory must know how to build `PolicyStage<S>`; see
    /// [`crate::factory::StageResolver::register_with_policy`].
    pub fn stage_with_policy<S: Stage<C> + 'static>(&mut self) -> &mut Self {
        self.stage::<PolicyStage<S>>()
    }

    /// The declared descriptors, in order.
    #[must_use]
    pub fn descriptors(&self) -> &[StageDescriptor<C>] {
        &self.descriptors
    }

    /// Number of declared stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns true if nothing was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Compiles the declaration.
    ///
    /// The builder is not consumed; building twice yields two pipelines with
    /// identical behavior.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidStageKind`] if a descriptor fails its
    /// capability check.
    pub fn build(&self) -> Result<CompiledPipeline<C>, PipelineError> {
        compile(&self.descriptors)
    }
}

impl<C> fmt::Debug for PipelineBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("descriptors", &self.descriptors)
            .finish()
    }
}
