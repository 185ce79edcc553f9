//! Stage factories.
//!
//! A pipeline only holds [`StageType`] tokens. Instances are requested from
//! a [`StageFactory`] when their segment runs and handed back through
//! [`StageFactory::release`] when the invocation is done with them.

mod resolver;

pub use resolver::{ResolverScope, StageResolver};

use crate::core::{Context, StageKind, StageType};
use crate::errors::PipelineError;
use crate::failure::{FailureEnvelope, Fault};
use crate::stages::{Next, RecoveryStage, Stage};
use async_trait::async_trait;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Produces stage instances and contexts for pipeline invocations.
pub trait StageFactory<C: Context>: Send + Sync {
    /// Creates an instance of a normal stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnresolvedType`] if the factory does not
    /// know the type.
    fn create(&self, stage_type: &StageType<C>) -> Result<Box<dyn Stage<C>>, PipelineError>;

    /// Creates an instance of a recovery stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnresolvedType`] if the factory does not
    /// know the type.
    fn create_recovery(
        &self,
        stage_type: &StageType<C>,
    ) -> Result<Box<dyn RecoveryStage<C>>, PipelineError>;

    /// Takes back an instance created by this factory.
    ///
    /// Called exactly once per created instance.
    fn release(&self, instance: StageInstance<C>) {
        drop(instance);
    }

    /// Creates a fresh context.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnresolvedType`] unless overridden.
    fn create_context(&self) -> Result<C, PipelineError> {
        Err(PipelineError::unresolved(std::any::type_name::<C>()))
    }
}

impl<C: Context, F: StageFactory<C> + ?Sized> StageFactory<C> for Arc<F> {
    fn create(&self, stage_type: &StageType<C>) -> Result<Box<dyn Stage<C>>, PipelineError> {
        (**self).create(stage_type)
    }

    fn create_recovery(
        &self,
        stage_type: &StageType<C>,
    ) -> Result<Box<dyn RecoveryStage<C>>, PipelineError> {
        (**self).create_recovery(stage_type)
    }

    fn release(&self, instance: StageInstance<C>) {
        (**self).release(instance);
    }

    fn create_context(&self) -> Result<C, PipelineError> {
        (**self).create_context()
    }
}

/// A stage instance being handed back to its factory.
pub enum StageInstance<C: Context> {
    /// An instance created by [`StageFactory::create`].
    Normal {
        /// The token the instance was created for.
        stage_type: StageType<C>,
        /// The instance.
        stage: Box<dyn Stage<C>>,
    },
    /// An instance created by [`StageFactory::create_recovery`].
    Recovery {
        /// The token the instance was created for.
        stage_type: StageType<C>,
        /// The instance.
        stage: Box<dyn RecoveryStage<C>>,
    },
}

impl<C: Context> StageInstance<C> {
    /// The token the instance was created for.
    #[must_use]
    pub fn stage_type(&self) -> StageType<C> {
        match self {
            Self::Normal { stage_type, .. } | Self::Recovery { stage_type, .. } => *stage_type,
        }
    }

    /// The role the instance was created for.
    #[must_use]
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Normal { .. } => StageKind::Normal,
            Self::Recovery { .. } => StageKind::Recovery,
        }
    }
}

impl<C: Context> fmt::Debug for StageInstance<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageInstance")
            .field("kind", &self.kind())
            .field("stage_type", &self.stage_type())
            .finish()
    }
}

pub(crate) trait Releasable<C: Context> {
    /// An inert instance left behind once the real one is handed back.
    fn vacant() -> Box<Self>;

    fn into_instance(self: Box<Self>, stage_type: StageType<C>) -> StageInstance<C>;
}

impl<C: Context> Releasable<C> for dyn Stage<C> {
    fn vacant() -> Box<Self> {
        Box::new(Vacant)
    }

    fn into_instance(self: Box<Self>, stage_type: StageType<C>) -> StageInstance<C> {
        StageInstance::Normal {
            stage_type,
            stage: self,
        }
    }
}

impl<C: Context> Releasable<C> for dyn RecoveryStage<C> {
    fn vacant() -> Box<Self> {
        Box::new(Vacant)
    }

    fn into_instance(self: Box<Self>, stage_type: StageType<C>) -> StageInstance<C> {
        StageInstance::Recovery {
            stage_type,
            stage: self,
        }
    }
}

/// Stand-in for a released instance. Never invoked.
struct Vacant;

#[async_trait]
impl<C: Context> Stage<C> for Vacant {
    async fn invoke(&self, _ctx: &mut C, _next: Next<'_, C>) -> Result<(), Fault<C>> {
        Ok(())
    }
}

#[async_trait]
impl<C: Context> RecoveryStage<C> for Vacant {
    async fn invoke(
        &self,
        _ctx: &mut C,
        _failure: &FailureEnvelope<C>,
        _next: Next<'_, C>,
    ) -> Result<(), Fault<C>> {
        Ok(())
    }
}

/// Hands an instance back to its factory when dropped.
///
/// Dropping covers normal completion, early return, a dropped invocation
/// future and unwinding.
pub(crate) struct ReleaseGuard<'a, C: Context, S: ?Sized + Releasable<C>> {
    factory: &'a dyn StageFactory<C>,
    stage_type: StageType<C>,
    stage: Box<S>,
}

impl<'a, C: Context, S: ?Sized + Releasable<C>> ReleaseGuard<'a, C, S> {
    pub(crate) fn new(
        factory: &'a dyn StageFactory<C>,
        stage_type: StageType<C>,
        stage: Box<S>,
    ) -> Self {
        Self {
            factory,
            stage_type,
            stage,
        }
    }
}

impl<C: Context, S: ?Sized + Releasable<C>> Deref for ReleaseGuard<'_, C, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.stage
    }
}

impl<C: Context, S: ?Sized + Releasable<C>> Drop for ReleaseGuard<'_, C, S> {
    fn drop(&mut self) {
        let stage = std::mem::replace(&mut self.stage, S::vacant());
        self.factory.release(stage.into_instance(self.stage_type));
    }
}
