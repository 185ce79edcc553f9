//! Stage traits and implementations.
//!
//! Stages are the units of work in a stagechain pipeline. Each stage gets
//! the shared context and a [`Next`] continuation; calling the continuation
//! runs the rest of the pipeline, not calling it stops the pipeline there.

mod next;

pub use next::Next;

use crate::core::Context;
use crate::failure::{FailureEnvelope, Fault};
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage<C: Context>: Send + Sync {
    /// Returns the name of the stage.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Invokes the stage.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The context shared by every stage of the invocation
    /// * `next` - The rest of the pipeline
    ///
    /// # Errors
    ///
    /// Returns a raised fault when the stage itself fails, or the fault
    /// propagated out of `next`.
    async fn invoke(&self, ctx: &mut C, next: Next<'_, C>) -> Result<(), Fault<C>>;
}

/// Trait for recovery stages.
///
/// A recovery stage is skipped during normal traversal. It runs only when a
/// fault raised upstream reaches it, and decides whether the pipeline
/// resumes (by calling `next`) or stops.
#[async_trait]
pub trait RecoveryStage<C: Context>: Send + Sync {
    /// Returns the name of the stage.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Handles the fault described by `failure`.
    ///
    /// # Errors
    ///
    /// Returns a raised fault to fail the pipeline from this stage, or the
    /// fault propagated out of `next`.
    async fn invoke(
        &self,
        ctx: &mut C,
        failure: &FailureEnvelope<C>,
        next: Next<'_, C>,
    ) -> Result<(), Fault<C>>;
}

/// A stage built from a synchronous closure.
///
/// The closure runs first; the pipeline continues when it returns `Ok`.
pub struct FnStage<F> {
    name: String,
    func: F,
}

impl<F> FnStage<F> {
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<C, F> Stage<C> for FnStage<F>
where
    C: Context,
    F: Fn(&mut C) -> Result<(), Fault<C>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, ctx: &mut C, next: Next<'_, C>) -> Result<(), Fault<C>> {
        (self.func)(ctx)?;
        next.run(ctx).await
    }
}

/// A stage that does nothing but continue.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughStage;

#[async_trait]
impl<C: Context> Stage<C> for PassThroughStage {
    async fn invoke(&self, ctx: &mut C, next: Next<'_, C>) -> Result<(), Fault<C>> {
        next.run(ctx).await
    }
}
