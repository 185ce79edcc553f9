//! Runs compiled pipelines.
//!
//! Every normal position is a segment: create the stage, invoke it with the
//! next segment as its continuation, release it, then settle the outcome.
//! A raised fault is wrapped by the segment of the stage that raised it and
//! handed to that position's recovery target. An already wrapped fault
//! passes through every enclosing segment unchanged.

use super::compiler::Step;
use super::CompiledPipeline;
use crate::cancellation::CancellationToken;
use crate::core::Context;
use crate::errors::PipelineError;
use crate::factory::{ReleaseGuard, StageFactory};
use crate::failure::{FailureEnvelope, Fault, InvokeError};
use crate::stages::Next;
use futures::future::BoxFuture;
use uuid::Uuid;

/// State of one invocation, threaded through every segment.
pub(crate) struct Invocation<'a, C: Context> {
    id: Uuid,
    factory: &'a dyn StageFactory<C>,
    cancellation: Option<&'a CancellationToken>,
}

impl<C: Context> Invocation<'_, C> {
    fn ensure_active(&self) -> Result<(), PipelineError> {
        self.cancellation.map_or(Ok(()), CancellationToken::check)
    }
}

impl<C: Context> CompiledPipeline<C> {
    /// Runs the pipeline on a context obtained from the factory.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Context`] if the factory cannot create a
    /// context, or [`InvokeError::Failed`] if a fault escaped the pipeline.
    pub async fn invoke<F>(&self, factory: &F) -> Result<C, InvokeError<C>>
    where
        F: StageFactory<C>,
    {
        let ctx = factory.create_context()?;
        self.execute(ctx, factory, None)
            .await
            .map_err(InvokeError::Failed)
    }

    /// Runs the pipeline on a caller-supplied context.
    ///
    /// On success the context is handed back as the stages left it. On
    /// failure it is attached to the returned envelope.
    ///
    /// # Errors
    ///
    /// Returns the envelope of a fault that no recovery stage handled.
    pub async fn invoke_with<F>(&self, ctx: C, factory: &F) -> Result<C, FailureEnvelope<C>>
    where
        F: StageFactory<C>,
    {
        self.execute(ctx, factory, None).await.map_err(|envelope| *envelope)
    }

    /// Like [`Self::invoke_with`], observing `token` before every normal
    /// stage is created.
    ///
    /// A cancellation seen at a segment is a fault of that segment. Recovery
    /// stages still run for it, but every normal stage after them fails the
    /// same way.
    ///
    /// # Errors
    ///
    /// Returns the envelope of a fault that no recovery stage handled.
    pub async fn invoke_cancellable<F>(
        &self,
        ctx: C,
        factory: &F,
        token: &CancellationToken,
    ) -> Result<C, FailureEnvelope<C>>
    where
        F: StageFactory<C>,
    {
        self.execute(ctx, factory, Some(token))
            .await
            .map_err(|envelope| *envelope)
    }

    async fn execute(
        &self,
        mut ctx: C,
        factory: &dyn StageFactory<C>,
        cancellation: Option<&CancellationToken>,
    ) -> Result<C, Box<FailureEnvelope<C>>> {
        let invocation = Invocation {
            id: Uuid::new_v4(),
            factory,
            cancellation,
        };

        match self.run_segment(self.root, &mut ctx, &invocation).await {
            Ok(()) => Ok(ctx),
            Err(mut envelope) => {
                envelope.attach_context(ctx);
                Err(envelope)
            }
        }
    }

    /// Runs the segment rooted at `position`; `None` is the no-op segment.
    pub(crate) fn run_segment<'s>(
        &'s self,
        position: Option<usize>,
        ctx: &'s mut C,
        invocation: &'s Invocation<'s, C>,
    ) -> BoxFuture<'s, Result<(), Box<FailureEnvelope<C>>>> {
        Box::pin(async move {
            let Some(position) = position else {
                return Ok(());
            };
            let step = &self.steps[position];
            let outcome = self.invoke_stage(step, ctx, invocation).await;
            self.settle(step, outcome, ctx, invocation).await
        })
    }

    async fn invoke_stage(
        &self,
        step: &Step<C>,
        ctx: &mut C,
        invocation: &Invocation<'_, C>,
    ) -> Result<(), Fault<C>> {
        invocation.ensure_active()?;
        let stage = invocation.factory.create(&step.stage_type)?;
        let stage = ReleaseGuard::new(invocation.factory, step.stage_type, stage);
        stage
            .invoke(ctx, Next::segment(self, step.continuation, invocation))
            .await
    }

    async fn invoke_recovery(
        &self,
        step: &Step<C>,
        failure: &FailureEnvelope<C>,
        ctx: &mut C,
        invocation: &Invocation<'_, C>,
    ) -> Result<(), Fault<C>> {
        let handler = invocation.factory.create_recovery(&step.stage_type)?;
        let handler = ReleaseGuard::new(invocation.factory, step.stage_type, handler);
        handler
            .invoke(ctx, failure, Next::segment(self, step.continuation, invocation))
            .await
    }

    /// Resolves the outcome of the stage at `step`, running recovery
    /// stages for as long as they raise fresh faults.
    async fn settle<'p>(
        &'p self,
        mut step: &'p Step<C>,
        mut outcome: Result<(), Fault<C>>,
        ctx: &mut C,
        invocation: &Invocation<'_, C>,
    ) -> Result<(), Box<FailureEnvelope<C>>> {
        loop {
            let causes = match outcome {
                Ok(()) => return Ok(()),
                Err(Fault::Wrapped(envelope)) => return Err(envelope),
                Err(Fault::Raised(causes)) => causes,
            };

            let envelope = Box::new(FailureEnvelope::new(invocation.id, step.stage_ref, causes));
            let Some(target) = step.recovery else {
                return Err(envelope);
            };

            step = &self.steps[target];
            outcome = self
                .invoke_recovery(step, &envelope, ctx, invocation)
                .await;
        }
    }
}
