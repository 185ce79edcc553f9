//! Counter context and the stages that operate on it.

use crate::core::StageRef;
use crate::factory::StageResolver;
use crate::failure::{FailureEnvelope, Fault};
use crate::stages::{Next, RecoveryStage, Stage};
use async_trait::async_trait;
use thiserror::Error;

/// A small context for exercising pipelines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counter {
    /// The running value.
    pub n: i32,
    /// Sum of `n` at every fault a [`Catch`] handled.
    pub catch_total: i32,
    /// The failing stage of the last fault a recovery stage saw.
    pub caught: Option<StageRef>,
    /// Names of the fixture stages that ran, in order.
    pub trail: Vec<&'static str>,
}

impl Counter {
    /// A counter starting at `n`.
    #[must_use]
    pub fn new(n: i32) -> Self {
        Self {
            n,
            ..Self::default()
        }
    }
}

/// The fault raised by fixture stages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("test fault at n={n}")]
pub struct TestFault {
    /// Counter value when the fault was raised.
    pub n: i32,
}

/// Multiplies by five, then continues.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultiplyByFive;

#[async_trait]
impl Stage<Counter> for MultiplyByFive {
    async fn invoke(&self, ctx: &mut Counter, next: Next<'_, Counter>) -> Result<(), Fault<Counter>> {
        ctx.n *= 5;
        ctx.trail.push("multiply");
        next.run(ctx).await
    }
}

/// Adds one, then continues.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncrementByOne;

#[async_trait]
impl Stage<Counter> for IncrementByOne {
    async fn invoke(&self, ctx: &mut Counter, next: Next<'_, Counter>) -> Result<(), Fault<Counter>> {
        ctx.n += 1;
        ctx.trail.push("increment");
        next.run(ctx).await
    }
}

/// Never continues.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stop;

#[async_trait]
impl Stage<Counter> for Stop {
    async fn invoke(&self, ctx: &mut Counter, _next: Next<'_, Counter>) -> Result<(), Fault<Counter>> {
        ctx.trail.push("stop");
        Ok(())
    }
}

/// Always raises a [`TestFault`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Throw;

#[async_trait]
impl Stage<Counter> for Throw {
    async fn invoke(&self, ctx: &mut Counter, _next: Next<'_, Counter>) -> Result<(), Fault<Counter>> {
        ctx.trail.push("throw");
        Err(TestFault { n: ctx.n }.into())
    }
}

/// Adds one and raises a [`TestFault`] unless the counter reached five.
#[derive(Debug, Clone, Copy, Default)]
pub struct SucceedAtFive;

#[async_trait]
impl Stage<Counter> for SucceedAtFive {
    async fn invoke(&self, ctx: &mut Counter, next: Next<'_, Counter>) -> Result<(), Fault<Counter>> {
        ctx.n += 1;
        ctx.trail.push("succeed_at_five");
        if ctx.n == 5 {
            next.run(ctx).await
        } else {
            Err(TestFault { n: ctx.n }.into())
        }
    }
}

/// Recovery stage that records the fault and resumes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Catch;

#[async_trait]
impl RecoveryStage<Counter> for Catch {
    async fn invoke(
        &self,
        ctx: &mut Counter,
        failure: &FailureEnvelope<Counter>,
        next: Next<'_, Counter>,
    ) -> Result<(), Fault<Counter>> {
        ctx.catch_total += ctx.n;
        ctx.caught = Some(failure.stage());
        ctx.trail.push("catch");
        next.run(ctx).await
    }
}

/// Recovery stage that records the fault and raises a new one.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rethrow;

#[async_trait]
impl RecoveryStage<Counter> for Rethrow {
    async fn invoke(
        &self,
        ctx: &mut Counter,
        failure: &FailureEnvelope<Counter>,
        _next: Next<'_, Counter>,
    ) -> Result<(), Fault<Counter>> {
        ctx.caught = Some(failure.stage());
        ctx.trail.push("rethrow");
        Err(TestFault { n: ctx.n }.into())
    }
}

/// A resolver knowing every fixture stage and a default [`Counter`].
#[must_use]
pub fn counter_resolver() -> StageResolver<Counter> {
    let resolver = StageResolver::new();
    resolver.register_default_context();
    resolver.register_stage(|| MultiplyByFive);
    resolver.register_stage(|| IncrementByOne);
    resolver.register_stage(|| Stop);
    resolver.register_stage(|| Throw);
    resolver.register_stage(|| SucceedAtFive);
    resolver.register_recovery(|| Catch);
    resolver.register_recovery(|| Rethrow);
    resolver
}
