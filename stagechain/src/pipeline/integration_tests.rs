//! End-to-end tests of compiled pipelines against the counter fixtures.

use super::{CompiledPipeline, PipelineBuilder};
use crate::cancellation::CancellationToken;
use crate::core::{StageKind, StageType};
use crate::errors::PipelineError;
use crate::factory::{StageFactory, StageResolver};
use crate::failure::{Fault, InvokeError};
use crate::resilience::{JitterStrategy, PolicyStage, RetryConfig, RetryPolicy};
use crate::stages::{Next, Stage};
use crate::testing::{
    assert_balanced, assert_failed_at, assert_never_created, counter_resolver, Catch, Counter,
    FactoryAction, IncrementByOne, MultiplyByFive, RecordingFactory, Rethrow, Stop,
    SucceedAtFive, TestFault, Throw,
};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn build(declare: impl FnOnce(&mut PipelineBuilder<Counter>)) -> CompiledPipeline<Counter> {
    let mut builder = PipelineBuilder::new();
    declare(&mut builder);
    builder.build().unwrap()
}

fn recording() -> RecordingFactory<StageResolver<Counter>> {
    RecordingFactory::new(counter_resolver())
}

#[tokio::test]
async fn test_stages_run_in_declared_order() {
    let factory = recording();
    let pipeline = build(|b| {
        b.stage::<MultiplyByFive>().stage::<IncrementByOne>();
    });

    let ctx = pipeline.invoke_with(Counter::new(1), &factory).await.unwrap();

    assert_eq!(ctx.n, 6);
    assert_eq!(ctx.trail, vec!["multiply", "increment"]);

    let created_a = factory.position_of::<MultiplyByFive>(FactoryAction::Created, 0);
    let created_b = factory.position_of::<IncrementByOne>(FactoryAction::Created, 0);
    let released_a = factory.position_of::<MultiplyByFive>(FactoryAction::Released, 0);
    let released_b = factory.position_of::<IncrementByOne>(FactoryAction::Released, 0);
    assert!(created_a < created_b);
    // B runs inside A's continuation, so it is created while A is still
    // live and released before A.
    assert!(released_b < released_a);
    assert_balanced(&factory);
}

#[tokio::test]
async fn test_short_circuit_stops_pipeline() {
    let factory = recording();
    let pipeline = build(|b| {
        b.stage::<MultiplyByFive>()
            .stage::<Stop>()
            .stage::<IncrementByOne>();
    });

    let ctx = pipeline.invoke_with(Counter::new(5), &factory).await.unwrap();

    assert_eq!(ctx.n, 25);
    assert_never_created::<IncrementByOne, _>(&factory);
    assert_eq!(factory.released::<IncrementByOne>(), 0);
    assert_eq!(factory.released::<Stop>(), 1);
    assert_balanced(&factory);
}

#[tokio::test]
async fn test_fault_without_recovery_propagates() {
    let factory = recording();
    let pipeline = build(|b| {
        b.stage::<MultiplyByFive>()
            .stage::<Throw>()
            .stage::<IncrementByOne>();
    });

    let envelope = pipeline
        .invoke_with(Counter::new(5), &factory)
        .await
        .unwrap_err();

    assert_failed_at::<Throw, _>(&envelope);
    assert_eq!(envelope.stage().position(), 1);
    assert_eq!(envelope.stage().kind(), StageKind::Normal);
    assert_eq!(envelope.context().map(|ctx| ctx.n), Some(25));
    assert_eq!(envelope.find_cause::<TestFault>(), Some(&TestFault { n: 25 }));
    assert_never_created::<IncrementByOne, _>(&factory);
    assert_balanced(&factory);
}

#[tokio::test]
async fn test_every_instance_released_once() {
    let factory = recording();
    let pipelines = [
        build(|b| {
            b.stage::<MultiplyByFive>().stage::<IncrementByOne>();
        }),
        build(|b| {
            b.stage::<Throw>().recovery::<Catch>().stage::<Stop>();
        }),
        build(|b| {
            b.stage::<IncrementByOne>().stage::<Throw>().recovery::<Rethrow>();
        }),
    ];

    for pipeline in &pipelines {
        let _ = pipeline.invoke_with(Counter::new(2), &factory).await;
    }

    for event in factory.events() {
        let created = factory
            .events()
            .iter()
            .filter(|e| e.action == FactoryAction::Created && e.type_id == event.type_id)
            .count();
        let released = factory
            .events()
            .iter()
            .filter(|e| e.action == FactoryAction::Released && e.type_id == event.type_id)
            .count();
        assert_eq!(created, released, "unbalanced {}", event.name);
    }
    assert_balanced(&factory);
}

#[tokio::test]
async fn test_nearest_recovery_handles_each_fault() {
    let factory = recording();
    let pipeline = build(|b| {
        b.stage::<IncrementByOne>()
            .stage::<Throw>()
            .stage::<IncrementByOne>()
            .recovery::<Catch>()
            .stage::<IncrementByOne>()
            .stage::<Throw>()
            .stage::<IncrementByOne>()
            .recovery::<Catch>()
            .stage::<IncrementByOne>();
    });

    let ctx = pipeline.invoke_with(Counter::new(5), &factory).await.unwrap();

    assert_eq!(ctx.catch_total, 13);
    assert_eq!(ctx.n, 8);
    assert_eq!(
        ctx.trail,
        vec!["increment", "throw", "catch", "increment", "throw", "catch", "increment"]
    );
    assert_eq!(ctx.caught.map(|stage| stage.position()), Some(5));
    assert_eq!(factory.created::<Catch>(), 2);
    assert_balanced(&factory);
}

#[tokio::test]
async fn test_recovery_not_triggered_without_fault() {
    let factory = recording();
    let pipeline = build(|b| {
        b.stage::<MultiplyByFive>()
            .recovery::<Catch>()
            .stage::<IncrementByOne>();
    });

    let ctx = pipeline.invoke_with(Counter::new(5), &factory).await.unwrap();

    assert_eq!(ctx.n, 26);
    assert_eq!(ctx.caught, None);
    assert_never_created::<Catch, _>(&factory);
}

#[tokio::test]
async fn test_fault_skips_to_catch() {
    let factory = recording();
    let pipeline = build(|b| {
        b.stage::<MultiplyByFive>()
            .stage::<Throw>()
            .stage::<MultiplyByFive>()
            .stage::<MultiplyByFive>()
            .stage::<MultiplyByFive>()
            .recovery::<Catch>()
            .stage::<IncrementByOne>();
    });

    let ctx = pipeline.invoke_with(Counter::new(5), &factory).await.unwrap();

    assert_eq!(ctx.n, 26);
    assert_eq!(factory.created::<MultiplyByFive>(), 1);
    assert!(ctx.caught.is_some_and(|stage| stage.is::<Throw>() && stage.position() == 1));
    assert_balanced(&factory);
}

#[tokio::test]
async fn test_compiling_twice_behaves_identically() {
    let resolver = counter_resolver();
    let mut builder = PipelineBuilder::<Counter>::new();
    builder
        .stage::<IncrementByOne>()
        .stage::<Throw>()
        .recovery::<Catch>()
        .stage::<MultiplyByFive>();

    let first = builder.build().unwrap();
    let second = builder.build().unwrap();

    let a = first.invoke_with(Counter::new(3), &resolver).await.unwrap();
    let b = second.invoke_with(Counter::new(3), &resolver).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a.n, 20);
}

#[test]
fn test_invalid_registration_leaves_builder_unchanged() {
    let mut builder = PipelineBuilder::<Counter>::new();
    builder.stage::<MultiplyByFive>();

    let err = builder.append_normal(StageType::of::<i32>()).err().unwrap();

    assert_eq!(err, PipelineError::invalid_kind("i32", StageKind::Normal));
    assert_eq!(builder.len(), 1);
}

#[tokio::test]
async fn test_factory_made_context() {
    let resolver = counter_resolver();
    let pipeline = build(|b| {
        b.stage::<IncrementByOne>().stage::<MultiplyByFive>();
    });

    let ctx = pipeline.invoke(&resolver).await.unwrap();

    assert_eq!(ctx.n, 5);
}

#[tokio::test]
async fn test_missing_context_registration() {
    let resolver = StageResolver::<Counter>::new();
    let pipeline = build(|b| {
        b.stage::<IncrementByOne>();
    });

    let err = pipeline.invoke(&resolver).await.unwrap_err();

    assert!(matches!(
        err,
        InvokeError::Context(PipelineError::UnresolvedType { .. })
    ));
}

#[tokio::test]
async fn test_failure_through_invoke_keeps_context() {
    let resolver = counter_resolver();
    let pipeline = build(|b| {
        b.stage::<IncrementByOne>().stage::<Throw>();
    });

    let envelope = pipeline
        .invoke(&resolver)
        .await
        .unwrap_err()
        .into_envelope()
        .unwrap();

    assert_failed_at::<Throw, _>(&envelope);
    assert_eq!(envelope.into_context().map(|ctx| ctx.n), Some(1));
}

#[tokio::test]
async fn test_catch_runs_once_for_skipped_faults() {
    let factory = recording();
    let pipeline = build(|b| {
        b.stage::<Throw>()
            .stage::<IncrementByOne>()
            .stage::<Throw>()
            .recovery::<Catch>();
    });

    let ctx = pipeline.invoke_with(Counter::new(5), &factory).await.unwrap();

    assert_eq!(ctx.catch_total, 5);
    assert_eq!(ctx.trail, vec!["throw", "catch"]);
    assert_eq!(factory.created::<Catch>(), 1);
    assert_eq!(factory.created::<Throw>(), 1);
}

fn quick_retry(max_attempts: u32) -> Arc<RetryPolicy> {
    Arc::new(RetryPolicy::new(
        RetryConfig::new()
            .with_max_attempts(max_attempts)
            .with_base_delay_ms(0)
            .with_jitter(JitterStrategy::None),
    ))
}

#[tokio::test]
async fn test_policy_stage_retries_until_success() {
    let resolver = counter_resolver();
    resolver.register_with_policy(|| SucceedAtFive, quick_retry(6));
    let pipeline = build(|b| {
        b.stage_with_policy::<SucceedAtFive>().stage::<MultiplyByFive>();
    });

    let ctx = pipeline.invoke_with(Counter::new(1), &resolver).await.unwrap();

    assert_eq!(ctx.n, 25);
    assert_eq!(ctx.trail.iter().filter(|s| **s == "succeed_at_five").count(), 4);
}

#[tokio::test]
async fn test_policy_stage_exhausted() {
    let factory = recording();
    factory
        .inner()
        .register_with_policy(|| SucceedAtFive, quick_retry(6));
    let pipeline = build(|b| {
        b.stage_with_policy::<SucceedAtFive>().stage::<MultiplyByFive>();
    });

    let envelope = pipeline
        .invoke_with(Counter::new(-2), &factory)
        .await
        .unwrap_err();

    assert_failed_at::<PolicyStage<SucceedAtFive>, _>(&envelope);
    assert_eq!(envelope.find_cause::<TestFault>(), Some(&TestFault { n: 4 }));
    assert_never_created::<MultiplyByFive, _>(&factory);
    assert_balanced(&factory);
}

#[tokio::test]
async fn test_cancelled_before_invocation() {
    let factory = recording();
    let token = CancellationToken::new();
    token.cancel("shutdown");
    let pipeline = build(|b| {
        b.stage::<MultiplyByFive>().stage::<IncrementByOne>();
    });

    let envelope = pipeline
        .invoke_cancellable(Counter::new(5), &factory, &token)
        .await
        .unwrap_err();

    assert_failed_at::<MultiplyByFive, _>(&envelope);
    assert_eq!(envelope.stage().position(), 0);
    assert_eq!(
        envelope.find_cause::<PipelineError>(),
        Some(&PipelineError::cancelled("shutdown"))
    );
    assert!(factory.events().is_empty());
    assert_eq!(envelope.context().map(|ctx| ctx.n), Some(5));
}

struct CancelInside(Arc<CancellationToken>);

#[async_trait]
impl Stage<Counter> for CancelInside {
    async fn invoke(&self, ctx: &mut Counter, next: Next<'_, Counter>) -> Result<(), Fault<Counter>> {
        self.0.cancel("stage requested");
        next.run(ctx).await
    }
}

#[tokio::test]
async fn test_cancellation_reaches_recovery() {
    let token = Arc::new(CancellationToken::new());
    let resolver = StageResolver::<Counter>::new();
    let inside = Arc::clone(&token);
    resolver.register_stage(move || CancelInside(Arc::clone(&inside)));
    resolver.register_stage(|| IncrementByOne);
    resolver.register_recovery(|| Catch);
    let pipeline = build(|b| {
        b.stage::<CancelInside>()
            .stage::<IncrementByOne>()
            .recovery::<Catch>()
            .stage::<IncrementByOne>();
    });

    let envelope = pipeline
        .invoke_cancellable(Counter::new(0), &resolver, &token)
        .await
        .unwrap_err();

    assert_failed_at::<IncrementByOne, _>(&envelope);
    assert_eq!(envelope.stage().position(), 3);
    let ctx = envelope.context().unwrap();
    assert_eq!(ctx.n, 0);
    assert_eq!(ctx.trail, vec!["catch"]);
    assert!(ctx.caught.is_some_and(|stage| stage.position() == 1));
}

#[tokio::test]
async fn test_unresolved_type_is_a_fault() {
    let resolver = StageResolver::<Counter>::new();
    resolver.register_stage(|| MultiplyByFive);
    let pipeline = build(|b| {
        b.stage::<MultiplyByFive>().stage::<IncrementByOne>();
    });

    let envelope = pipeline
        .invoke_with(Counter::new(1), &resolver)
        .await
        .unwrap_err();

    assert_failed_at::<IncrementByOne, _>(&envelope);
    assert!(matches!(
        envelope.find_cause::<PipelineError>(),
        Some(PipelineError::UnresolvedType { .. })
    ));
    assert_eq!(envelope.context().map(|ctx| ctx.n), Some(5));
}

#[tokio::test]
async fn test_unresolved_type_caught_by_later_recovery() {
    let resolver = StageResolver::<Counter>::new();
    resolver.register_stage(|| MultiplyByFive);
    resolver.register_recovery(|| Catch);
    let pipeline = build(|b| {
        b.stage::<IncrementByOne>()
            .recovery::<Catch>()
            .stage::<MultiplyByFive>();
    });

    let ctx = pipeline.invoke_with(Counter::new(2), &resolver).await.unwrap();

    assert_eq!(ctx.n, 10);
    assert!(ctx.caught.is_some_and(|stage| stage.is::<IncrementByOne>()));
}

#[tokio::test]
async fn test_recovery_fault_without_further_recovery() {
    let factory = recording();
    let pipeline = build(|b| {
        b.stage::<Throw>().recovery::<Rethrow>().stage::<IncrementByOne>();
    });

    let envelope = pipeline
        .invoke_with(Counter::new(1), &factory)
        .await
        .unwrap_err();

    assert_failed_at::<Rethrow, _>(&envelope);
    assert_eq!(envelope.stage().kind(), StageKind::Recovery);
    let ctx = envelope.context().unwrap();
    assert!(ctx.caught.is_some_and(|stage| stage.is::<Throw>()));
    assert_balanced(&factory);
}

#[tokio::test]
async fn test_recovery_fault_caught_by_next_recovery() {
    let pipeline = build(|b| {
        b.stage::<Throw>()
            .recovery::<Rethrow>()
            .stage::<MultiplyByFive>()
            .recovery::<Catch>()
            .stage::<IncrementByOne>();
    });

    let ctx = pipeline
        .invoke_with(Counter::new(1), &counter_resolver())
        .await
        .unwrap();

    assert_eq!(ctx.trail, vec!["throw", "rethrow", "catch", "increment"]);
    assert!(ctx.caught.is_some_and(|stage| stage.is::<Rethrow>() && stage.position() == 1));
    assert_eq!(ctx.n, 2);
}

#[tokio::test]
async fn test_recovery_before_fault_is_never_eligible() {
    let factory = recording();
    let pipeline = build(|b| {
        b.stage::<IncrementByOne>()
            .recovery::<Catch>()
            .stage::<Throw>();
    });

    let envelope = pipeline
        .invoke_with(Counter::new(0), &factory)
        .await
        .unwrap_err();

    assert_failed_at::<Throw, _>(&envelope);
    assert_never_created::<Catch, _>(&factory);
}

#[tokio::test]
async fn test_empty_pipeline_is_a_no_op() {
    let pipeline = build(|_| {});

    let ctx = pipeline
        .invoke_with(Counter::new(7), &counter_resolver())
        .await
        .unwrap();

    assert_eq!(ctx, Counter::new(7));
}

struct Aggregate;

#[async_trait]
impl Stage<Counter> for Aggregate {
    async fn invoke(&self, ctx: &mut Counter, _next: Next<'_, Counter>) -> Result<(), Fault<Counter>> {
        Err(Fault::aggregate([
            anyhow::Error::new(TestFault { n: ctx.n }),
            anyhow::anyhow!("secondary"),
        ]))
    }
}

#[tokio::test]
async fn test_envelope_keeps_every_cause() {
    let resolver = counter_resolver();
    resolver.register_stage(|| Aggregate);
    let pipeline = build(|b| {
        b.stage::<Aggregate>();
    });

    let envelope = pipeline
        .invoke_with(Counter::new(3), &resolver)
        .await
        .unwrap_err();

    assert_eq!(envelope.causes().len(), 2);
    assert_eq!(envelope.causes()[1].to_string(), "secondary");
}

#[tokio::test]
async fn test_concurrent_invocations_are_independent() {
    let resolver = counter_resolver();
    let pipeline = build(|b| {
        b.stage::<MultiplyByFive>()
            .stage::<Throw>()
            .recovery::<Catch>()
            .stage::<IncrementByOne>();
    });

    let runs = (0..8).map(|i| pipeline.invoke_with(Counter::new(i), &resolver));
    let results = futures::future::join_all(runs).await;

    for (i, result) in (0..8).zip(results) {
        let ctx = result.unwrap();
        assert_eq!(ctx.n, i * 5 + 1);
        assert_eq!(ctx.catch_total, i * 5);
    }
}

struct Explode;

#[async_trait]
impl Stage<Counter> for Explode {
    async fn invoke(&self, _ctx: &mut Counter, _next: Next<'_, Counter>) -> Result<(), Fault<Counter>> {
        panic!("stage exploded");
    }
}

#[tokio::test]
async fn test_instances_released_when_stage_panics() {
    let factory = Arc::new(recording());
    factory.inner().register_stage(|| Explode);
    let pipeline = build(|b| {
        b.stage::<MultiplyByFive>().stage::<Explode>();
    });

    let task = {
        let factory = Arc::clone(&factory);
        tokio::spawn(async move { pipeline.invoke_with(Counter::new(1), &factory).await })
    };
    let err = task.await.unwrap_err();

    assert!(err.is_panic());
    assert_eq!(factory.released::<Explode>(), 1);
    assert_balanced(&factory);
}

struct Hang;

#[async_trait]
impl Stage<Counter> for Hang {
    async fn invoke(&self, ctx: &mut Counter, next: Next<'_, Counter>) -> Result<(), Fault<Counter>> {
        std::future::pending::<()>().await;
        next.run(ctx).await
    }
}

#[tokio::test]
async fn test_instances_released_when_invocation_dropped() {
    let factory = recording();
    factory.inner().register_stage(|| Hang);
    let pipeline = build(|b| {
        b.stage::<IncrementByOne>().stage::<Hang>();
    });

    let outcome = tokio::time::timeout(
        Duration::from_millis(20),
        pipeline.invoke_with(Counter::new(0), &factory),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(factory.created::<Hang>(), 1);
    assert_balanced(&factory);
}

#[test]
fn test_compiled_pipeline_is_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<CompiledPipeline<Counter>>();
    assert_send_sync::<StageResolver<Counter>>();

    let pipeline = build(|b| {
        b.stage::<IncrementByOne>();
    });
    let clone = pipeline.clone();
    assert_eq!(clone.len(), pipeline.len());
    assert!(StageFactory::<Counter>::create_context(&counter_resolver()).is_ok());
}
