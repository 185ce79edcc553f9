//! The policy decorator stage, policy composition and configuration.

use super::{
    CircuitBreaker, CircuitBreakerConfig, PolicyError, ResiliencePolicy, RetryConfig,
    RetryDecision, RetryPolicy,
};
use crate::core::Context;
use crate::failure::Fault;
use crate::stages::{Next, Stage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Runs an inner stage under a [`ResiliencePolicy`].
///
/// Each attempt gets a probe continuation. After the first successful
/// attempt the decorator runs its own continuation if, and only if, that
/// attempt called its probe. When the policy gives up, the last failure is
/// raised as the decorator's own fault.
pub struct PolicyStage<S> {
    inner: S,
    policy: Arc<dyn ResiliencePolicy>,
}

impl<S> PolicyStage<S> {
    /// Wraps `inner`.
    pub fn new(inner: S, policy: Arc<dyn ResiliencePolicy>) -> Self {
        Self { inner, policy }
    }

    /// The wrapped stage.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S> fmt::Debug for PolicyStage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyStage")
            .field("inner", &std::any::type_name::<S>())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<C, S> Stage<C> for PolicyStage<S>
where
    C: Context,
    S: Stage<C>,
{
    async fn invoke(&self, ctx: &mut C, next: Next<'_, C>) -> Result<(), Fault<C>> {
        let mut attempt: u32 = 0;

        let proceed = loop {
            self.policy.admit()?;
            attempt += 1;

            let mut called = false;
            match self.inner.invoke(ctx, Next::probe(&mut called)).await {
                Ok(()) => {
                    self.policy.record_success();
                    break called;
                }
                Err(fault) => match self.policy.record_failure(attempt, fault.causes()) {
                    RetryDecision::Retry(delay) => {
                        debug!(
                            stage = self.inner.name(),
                            attempt,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %fault,
                            "Retrying stage after failure"
                        );
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                    RetryDecision::GiveUp => return Err(fault.into_raised()),
                },
            }
        };

        if proceed {
            next.run(ctx).await
        } else {
            Ok(())
        }
    }
}

/// Composes two policies.
///
/// Both must admit an attempt and both record every outcome; the outer
/// policy alone decides whether to retry. A retry wrapping a breaker keeps
/// retrying until the breaker opens and rejects the next attempt.
pub struct PolicyWrap {
    outer: Arc<dyn ResiliencePolicy>,
    inner: Arc<dyn ResiliencePolicy>,
}

impl PolicyWrap {
    /// Wraps `inner` in `outer`.
    #[must_use]
    pub fn new(outer: Arc<dyn ResiliencePolicy>, inner: Arc<dyn ResiliencePolicy>) -> Self {
        Self { outer, inner }
    }
}

impl ResiliencePolicy for PolicyWrap {
    fn admit(&self) -> Result<(), PolicyError> {
        self.outer.admit()?;
        self.inner.admit()
    }

    fn record_success(&self) {
        self.inner.record_success();
        self.outer.record_success();
    }

    fn record_failure(&self, attempt: u32, causes: &[anyhow::Error]) -> RetryDecision {
        self.inner.record_failure(attempt, causes);
        self.outer.record_failure(attempt, causes)
    }
}

impl fmt::Debug for PolicyWrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyWrap").finish_non_exhaustive()
    }
}

/// Serializable description of a policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Retry settings; no retries when absent.
    pub retry: Option<RetryConfig>,
    /// Circuit breaker settings; no breaker when absent.
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl ResilienceConfig {
    /// Creates an empty config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry settings.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets the circuit breaker settings.
    #[must_use]
    pub fn with_circuit_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    /// Parses a config from JSON.
    ///
    /// # Errors
    ///
    /// Returns the parse error for malformed input.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Builds the described policy. A retry around a breaker when both are
    /// configured.
    #[must_use]
    pub fn build_policy(&self) -> Arc<dyn ResiliencePolicy> {
        let retry = Arc::new(RetryPolicy::new(
            self.retry.clone().unwrap_or_else(RetryConfig::no_retry),
        ));

        match &self.circuit_breaker {
            Some(breaker) => Arc::new(PolicyWrap::new(
                retry,
                Arc::new(CircuitBreaker::new(breaker.clone())),
            )),
            None => retry,
        }
    }
}
