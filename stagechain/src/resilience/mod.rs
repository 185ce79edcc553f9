//! Resilience policies and the stage decorator that applies them.
//!
//! A [`PolicyStage`] runs one stage under a [`ResiliencePolicy`]. The policy
//! admits each attempt, sees every failure, and decides whether to try
//! again. The wrapped stage never sees the real continuation; the decorator
//! proceeds only if the successful attempt asked to.

mod breaker;
mod policy;
mod retry;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use policy::{PolicyStage, PolicyWrap, ResilienceConfig};
pub use retry::{BackoffStrategy, JitterStrategy, RetryConfig, RetryPolicy, RetryPredicate};

use std::time::Duration;
use thiserror::Error;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the delay.
    Retry(Duration),
    /// Stop; the last failure is final.
    GiveUp,
}

/// Errors raised by policies themselves.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// The circuit is open and rejects attempts.
    #[error("Circuit open: retry after {retry_after_ms}ms")]
    CircuitOpen {
        /// Time until the circuit admits a trial attempt.
        retry_after_ms: u64,
    },
}

/// A policy governing the attempts of one wrapped stage.
pub trait ResiliencePolicy: Send + Sync {
    /// Called before every attempt.
    ///
    /// # Errors
    ///
    /// Returns a [`PolicyError`] to reject the attempt. The rejection
    /// becomes the decorator's fault.
    fn admit(&self) -> Result<(), PolicyError> {
        Ok(())
    }

    /// Called after a successful attempt.
    fn record_success(&self) {}

    /// Called after failed attempt number `attempt` (1-indexed) with the
    /// causes of that failure.
    fn record_failure(&self, attempt: u32, causes: &[anyhow::Error]) -> RetryDecision;
}
