//! Circuit breaker policy.

use super::{PolicyError, ResiliencePolicy, RetryDecision};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// State of a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Attempts are admitted.
    Closed,
    /// Attempts are rejected until the open duration elapses.
    Open,
    /// A single trial attempt is admitted; its outcome closes or reopens.
    /// Other attempts are rejected while the trial is in flight.
    HalfOpen,
}

/// Configuration for a [`CircuitBreaker`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open, in milliseconds.
    pub open_duration_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration_ms: 30000,
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a default config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the failure threshold.
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the open duration.
    #[must_use]
    pub fn with_open_duration_ms(mut self, duration: u64) -> Self {
        self.open_duration_ms = duration;
        self
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Rejects attempts after repeated failures.
///
/// A breaker is shared by every stage instance built with it, so its state
/// spans invocations. On its own it never asks for a retry.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    fn open_duration(&self) -> Duration {
        Duration::from_millis(self.config.open_duration_ms)
    }
}

impl ResiliencePolicy for CircuitBreaker {
    fn admit(&self) -> Result<(), PolicyError> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => return Ok(()),
            CircuitState::HalfOpen if inner.trial_in_flight => {
                return Err(PolicyError::CircuitOpen { retry_after_ms: 0 });
            }
            CircuitState::HalfOpen => {
                inner.trial_in_flight = true;
                return Ok(());
            }
            CircuitState::Open => {}
        }

        let elapsed = inner.opened_at.map_or(Duration::MAX, |at| at.elapsed());
        if elapsed >= self.open_duration() {
            inner.state = CircuitState::HalfOpen;
            inner.trial_in_flight = true;
            debug!("Circuit half-open, admitting trial attempt");
            Ok(())
        } else {
            let remaining = self.open_duration().saturating_sub(elapsed);
            Err(PolicyError::CircuitOpen {
                retry_after_ms: u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
            })
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            debug!("Circuit closed");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }

    fn record_failure(&self, _attempt: u32, _causes: &[anyhow::Error]) -> RetryDecision {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.trial_in_flight = false;

        let trips = inner.state == CircuitState::HalfOpen
            || inner.consecutive_failures >= self.config.failure_threshold;
        if trips && inner.state != CircuitState::Open {
            warn!(
                failures = inner.consecutive_failures,
                open_duration_ms = self.config.open_duration_ms,
                "Circuit opened"
            );
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }

        RetryDecision::GiveUp
    }
}
