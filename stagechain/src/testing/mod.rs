//! Testing utilities for stagechain pipelines.
//!
//! This module provides:
//! - A [`Counter`] context with fixture stages operating on it
//! - A [`RecordingFactory`] logging every create and release
//! - Assertions over failure envelopes and factory logs

mod assertions;
mod fixtures;
mod recording;

pub use assertions::{assert_balanced, assert_failed_at, assert_never_created};
pub use fixtures::{
    counter_resolver, Catch, Counter, IncrementByOne, MultiplyByFive, Rethrow, Stop,
    SucceedAtFive, TestFault, Throw,
};
pub use recording::{FactoryAction, FactoryEvent, RecordingFactory};
