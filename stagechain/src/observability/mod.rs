//! Observability utilities.
//!
//! The executor never logs. These helpers belong to the caller side: set up
//! a subscriber once, and render or log the envelopes that come back.

mod report;
mod tracing;

pub use self::report::{report_failure, FailureReport};
pub use self::tracing::{init_tracing, TracingConfig};
