//! Faults raised by stages and the envelope they are wrapped in.
//!
//! A stage fails by returning [`Fault::Raised`]. The segment that invoked
//! it wraps the raw causes into a [`FailureEnvelope`] exactly once; the
//! envelope then travels as [`Fault::Wrapped`] and is never wrapped again.

mod envelope;
mod fault;

pub use envelope::{FailureEnvelope, InvokeError};
pub use fault::Fault;
