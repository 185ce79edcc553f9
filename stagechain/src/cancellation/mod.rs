//! Cooperative cancellation for pipeline invocations.
//!
//! A [`CancellationToken`] passed to
//! [`crate::pipeline::CompiledPipeline::invoke_cancellable`] is checked
//! before every stage instance is created. Stages may also hold a clone of
//! the token's `Arc` and check or await it themselves.

mod token;

pub use token::CancellationToken;
