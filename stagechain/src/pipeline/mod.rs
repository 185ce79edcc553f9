//! Pipeline declaration, compilation and execution.
//!
//! This module provides:
//! - [`PipelineBuilder`], the append-only declaration API
//! - [`compile`], the right-to-left compiler producing a [`CompiledPipeline`]
//! - The executor entry points on [`CompiledPipeline`]

mod builder;
mod compiler;
mod descriptor;
mod executor;

#[cfg(test)]
mod integration_tests;

pub use builder::PipelineBuilder;
pub use compiler::{compile, CompiledPipeline};
pub use descriptor::StageDescriptor;
pub(crate) use executor::Invocation;
