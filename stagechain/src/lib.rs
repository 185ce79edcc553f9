//! # Stagechain
//!
//! Compile-once, invoke-many stage pipelines with fault recovery stages.
//!
//! A pipeline is an ordered list of stage types. Normal stages transform a
//! shared context and decide whether the rest of the pipeline runs by
//! calling their continuation. Recovery stages sit out normal traversal and
//! only run when a fault raised before them reaches them; they decide
//! whether the pipeline resumes after them or stops.
//!
//! - **Compile once**: [`pipeline::PipelineBuilder`] checks each declared
//!   type and compiles the list into an immutable [`pipeline::CompiledPipeline`]
//! - **Instances on demand**: a [`factory::StageFactory`] creates each stage
//!   when its segment runs and gets it back exactly once
//! - **Faults wrapped once**: the segment of the failing stage wraps its
//!   fault into a [`failure::FailureEnvelope`]; enclosing segments forward it
//! - **Resilience**: [`resilience::PolicyStage`] retries a single stage under
//!   a retry or circuit breaker policy
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagechain::prelude::*;
//!
//! let resolver = StageResolver::<Order>::new();
//! resolver.register_default_context();
//! resolver.register_stage(|| Validate);
//! resolver.register_stage(|| Charge);
//! resolver.register_recovery(|| Refund);
//!
//! let pipeline = resolver
//!     .pipeline()
//!     .stage::<Validate>()
//!     .stage::<Charge>()
//!     .recovery::<Refund>()
//!     .build()?;
//!
//! let order = pipeline.invoke(&resolver).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod core;
pub mod errors;
pub mod factory;
pub mod failure;
pub mod observability;
pub mod pipeline;
pub mod resilience;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::core::{Context, StageKind, StageRef, StageType};
    pub use crate::errors::{ContractErrorInfo, PipelineError};
    pub use crate::factory::{ResolverScope, StageFactory, StageInstance, StageResolver};
    pub use crate::failure::{FailureEnvelope, Fault, InvokeError};
    pub use crate::observability::{init_tracing, report_failure, FailureReport, TracingConfig};
    pub use crate::pipeline::{CompiledPipeline, PipelineBuilder, StageDescriptor};
    pub use crate::resilience::{
        CircuitBreaker, CircuitBreakerConfig, PolicyStage, ResilienceConfig, ResiliencePolicy,
        RetryConfig, RetryPolicy,
    };
    pub use crate::stages::{FnStage, Next, PassThroughStage, RecoveryStage, Stage};
}
