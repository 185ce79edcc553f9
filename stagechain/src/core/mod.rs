//! Core model types for stagechain.
//!
//! This module contains the vocabulary shared by every other module:
//! - The [`Context`] bound for pipeline contexts
//! - Stage kinds and capability flags
//! - Runtime stage type tokens and stage references

mod kind;
mod stage_type;

pub use kind::{StageCapabilities, StageKind};
pub use stage_type::{StageRef, StageType};

/// Bound satisfied by every type usable as a pipeline context.
///
/// A context is owned by exactly one invocation and mutated in place by
/// each stage in turn.
pub trait Context: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Context for T {}
