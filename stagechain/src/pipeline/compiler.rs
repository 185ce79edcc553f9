//! Turns a descriptor sequence into an executable step arena.

use super::StageDescriptor;
use crate::core::{Context, StageKind, StageRef, StageType};
use crate::errors::PipelineError;
use std::fmt;
use std::sync::Arc;

/// One compiled position of a pipeline.
///
/// `continuation` is the first normal position after this one and
/// `recovery` the first recovery position after it; both are fixed here
/// and never searched for at run time.
pub(crate) struct Step<C> {
    pub(crate) stage_type: StageType<C>,
    pub(crate) stage_ref: StageRef,
    pub(crate) continuation: Option<usize>,
    pub(crate) recovery: Option<usize>,
}

/// An immutable, reusable pipeline.
///
/// Cloning is cheap and clones share the same steps. Any number of
/// invocations may run concurrently; each owns its own context and stage
/// instances.
pub struct CompiledPipeline<C> {
    pub(crate) steps: Arc<[Step<C>]>,
    pub(crate) root: Option<usize>,
}

/// Compiles `descriptors` in a single right-to-left pass.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidStageKind`] for the first descriptor
/// whose type lacks the capability of its declared role.
pub fn compile<C: Context>(
    descriptors: &[StageDescriptor<C>],
) -> Result<CompiledPipeline<C>, PipelineError> {
    for descriptor in descriptors {
        descriptor.validate()?;
    }

    let mut next_normal = None;
    let mut next_recovery = None;
    let mut steps = Vec::with_capacity(descriptors.len());

    for (position, descriptor) in descriptors.iter().enumerate().rev() {
        let stage_type = descriptor.stage_type();
        steps.push(Step {
            stage_type,
            stage_ref: StageRef::new(position, descriptor.kind(), &stage_type),
            continuation: next_normal,
            recovery: next_recovery,
        });

        match descriptor.kind() {
            StageKind::Normal => next_normal = Some(position),
            StageKind::Recovery => next_recovery = Some(position),
        }
    }
    steps.reverse();

    Ok(CompiledPipeline {
        steps: steps.into(),
        root: next_normal,
    })
}

impl<C> CompiledPipeline<C> {
    /// Number of declared positions, recovery stages included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if nothing was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Position of the first normal stage.
    #[must_use]
    pub fn root(&self) -> Option<usize> {
        self.root
    }

    /// Position run when the stage at `position` calls its continuation.
    #[must_use]
    pub fn continuation(&self, position: usize) -> Option<usize> {
        self.steps.get(position).and_then(|step| step.continuation)
    }

    /// Position of the recovery stage that handles a fault raised at
    /// `position`.
    #[must_use]
    pub fn recovery_target(&self, position: usize) -> Option<usize> {
        self.steps.get(position).and_then(|step| step.recovery)
    }

    /// Reference to the stage declared at `position`.
    #[must_use]
    pub fn stage_ref(&self, position: usize) -> Option<StageRef> {
        self.steps.get(position).map(|step| step.stage_ref)
    }
}

impl<C> Clone for CompiledPipeline<C> {
    fn clone(&self) -> Self {
        Self {
            steps: Arc::clone(&self.steps),
            root: self.root,
        }
    }
}

impl<C> fmt::Debug for CompiledPipeline<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stages: Vec<String> = self.steps.iter().map(|s| s.stage_ref.to_string()).collect();
        f.debug_struct("CompiledPipeline")
            .field("root", &self.root)
            .field("stages", &stages)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Catch, Counter, IncrementByOne, MultiplyByFive, Throw};
    use pretty_assertions::assert_eq;

    fn normal<S: crate::stages::Stage<Counter> + 'static>() -> StageDescriptor<Counter> {
        StageDescriptor::Normal(StageType::stage::<S>())
    }

    fn recovery() -> StageDescriptor<Counter> {
        StageDescriptor::Recovery(StageType::recovery::<Catch>())
    }

    fn links(pipeline: &CompiledPipeline<Counter>) -> Vec<(Option<usize>, Option<usize>)> {
        (0..pipeline.len())
            .map(|i| (pipeline.continuation(i), pipeline.recovery_target(i)))
            .collect()
    }

    #[test]
    fn test_empty_sequence_has_no_root() {
        let pipeline = compile::<Counter>(&[]).unwrap();
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.root(), None);
    }

    #[test]
    fn test_recovery_is_skipped_by_continuations() {
        // Multiply, Catch, Increment
        let pipeline = compile(&[normal::<MultiplyByFive>(), recovery(), normal::<IncrementByOne>()])
            .unwrap();

        assert_eq!(pipeline.root(), Some(0));
        assert_eq!(
            links(&pipeline),
            vec![(Some(2), Some(1)), (Some(2), None), (None, None)]
        );
    }

    #[test]
    fn test_nearest_recovery_after_each_position() {
        // Increment, Throw, Increment, Catch, Increment, Throw, Increment, Catch, Increment
        let pipeline = compile(&[
            normal::<IncrementByOne>(),
            normal::<Throw>(),
            normal::<IncrementByOne>(),
            recovery(),
            normal::<IncrementByOne>(),
            normal::<Throw>(),
            normal::<IncrementByOne>(),
            recovery(),
            normal::<IncrementByOne>(),
        ])
        .unwrap();

        let targets: Vec<_> = (0..pipeline.len()).map(|i| pipeline.recovery_target(i)).collect();
        assert_eq!(
            targets,
            vec![Some(3), Some(3), Some(3), Some(7), Some(7), Some(7), Some(7), None, None]
        );
        assert_eq!(pipeline.continuation(3), Some(4));
        assert_eq!(pipeline.continuation(7), Some(8));
    }

    #[test]
    fn test_leading_recovery_is_not_root() {
        let pipeline = compile(&[recovery(), normal::<IncrementByOne>()]).unwrap();

        assert_eq!(pipeline.root(), Some(1));
        assert_eq!(pipeline.recovery_target(1), None);
    }

    #[test]
    fn test_invalid_kind_fails_compilation() {
        let err = compile(&[StageDescriptor::<Counter>::Normal(StageType::of::<i32>())])
            .err()
            .unwrap();
        assert_eq!(err.code(), "PIPELINE-001-KIND");
    }

    #[test]
    fn test_stage_refs_follow_declaration_order() {
        let pipeline = compile(&[normal::<MultiplyByFive>(), recovery()]).unwrap();

        let first = pipeline.stage_ref(0).unwrap();
        let second = pipeline.stage_ref(1).unwrap();
        assert!(first.is::<MultiplyByFive>());
        assert_eq!(second.kind(), StageKind::Recovery);
        assert!(pipeline.stage_ref(2).is_none());
    }
}
