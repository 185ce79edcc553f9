//! The continuation handed to every stage.

use crate::core::Context;
use crate::failure::Fault;
use crate::pipeline::{CompiledPipeline, Invocation};
use std::fmt;

/// The rest of the pipeline, as seen from inside a stage.
///
/// `Next` is consumed by [`Next::run`], so a stage proceeds at most once.
/// Dropping it without running short-circuits the pipeline.
pub struct Next<'a, C: Context> {
    kind: NextKind<'a, C>,
}

enum NextKind<'a, C: Context> {
    Segment {
        pipeline: &'a CompiledPipeline<C>,
        position: Option<usize>,
        invocation: &'a Invocation<'a, C>,
    },
    Probe(&'a mut bool),
    End,
}

impl<'a, C: Context> Next<'a, C> {
    pub(crate) fn segment(
        pipeline: &'a CompiledPipeline<C>,
        position: Option<usize>,
        invocation: &'a Invocation<'a, C>,
    ) -> Self {
        Self {
            kind: NextKind::Segment {
                pipeline,
                position,
                invocation,
            },
        }
    }

    /// A continuation that only records whether it was run.
    pub fn probe(called: &'a mut bool) -> Self {
        Self {
            kind: NextKind::Probe(called),
        }
    }

    /// A continuation that succeeds without doing anything.
    #[must_use]
    pub fn end() -> Self {
        Self {
            kind: NextKind::End,
        }
    }

    /// Runs the rest of the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the already wrapped fault of a downstream stage that no
    /// recovery stage handled.
    pub async fn run(self, ctx: &mut C) -> Result<(), Fault<C>> {
        match self.kind {
            NextKind::Segment {
                pipeline,
                position,
                invocation,
            } => pipeline
                .run_segment(position, ctx, invocation)
                .await
                .map_err(Fault::Wrapped),
            NextKind::Probe(called) => {
                *called = true;
                Ok(())
            }
            NextKind::End => Ok(()),
        }
    }
}

impl<C: Context> fmt::Debug for Next<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NextKind::Segment { position, .. } => f
                .debug_struct("Next")
                .field("position", position)
                .finish(),
            NextKind::Probe(_) => f.write_str("Next::Probe"),
            NextKind::End => f.write_str("Next::End"),
        }
    }
}
