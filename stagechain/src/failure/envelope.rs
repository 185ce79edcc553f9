//! The failure envelope and the top-level invocation error.

use crate::core::StageRef;
use crate::errors::PipelineError;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// A stage failure wrapped with the identity of the stage that raised it.
///
/// The executor wraps a raised fault into an envelope exactly once, at the
/// segment of the failing stage. Envelopes are forwarded unchanged by every
/// stage above it. When the envelope escapes the pipeline, the context as
/// the stages left it is attached before it is handed to the caller.
pub struct FailureEnvelope<C> {
    invocation_id: Uuid,
    stage: StageRef,
    causes: Vec<anyhow::Error>,
    failed_at: DateTime<Utc>,
    context: Option<C>,
}

impl<C> FailureEnvelope<C> {
    /// Wraps `causes` raised by `stage`.
    #[must_use]
    pub fn new(invocation_id: Uuid, stage: StageRef, causes: Vec<anyhow::Error>) -> Self {
        Self {
            invocation_id,
            stage,
            causes,
            failed_at: Utc::now(),
            context: None,
        }
    }

    /// The stage whose raised fault was wrapped.
    #[must_use]
    pub fn stage(&self) -> StageRef {
        self.stage
    }

    /// Every cause the stage raised, in order.
    #[must_use]
    pub fn causes(&self) -> &[anyhow::Error] {
        &self.causes
    }

    /// The first cause, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.causes.first()
    }

    /// Finds the first cause of type `E`.
    #[must_use]
    pub fn find_cause<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.causes.iter().find_map(|cause| cause.downcast_ref::<E>())
    }

    /// When the fault was wrapped.
    #[must_use]
    pub fn failed_at(&self) -> DateTime<Utc> {
        self.failed_at
    }

    /// Identifier of the invocation that failed.
    #[must_use]
    pub fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }

    /// The context as left by the stages, once the envelope has escaped
    /// the pipeline.
    #[must_use]
    pub fn context(&self) -> Option<&C> {
        self.context.as_ref()
    }

    /// Takes the attached context.
    #[must_use]
    pub fn into_context(self) -> Option<C> {
        self.context
    }

    pub(crate) fn attach_context(&mut self, ctx: C) {
        self.context = Some(ctx);
    }
}

impl<C> fmt::Debug for FailureEnvelope<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureEnvelope")
            .field("invocation_id", &self.invocation_id)
            .field("stage", &self.stage)
            .field("causes", &self.causes)
            .field("failed_at", &self.failed_at)
            .field("has_context", &self.context.is_some())
            .finish()
    }
}

impl<C> fmt::Display for FailureEnvelope<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} failed", self.stage)?;
        match self.causes.as_slice() {
            [] => Ok(()),
            [cause] => write!(f, ": {cause}"),
            [first, rest @ ..] => write!(f, ": {first} (+{} more)", rest.len()),
        }
    }
}

impl<C> std::error::Error for FailureEnvelope<C> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.causes
            .first()
            .map(|cause| &**cause as &(dyn std::error::Error + 'static))
    }
}

/// Error returned by [`crate::pipeline::CompiledPipeline::invoke`].
pub enum InvokeError<C> {
    /// The factory could not produce a context.
    Context(PipelineError),
    /// The pipeline failed and no recovery stage handled the fault.
    Failed(Box<FailureEnvelope<C>>),
}

impl<C> InvokeError<C> {
    /// Returns the envelope if the pipeline itself failed.
    #[must_use]
    pub fn envelope(&self) -> Option<&FailureEnvelope<C>> {
        match self {
            Self::Context(_) => None,
            Self::Failed(envelope) => Some(envelope),
        }
    }

    /// Consumes the error, returning the envelope if the pipeline failed.
    #[must_use]
    pub fn into_envelope(self) -> Option<FailureEnvelope<C>> {
        match self {
            Self::Context(_) => None,
            Self::Failed(envelope) => Some(*envelope),
        }
    }
}

impl<C> From<PipelineError> for InvokeError<C> {
    fn from(error: PipelineError) -> Self {
        Self::Context(error)
    }
}

impl<C> fmt::Debug for InvokeError<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context(error) => f.debug_tuple("Context").field(error).finish(),
            Self::Failed(envelope) => f.debug_tuple("Failed").field(envelope).finish(),
        }
    }
}

impl<C> fmt::Display for InvokeError<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context(error) => write!(f, "could not create context: {error}"),
            Self::Failed(envelope) => write!(f, "{envelope}"),
        }
    }
}

impl<C> std::error::Error for InvokeError<C> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Context(error) => Some(error),
            Self::Failed(envelope) => std::error::Error::source(&**envelope),
        }
    }
}
