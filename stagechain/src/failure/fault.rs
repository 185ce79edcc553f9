//! The fault channel of stage invocations.

use super::FailureEnvelope;
use crate::core::Context;
use std::fmt;

/// Error half of a stage invocation result.
///
/// Together with `Ok(())` this forms the three outcomes a stage can
/// produce: success, a fresh failure, or a failure that was already
/// wrapped further down the pipeline.
///
/// Any `std::error::Error + Send + Sync + 'static` converts into
/// [`Fault::Raised`], so stages can use `?` on their own fallible calls.
pub enum Fault<C: Context> {
    /// A failure raised by the stage itself, not yet wrapped.
    Raised(Vec<anyhow::Error>),
    /// A failure already wrapped by a downstream segment.
    Wrapped(Box<FailureEnvelope<C>>),
}

impl<C: Context> Fault<C> {
    /// Raises a single cause.
    pub fn raise(cause: impl Into<anyhow::Error>) -> Self {
        Self::Raised(vec![cause.into()])
    }

    /// Raises a plain message.
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self::Raised(vec![anyhow::Error::msg(message)])
    }

    /// Raises several causes at once, in order.
    pub fn aggregate(causes: impl IntoIterator<Item = anyhow::Error>) -> Self {
        Self::Raised(causes.into_iter().collect())
    }

    /// Returns true if the fault is already wrapped.
    #[must_use]
    pub fn is_wrapped(&self) -> bool {
        matches!(self, Self::Wrapped(_))
    }

    /// Returns the underlying causes.
    #[must_use]
    pub fn causes(&self) -> &[anyhow::Error] {
        match self {
            Self::Raised(causes) => causes,
            Self::Wrapped(envelope) => envelope.causes(),
        }
    }

    /// Turns a wrapped fault back into a raised one whose single cause is
    /// the envelope.
    ///
    /// Used by stages that absorb a downstream failure and report it as
    /// their own.
    #[must_use]
    pub fn into_raised(self) -> Self {
        match self {
            Self::Wrapped(envelope) => Self::Raised(vec![anyhow::Error::new(*envelope)]),
            raised @ Self::Raised(_) => raised,
        }
    }

    /// Returns the envelope if the fault is already wrapped.
    #[must_use]
    pub fn envelope(&self) -> Option<&FailureEnvelope<C>> {
        match self {
            Self::Raised(_) => None,
            Self::Wrapped(envelope) => Some(envelope),
        }
    }
}

impl<C, E> From<E> for Fault<C>
where
    C: Context,
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::Raised(vec![anyhow::Error::new(error)])
    }
}

impl<C: Context> fmt::Debug for Fault<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raised(causes) => f.debug_tuple("Raised").field(causes).finish(),
            Self::Wrapped(envelope) => f.debug_tuple("Wrapped").field(envelope).finish(),
        }
    }
}

impl<C: Context> fmt::Display for Fault<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raised(causes) => match causes.as_slice() {
                [] => write!(f, "stage fault"),
                [cause] => write!(f, "{cause}"),
                [first, rest @ ..] => write!(f, "{first} (+{} more)", rest.len()),
            },
            Self::Wrapped(envelope) => write!(f, "{envelope}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipelineError;

    #[derive(Debug, thiserror::Error)]
    #[error("disk full")]
    struct DiskFull;

    fn fails() -> Result<(), DiskFull> {
        Err(DiskFull)
    }

    fn stage_body() -> Result<(), Fault<()>> {
        fails()?;
        Ok(())
    }

    #[test]
    fn test_question_mark_raises() {
        let fault = stage_body().unwrap_err();
        assert!(!fault.is_wrapped());
        assert_eq!(fault.causes().len(), 1);
        assert!(fault.causes()[0].downcast_ref::<DiskFull>().is_some());
        assert_eq!(fault.to_string(), "disk full");
    }

    #[test]
    fn test_aggregate_keeps_order() {
        let fault: Fault<()> = Fault::aggregate(vec![
            anyhow::anyhow!("first"),
            anyhow::anyhow!("second"),
        ]);

        assert_eq!(fault.causes().len(), 2);
        assert_eq!(fault.causes()[1].to_string(), "second");
        assert_eq!(fault.to_string(), "first (+1 more)");
    }

    #[test]
    fn test_raise_from_pipeline_error() {
        let fault: Fault<()> = PipelineError::unresolved("Missing").into();
        assert!(fault.envelope().is_none());
        assert!(fault.causes()[0]
            .downcast_ref::<PipelineError>()
            .is_some());
    }

    #[test]
    fn test_into_raised_keeps_envelope_as_cause() {
        use crate::core::{StageKind, StageRef, StageType};

        let stage = StageRef::new(0, StageKind::Normal, &StageType::<()>::of::<DiskFull>());
        let envelope: FailureEnvelope<()> =
            FailureEnvelope::new(uuid::Uuid::new_v4(), stage, vec![DiskFull.into()]);
        let fault = Fault::Wrapped(Box::new(envelope)).into_raised();

        assert!(!fault.is_wrapped());
        assert!(fault.causes()[0]
            .downcast_ref::<FailureEnvelope<()>>()
            .is_some());
    }
}
