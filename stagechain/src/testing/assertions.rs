//! Test assertions for pipeline outcomes.

use super::RecordingFactory;
use crate::failure::FailureEnvelope;

/// Asserts that the envelope references a stage of type `T`.
pub fn assert_failed_at<T: ?Sized + 'static, C>(envelope: &FailureEnvelope<C>) {
    assert!(
        envelope.stage().is::<T>(),
        "Expected failure at {}, got {}",
        std::any::type_name::<T>(),
        envelope.stage()
    );
}

/// Asserts that every created instance was released exactly once.
pub fn assert_balanced<F>(factory: &RecordingFactory<F>) {
    assert!(
        factory.is_balanced(),
        "Expected balanced create/release, got {:?}",
        factory.events()
    );
}

/// Asserts that no instance of `T` was ever created.
pub fn assert_never_created<T: ?Sized + 'static, F>(factory: &RecordingFactory<F>) {
    assert_eq!(
        factory.created::<T>(),
        0,
        "Expected {} never to be created",
        std::any::type_name::<T>()
    );
}
