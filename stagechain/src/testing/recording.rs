//! A factory wrapper that records every create and release.

use crate::core::{Context, StageKind, StageType};
use crate::errors::PipelineError;
use crate::factory::{StageFactory, StageInstance};
use crate::stages::{RecoveryStage, Stage};
use parking_lot::Mutex;
use std::any::TypeId;

/// What happened to an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryAction {
    /// The factory handed out an instance.
    Created,
    /// The instance came back.
    Released,
}

/// One entry of a [`RecordingFactory`] log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactoryEvent {
    /// What happened.
    pub action: FactoryAction,
    /// The role the instance was created for.
    pub kind: StageKind,
    /// Type of the instance.
    pub type_id: TypeId,
    /// Type name of the instance.
    pub name: &'static str,
}

impl FactoryEvent {
    /// Returns true if the event concerns type `T`.
    #[must_use]
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

/// Wraps a factory and keeps an ordered log of its lifecycle calls.
#[derive(Debug)]
pub struct RecordingFactory<F> {
    inner: F,
    events: Mutex<Vec<FactoryEvent>>,
}

impl<F> RecordingFactory<F> {
    /// Wraps `inner`.
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            events: Mutex::new(Vec::new()),
        }
    }

    /// The wrapped factory.
    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// A copy of the log.
    #[must_use]
    pub fn events(&self) -> Vec<FactoryEvent> {
        self.events.lock().clone()
    }

    /// Number of instances of `T` created.
    #[must_use]
    pub fn created<T: ?Sized + 'static>(&self) -> usize {
        self.count::<T>(FactoryAction::Created)
    }

    /// Number of instances of `T` released.
    #[must_use]
    pub fn released<T: ?Sized + 'static>(&self) -> usize {
        self.count::<T>(FactoryAction::Released)
    }

    /// Position in the log of the `nth` (0-indexed) event matching `action`
    /// for `T`.
    #[must_use]
    pub fn position_of<T: ?Sized + 'static>(&self, action: FactoryAction, nth: usize) -> Option<usize> {
        self.events
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, event)| event.action == action && event.is::<T>())
            .nth(nth)
            .map(|(index, _)| index)
    }

    /// Returns true if every created instance was released exactly once.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        let events = self.events.lock();
        let mut live: Vec<(TypeId, StageKind, i64)> = Vec::new();

        for event in events.iter() {
            let delta = match event.action {
                FactoryAction::Created => 1,
                FactoryAction::Released => -1,
            };
            match live
                .iter_mut()
                .find(|(id, kind, _)| *id == event.type_id && *kind == event.kind)
            {
                Some((_, _, count)) => *count += delta,
                None => live.push((event.type_id, event.kind, delta)),
            }
            if live.iter().any(|(_, _, count)| *count < 0) {
                return false;
            }
        }

        live.iter().all(|(_, _, count)| *count == 0)
    }

    fn count<T: ?Sized + 'static>(&self, action: FactoryAction) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.action == action && event.is::<T>())
            .count()
    }

    fn record<C: Context>(&self, action: FactoryAction, kind: StageKind, stage_type: &StageType<C>) {
        self.events.lock().push(FactoryEvent {
            action,
            kind,
            type_id: stage_type.id(),
            name: stage_type.name(),
        });
    }
}

impl<C: Context, F: StageFactory<C>> StageFactory<C> for RecordingFactory<F> {
    fn create(&self, stage_type: &StageType<C>) -> Result<Box<dyn Stage<C>>, PipelineError> {
        let stage = self.inner.create(stage_type)?;
        self.record(FactoryAction::Created, StageKind::Normal, stage_type);
        Ok(stage)
    }

    fn create_recovery(
        &self,
        stage_type: &StageType<C>,
    ) -> Result<Box<dyn RecoveryStage<C>>, PipelineError> {
        let stage = self.inner.create_recovery(stage_type)?;
        self.record(FactoryAction::Created, StageKind::Recovery, stage_type);
        Ok(stage)
    }

    fn release(&self, instance: StageInstance<C>) {
        self.record(FactoryAction::Released, instance.kind(), &instance.stage_type());
        self.inner.release(instance);
    }

    fn create_context(&self) -> Result<C, PipelineError> {
        self.inner.create_context()
    }
}
