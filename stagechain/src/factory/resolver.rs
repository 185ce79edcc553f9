//! An in-process registry of stage constructors.

use super::{StageFactory, StageInstance};
use crate::core::{Context, StageType};
use crate::errors::PipelineError;
use crate::pipeline::PipelineBuilder;
use crate::resilience::{PolicyStage, ResiliencePolicy};
use crate::stages::{RecoveryStage, Stage};
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

type StageCtor<C> = Arc<dyn Fn() -> Box<dyn Stage<C>> + Send + Sync>;
type RecoveryCtor<C> = Arc<dyn Fn() -> Box<dyn RecoveryStage<C>> + Send + Sync>;
type ContextCtor<C> = Arc<dyn Fn() -> C + Send + Sync>;

struct Registration<C> {
    name: &'static str,
    stage: Option<StageCtor<C>>,
    recovery: Option<RecoveryCtor<C>>,
}

impl<C> Registration<C> {
    fn empty(name: &'static str) -> Self {
        Self {
            name,
            stage: None,
            recovery: None,
        }
    }
}

/// Registry of stage and context constructors.
///
/// Every call to [`StageFactory::create`] builds a new instance; nothing is
/// cached between invocations. Registering a type again replaces its
/// constructor for that role.
///
/// # Example
///
/// ```rust,ignore
/// let resolver = StageResolver::<Order>::new();
/// resolver.register_default_context();
/// let validate = resolver.register_stage(|| Validate);
/// let pipeline = resolver.pipeline().append_normal(validate)?.build()?;
/// let order = pipeline.invoke(&resolver).await?;
/// ```
pub struct StageResolver<C: Context> {
    registrations: RwLock<HashMap<TypeId, Registration<C>>>,
    context: RwLock<Option<ContextCtor<C>>>,
}

impl<C: Context> Default for StageResolver<C> {
    fn default() -> Self {
        Self {
            registrations: RwLock::new(HashMap::new()),
            context: RwLock::new(None),
        }
    }
}

impl<C: Context> StageResolver<C> {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the constructor used by [`StageFactory::create_context`].
    pub fn register_context<F>(&self, ctor: F)
    where
        F: Fn() -> C + Send + Sync + 'static,
    {
        debug!(context = std::any::type_name::<C>(), "Registered context");
        *self.context.write() = Some(Arc::new(ctor));
    }

    /// Registers `C::default` as the context constructor.
    pub fn register_default_context(&self)
    where
        C: Default,
    {
        self.register_context(C::default);
    }

    /// Registers a normal stage constructor and returns its token.
    pub fn register_stage<S, F>(&self, ctor: F) -> StageType<C>
    where
        S: Stage<C> + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        let stage_type = StageType::stage::<S>();
        let ctor: StageCtor<C> = Arc::new(move || Box::new(ctor()) as Box<dyn Stage<C>>);
        self.registrations
            .write()
            .entry(stage_type.id())
            .or_insert_with(|| Registration::empty(stage_type.name()))
            .stage = Some(ctor);

        debug!(stage = stage_type.short_name(), "Registered stage");
        stage_type
    }

    /// Registers a recovery stage constructor and returns its token.
    pub fn register_recovery<R, F>(&self, ctor: F) -> StageType<C>
    where
        R: RecoveryStage<C> + 'static,
        F: Fn() -> R + Send + Sync + 'static,
    {
        let stage_type = StageType::recovery::<R>();
        let ctor: RecoveryCtor<C> =
            Arc::new(move || Box::new(ctor()) as Box<dyn RecoveryStage<C>>);
        self.registrations
            .write()
            .entry(stage_type.id())
            .or_insert_with(|| Registration::empty(stage_type.name()))
            .recovery = Some(ctor);

        debug!(stage = stage_type.short_name(), "Registered recovery stage");
        stage_type
    }

    /// Registers `S` wrapped in a [`PolicyStage`] governed by `policy`.
    ///
    /// The returned token names `PolicyStage<S>`, so failures that exhaust
    /// the policy reference the decorator rather than `S`.
    pub fn register_with_policy<S, F>(
        &self,
        ctor: F,
        policy: Arc<dyn ResiliencePolicy>,
    ) -> StageType<C>
    where
        S: Stage<C> + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        self.register_stage(move || PolicyStage::new(ctor(), Arc::clone(&policy)))
    }

    /// Returns true if `stage_type` can be created in the role its
    /// capabilities declare.
    #[must_use]
    pub fn is_registered(&self, stage_type: &StageType<C>) -> bool {
        let registrations = self.registrations.read();
        let Some(registration) = registrations.get(&stage_type.id()) else {
            return false;
        };
        let capabilities = stage_type.capabilities();
        (!capabilities.stage || registration.stage.is_some())
            && (!capabilities.recovery || registration.recovery.is_some())
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }

    /// Starts a pipeline declaration for this context type.
    #[must_use]
    pub fn pipeline(&self) -> PipelineBuilder<C> {
        PipelineBuilder::new()
    }

    /// Opens a scope that counts the instances it creates and releases.
    #[must_use]
    pub fn scope(&self) -> ResolverScope<'_, C> {
        ResolverScope {
            resolver: self,
            created: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    fn stage_ctor(&self, stage_type: &StageType<C>) -> Option<StageCtor<C>> {
        self.registrations
            .read()
            .get(&stage_type.id())
            .and_then(|registration| registration.stage.clone())
    }

    fn recovery_ctor(&self, stage_type: &StageType<C>) -> Option<RecoveryCtor<C>> {
        self.registrations
            .read()
            .get(&stage_type.id())
            .and_then(|registration| registration.recovery.clone())
    }
}

impl<C: Context> StageFactory<C> for StageResolver<C> {
    fn create(&self, stage_type: &StageType<C>) -> Result<Box<dyn Stage<C>>, PipelineError> {
        let ctor = self
            .stage_ctor(stage_type)
            .ok_or_else(|| PipelineError::unresolved(stage_type.name()))?;
        Ok(ctor())
    }

    fn create_recovery(
        &self,
        stage_type: &StageType<C>,
    ) -> Result<Box<dyn RecoveryStage<C>>, PipelineError> {
        let ctor = self
            .recovery_ctor(stage_type)
            .ok_or_else(|| PipelineError::unresolved(stage_type.name()))?;
        Ok(ctor())
    }

    fn create_context(&self) -> Result<C, PipelineError> {
        let ctor = self
            .context
            .read()
            .clone()
            .ok_or_else(|| PipelineError::unresolved(std::any::type_name::<C>()))?;
        Ok(ctor())
    }
}

impl<C: Context> fmt::Debug for StageResolver<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registrations = self.registrations.read();
        let mut names: Vec<_> = registrations.values().map(|r| r.name).collect();
        names.sort_unstable();
        f.debug_struct("StageResolver")
            .field("stages", &names)
            .field("has_context", &self.context.read().is_some())
            .finish()
    }
}

/// A factory scope over a [`StageResolver`].
///
/// Typically one scope is opened per invocation so that the number of live
/// instances can be checked once it completes.
pub struct ResolverScope<'a, C: Context> {
    resolver: &'a StageResolver<C>,
    created: AtomicUsize,
    released: AtomicUsize,
}

impl<C: Context> ResolverScope<'_, C> {
    /// Instances created through this scope.
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Instances released back to this scope.
    #[must_use]
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Instances created but not yet released.
    #[must_use]
    pub fn live(&self) -> usize {
        self.created().saturating_sub(self.released())
    }
}

impl<C: Context> StageFactory<C> for ResolverScope<'_, C> {
    fn create(&self, stage_type: &StageType<C>) -> Result<Box<dyn Stage<C>>, PipelineError> {
        let stage = self.resolver.create(stage_type)?;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(stage)
    }

    fn create_recovery(
        &self,
        stage_type: &StageType<C>,
    ) -> Result<Box<dyn RecoveryStage<C>>, PipelineError> {
        let stage = self.resolver.create_recovery(stage_type)?;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(stage)
    }

    fn release(&self, instance: StageInstance<C>) {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.resolver.release(instance);
    }

    fn create_context(&self) -> Result<C, PipelineError> {
        self.resolver.create_context()
    }
}

impl<C: Context> fmt::Debug for ResolverScope<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverScope")
            .field("created", &self.created())
            .field("released", &self.released())
            .finish()
    }
}
