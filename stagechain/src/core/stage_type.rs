//! Runtime type tokens and stage references.

use super::{Context, StageCapabilities, StageKind};
use crate::stages::{RecoveryStage, Stage};
use std::any::{type_name, TypeId};
use std::fmt;
use std::marker::PhantomData;

/// A runtime token naming a stage type and the capabilities it declares.
///
/// Tokens are how a pipeline refers to its stages before any instance
/// exists; the [`crate::factory::StageFactory`] turns them into instances
/// at invocation time.
pub struct StageType<C> {
    id: TypeId,
    name: &'static str,
    capabilities: StageCapabilities,
    _context: PhantomData<fn(&mut C)>,
}

impl<C: Context> StageType<C> {
    /// Token for an arbitrary type with no declared capabilities.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::with_capabilities::<T>(StageCapabilities::new())
    }

    /// Token for a type implementing [`Stage`].
    #[must_use]
    pub fn stage<S: Stage<C> + 'static>() -> Self {
        Self::with_capabilities::<S>(StageCapabilities::new().with_stage())
    }

    /// Token for a type implementing [`RecoveryStage`].
    #[must_use]
    pub fn recovery<R: RecoveryStage<C> + 'static>() -> Self {
        Self::with_capabilities::<R>(StageCapabilities::new().with_recovery())
    }

    /// Token for a type implementing both capabilities.
    #[must_use]
    pub fn dual<T: Stage<C> + RecoveryStage<C> + 'static>() -> Self {
        Self::with_capabilities::<T>(StageCapabilities::new().with_stage().with_recovery())
    }

    fn with_capabilities<T: ?Sized + 'static>(capabilities: StageCapabilities) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            capabilities,
            _context: PhantomData,
        }
    }
}

impl<C> StageType<C> {
    /// Returns the type id.
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the full type name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the type name without its module path.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.name)
    }

    /// Returns the declared capabilities.
    #[must_use]
    pub fn capabilities(&self) -> StageCapabilities {
        self.capabilities
    }

    /// Returns true if the token was created for `T`.
    #[must_use]
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl<C> Clone for StageType<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for StageType<C> {}

impl<C> PartialEq for StageType<C> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.capabilities == other.capabilities
    }
}

impl<C> Eq for StageType<C> {}

impl<C> fmt::Debug for StageType<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageType")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Identity of a stage within a compiled pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageRef {
    position: usize,
    kind: StageKind,
    type_id: TypeId,
    name: &'static str,
}

impl StageRef {
    /// Creates a reference to the stage declared at `position`.
    #[must_use]
    pub fn new<C>(position: usize, kind: StageKind, stage_type: &StageType<C>) -> Self {
        Self {
            position,
            kind,
            type_id: stage_type.id(),
            name: stage_type.name(),
        }
    }

    /// Position of the stage in declaration order.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Role the stage was declared with.
    #[must_use]
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Full type name of the stage.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.name)
    }

    /// Returns true if the stage is of type `T`.
    #[must_use]
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl fmt::Display for StageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} ({})", self.short_name(), self.position, self.kind)
    }
}

/// Strips module paths while keeping generic arguments readable.
pub(crate) fn short_type_name(name: &str) -> &str {
    let head = name.split('<').next().unwrap_or(name);
    match head.rfind("::") {
        Some(idx) => &name[idx + 2..],
        None => name,
    }
}
