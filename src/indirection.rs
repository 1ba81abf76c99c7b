//! Indirection handles: stable stand-ins whose target is replaced on reload.
//!
//! Consumers hold an [`IndirectionHandle`] instead of the instance itself.
//! A reload swaps the handle's target with a single atomic store, so a call
//! already in flight finishes against the old target while every later call
//! sees the new one.

use crate::container::Instance;
use crate::error::{ConfError, Result};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Shared, retargetable reference to an instance's capability surface.
///
/// Clones share the same target; identity survives every reload.
pub struct IndirectionHandle<S: ?Sized> {
    id: Arc<str>,
    target: Arc<ArcSwap<Arc<S>>>,
}

impl<S: ?Sized> IndirectionHandle<S> {
    fn new(id: &str, target: Arc<S>) -> Self {
        Self {
            id: Arc::from(id),
            target: Arc::new(ArcSwap::from_pointee(target)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Snapshot of the current target.
    pub fn current(&self) -> Arc<S> {
        let guard = self.target.load();
        Arc::clone(&**guard)
    }

    /// Run `f` against the current target.
    ///
    /// The target observed at entry stays alive until `f` returns, even if
    /// a reload retargets the handle meanwhile.
    pub fn with<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let guard = self.target.load();
        f(&***guard)
    }

    /// True when both handles are the same handle (not merely the same target).
    pub fn same_handle(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.target, &other.target)
    }

    /// True when the handle currently points at `target`.
    pub fn points_to(&self, target: &Arc<S>) -> bool {
        let guard = self.target.load();
        std::ptr::addr_eq(Arc::as_ptr(&**guard), Arc::as_ptr(target))
    }

    /// Replace the target. Visible to every clone at once.
    fn retarget(&self, target: Arc<S>) {
        self.target.store(Arc::new(target));
    }
}

impl<S: ?Sized> Clone for IndirectionHandle<S> {
    fn clone(&self) -> Self {
        Self {
            id: Arc::clone(&self.id),
            target: Arc::clone(&self.target),
        }
    }
}

impl<S: ?Sized> fmt::Debug for IndirectionHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndirectionHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Implement a capability trait for `IndirectionHandle<dyn Trait>` by
/// forwarding every listed method to the current target.
///
/// ```
/// use confgraph::forward_capability;
///
/// pub trait Greeter: Send + Sync {
///     fn greet(&self, name: &str) -> String;
/// }
///
/// forward_capability!(Greeter {
///     fn greet(&self, name: &str) -> String;
/// });
/// ```
#[macro_export]
macro_rules! forward_capability {
    ($capability:path { $(fn $method:ident(&self $(, $arg:ident : $ty:ty)* $(,)?) $(-> $ret:ty)?;)* }) => {
        impl $capability for $crate::indirection::IndirectionHandle<dyn $capability> {
            $(
                fn $method(&self $(, $arg: $ty)*) $(-> $ret)? {
                    self.with(move |target| target.$method($($arg),*))
                }
            )*
        }
    };
}

/// Handles by id. Entries persist across builds.
pub struct IndirectionRegistry<S: ?Sized> {
    handles: HashMap<String, IndirectionHandle<S>>,
}

impl<S: ?Sized + Send + Sync + 'static> Default for IndirectionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ?Sized + Send + Sync + 'static> IndirectionRegistry<S> {
    pub fn new() -> Self {
        Self {
            handles: HashMap::new(),
        }
    }

    /// Wrap `instance` for `id`.
    ///
    /// The first call for an id creates the handle; later calls retarget and
    /// return that same handle. Fails when the instance has no capability
    /// surface.
    pub fn wrap(&mut self, id: &str, instance: Instance<S>) -> Result<IndirectionHandle<S>> {
        let target = surface_of(id, instance)?;
        if let Some(handle) = self.handles.get(id) {
            handle.retarget(target);
            debug!(id = %id, "Retargeted indirection handle");
            return Ok(handle.clone());
        }
        let handle = IndirectionHandle::new(id, target);
        self.handles.insert(id.to_string(), handle.clone());
        info!(id = %id, "Created indirection handle");
        Ok(handle)
    }

    /// Point an existing handle at `instance`. Returns `false` when no
    /// handle exists for `id`.
    pub fn retarget(&self, id: &str, instance: Instance<S>) -> Result<bool> {
        let Some(handle) = self.handles.get(id) else {
            return Ok(false);
        };
        handle.retarget(surface_of(id, instance)?);
        debug!(id = %id, "Retargeted indirection handle");
        Ok(true)
    }

    pub fn get(&self, id: &str) -> Option<IndirectionHandle<S>> {
        self.handles.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handles.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl<S: ?Sized> fmt::Debug for IndirectionRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndirectionRegistry")
            .field("ids", &self.handles.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn surface_of<S: ?Sized>(id: &str, instance: Instance<S>) -> Result<Arc<S>> {
    instance
        .into_surface()
        .ok_or_else(|| ConfError::IndirectionUnsupported { id: id.to_string() })
}
