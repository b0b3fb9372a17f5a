//! Process-wide and private descriptor caches.

use super::TypeDescriptor;
use crate::{Error, Result};
use log::trace;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Types that can describe themselves to the engine.
///
/// `describe` is called at most once per registry in the common case; it
/// must not convert anything, only assemble the descriptor. Member types are
/// referenced lazily, so recursive types are fine.
pub trait Describe: 'static {
    fn describe(registry: &Registry) -> Result<TypeDescriptor>;
}

/// A cache of configured descriptors keyed by native type.
///
/// Descriptors are immutable once handed out. Reads take a shared lock; a
/// miss describes the type without holding the lock and publishes the first
/// descriptor that wins the race.
pub struct Registry {
    descriptors: RwLock<HashMap<TypeId, Arc<TypeDescriptor>>>,
}

static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Registry {
            descriptors: RwLock::new(HashMap::new()),
        }
    }

    /// The registry used by default options.
    pub fn global() -> Arc<Registry> {
        GLOBAL.get_or_init(|| Arc::new(Registry::new())).clone()
    }

    /// Returns the configured descriptor for `T`, describing it on first use.
    pub fn get<T: Describe>(&self) -> Result<Arc<TypeDescriptor>> {
        let type_id = TypeId::of::<T>();
        if let Some(descriptor) = self.lookup(type_id) {
            return Ok(descriptor);
        }
        let described = T::describe(self)?;
        if described.type_id() != type_id {
            return Err(Error::configuration(format!(
                "descriptor '{}' does not describe the requested type",
                described.name()
            )));
        }
        trace!("describing {}", described.name());
        let mut descriptors = self
            .descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let descriptor = descriptors
            .entry(type_id)
            .or_insert_with(|| Arc::new(described))
            .clone();
        descriptor.mark_configured();
        Ok(descriptor)
    }

    /// Installs a descriptor for `T`, replacing the one `Describe` would
    /// produce.
    ///
    /// Fails once a descriptor for `T` has been used for a conversion.
    pub fn register<T: 'static>(&self, descriptor: TypeDescriptor) -> Result<()> {
        let type_id = TypeId::of::<T>();
        if descriptor.type_id() != type_id {
            return Err(Error::configuration(format!(
                "descriptor '{}' does not describe the registered type",
                descriptor.name()
            )));
        }
        let mut descriptors = self
            .descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = descriptors.get(&type_id) {
            if existing.is_configured() {
                return Err(Error::configuration(format!(
                    "descriptor '{}' is already in use and cannot be replaced",
                    existing.name()
                )));
            }
        }
        descriptors.insert(type_id, Arc::new(descriptor));
        Ok(())
    }

    /// Returns a cached descriptor without describing anything.
    #[must_use]
    pub fn lookup(&self, type_id: TypeId) -> Option<Arc<TypeDescriptor>> {
        let descriptors = self
            .descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let descriptor = descriptors.get(&type_id)?.clone();
        descriptor.mark_configured();
        Some(descriptor)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("descriptors", &self.len())
            .finish()
    }
}
