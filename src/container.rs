// Provider lookup
//
// Minimal type-keyed container: the registration layer instantiates
// providers, this core only looks them up when building custom handlers.

use crate::Error;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Marker for injectable provider instances.
pub trait Provider: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Provider for T {}

/// Type-keyed provider store, cheaply cloneable.
#[derive(Clone, Default)]
pub struct Container {
    providers: Arc<RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider instance, replacing any previous one of the same
    /// type.
    pub fn register<T: Provider>(&self, instance: T) {
        let type_name = std::any::type_name::<T>();
        self.providers
            .write()
            .insert(TypeId::of::<T>(), Arc::new(instance));
        debug!(provider = type_name, "provider registered");
    }

    /// Resolve a provider by type.
    pub fn resolve<T: Provider>(&self) -> Result<Arc<T>, Error> {
        let type_name = std::any::type_name::<T>();
        trace!(provider = type_name, "resolving provider");

        self.providers
            .read()
            .get(&TypeId::of::<T>())
            .and_then(|any| any.clone().downcast::<T>().ok())
            .ok_or_else(|| Error::ProviderNotFound(type_name.to_string()))
    }

    pub fn has<T: Provider>(&self) -> bool {
        self.providers.read().contains_key(&TypeId::of::<T>())
    }

    pub fn clear(&self) {
        self.providers.write().clear();
    }
}
