//! Metadata backend registry.
//!
//! Process-wide mapping from backend name to a factory that constructs a
//! backend instance for one catalog location. Registration happens once at
//! extension-load time; lookups happen on every catalog transaction, so
//! `create` is a single map read plus the factory call.
//!
//! Duplicate names are rejected with `DuplicateRegistration`: registration
//! is startup wiring, and letting a later registration win would make
//! backend resolution depend on load order.

use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use tracing::info;

use super::{BackendLocation, MetadataBackend};
use crate::error::{LakeError, LakeResult};

/// Constructs one backend instance bound to a catalog location. Must be
/// synchronous and cheap; anything that can fail slowly (opening files,
/// connections) belongs in `MetadataBackend::initialize`.
pub type BackendFactory =
    Arc<dyn Fn(&BackendLocation) -> LakeResult<Box<dyn MetadataBackend>> + Send + Sync>;

pub struct BackendRegistry {
    factories: RwLock<HashMap<String, BackendFactory>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Associate a unique name with a factory.
    pub fn register(&self, name: &str, factory: BackendFactory) -> LakeResult<()> {
        let mut factories = self.factories.write();
        if factories.contains_key(name) {
            return Err(LakeError::DuplicateRegistration(name.to_string()));
        }
        factories.insert(name.to_string(), factory);
        info!(backend = name, "registered metadata backend");
        Ok(())
    }

    /// Construct a backend instance for `location`, or `UnknownBackend` if
    /// no factory is registered under `name`.
    pub fn create(
        &self,
        name: &str,
        location: &BackendLocation,
    ) -> LakeResult<Box<dyn MetadataBackend>> {
        let factory = {
            let factories = self.factories.read();
            factories
                .get(name)
                .cloned()
                .ok_or_else(|| LakeError::UnknownBackend(name.to_string()))?
        };
        factory(location)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<BackendRegistry> = Arc::new(BackendRegistry::new());
}

/// The process-wide registry used by the global engine.
pub fn global() -> Arc<BackendRegistry> {
    Arc::clone(&GLOBAL_REGISTRY)
}
