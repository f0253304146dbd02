//! Engine singleton manager.
//!
//! Owns the one engine instance shared by every host worker in the process
//! and the per-extension load records. Construction is lazy: the first
//! caller of [`EngineManager::get_or_create`] builds the instance while
//! holding the slot lock, so concurrent callers block until it is ready. A
//! failed construction leaves the slot empty and is retried by the next
//! caller.
//!
//! Extension loading is exactly-once per name: records move monotonically
//! from absent through loading to loaded (or failed), concurrent callers for
//! the same name park on a condvar until the single load resolves, and every
//! caller observes that load's outcome. A failed load is recorded and
//! reported to all later callers without re-running the install hook; it is
//! a configuration error, not a transient one.

use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::{Condvar, Mutex};
use tracing::{info, warn};

use super::EngineInstance;
use super::extension::{self, Extension, ExtensionDescriptor};
use crate::EngineConfig;
use crate::backend::registry::{self, BackendRegistry};
use crate::error::{LakeError, LakeResult};

enum ExtensionState {
    Loading,
    Loaded(ExtensionDescriptor),
    Failed(String),
}

pub struct EngineManager {
    config: Mutex<EngineConfig>,
    registry: Arc<BackendRegistry>,
    slot: Mutex<Option<Arc<EngineInstance>>>,
    extensions: Mutex<HashMap<String, ExtensionState>>,
    ext_cond: Condvar,
}

impl EngineManager {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registry(config, registry::global())
    }

    pub fn with_registry(config: EngineConfig, registry: Arc<BackendRegistry>) -> Self {
        Self {
            config: Mutex::new(config),
            registry,
            slot: Mutex::new(None),
            extensions: Mutex::new(HashMap::new()),
            ext_cond: Condvar::new(),
        }
    }

    /// Replace the configuration used to construct the engine. A no-op if
    /// the engine is already running with the same configuration; a conflict
    /// if it is running with a different one.
    pub fn configure(&self, config: EngineConfig) -> LakeResult<()> {
        let slot = self.slot.lock();
        if let Some(engine) = slot.as_ref() {
            if engine.config() != &config {
                return Err(LakeError::Conflict(
                    "engine already constructed with different configuration".into(),
                ));
            }
            return Ok(());
        }
        *self.config.lock() = config;
        Ok(())
    }

    /// The singleton, constructed by the first caller. Autoload extensions
    /// are installed before the instance is published, so no caller ever
    /// observes a half-initialized engine.
    pub fn get_or_create(&self) -> LakeResult<Arc<EngineInstance>> {
        let mut slot = self.slot.lock();
        if let Some(engine) = slot.as_ref() {
            return Ok(Arc::clone(engine));
        }

        let config = self.config.lock().clone();
        let autoload = config.autoload_extensions.clone();
        let engine = Arc::new(EngineInstance::with_registry(
            config,
            Arc::clone(&self.registry),
        )?);

        for name in &autoload {
            let ext = extension::builtin(name).ok_or_else(|| LakeError::LoadFailure {
                name: name.clone(),
                reason: "no such built-in extension".into(),
            })?;
            self.ensure_extension_loaded(&engine, ext.as_ref())?;
        }

        *slot = Some(Arc::clone(&engine));
        info!("engine instance constructed");
        Ok(engine)
    }

    /// The singleton if it has been constructed, `NotReady` otherwise.
    /// Never constructs.
    pub fn try_instance(&self) -> LakeResult<Arc<EngineInstance>> {
        self.slot
            .lock()
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| LakeError::NotReady("engine instance has not been constructed".into()))
    }

    /// Load `ext` into the engine exactly once. Returns immediately when the
    /// extension is already loaded; concurrent callers for the same name
    /// serialize so a single install executes and everyone observes its
    /// outcome.
    pub fn ensure_extension_loaded(
        &self,
        engine: &EngineInstance,
        ext: &dyn Extension,
    ) -> LakeResult<()> {
        let name = ext.name().to_string();
        {
            let mut extensions = self.extensions.lock();
            loop {
                match extensions.get(&name) {
                    Some(ExtensionState::Loaded(_)) => return Ok(()),
                    Some(ExtensionState::Failed(reason)) => {
                        return Err(LakeError::LoadFailure {
                            name,
                            reason: reason.clone(),
                        });
                    }
                    Some(ExtensionState::Loading) => {
                        self.ext_cond.wait(&mut extensions);
                    }
                    None => {
                        extensions.insert(name.clone(), ExtensionState::Loading);
                        break;
                    }
                }
            }
        }

        // This thread won the load; run the install hook outside the lock.
        let result = ext.install(engine);

        let mut extensions = self.extensions.lock();
        match result {
            Ok(()) => {
                extensions.insert(name.clone(), ExtensionState::Loaded(ext.descriptor()));
                self.ext_cond.notify_all();
                info!(extension = %name, version = %ext.version(), "extension loaded");
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                extensions.insert(name.clone(), ExtensionState::Failed(reason.clone()));
                self.ext_cond.notify_all();
                warn!(extension = %name, error = %reason, "extension load failed");
                Err(LakeError::LoadFailure { name, reason })
            }
        }
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        matches!(
            self.extensions.lock().get(name),
            Some(ExtensionState::Loaded(_))
        )
    }

    pub fn loaded_extensions(&self) -> Vec<ExtensionDescriptor> {
        self.extensions
            .lock()
            .values()
            .filter_map(|state| match state {
                ExtensionState::Loaded(desc) => Some(desc.clone()),
                _ => None,
            })
            .collect()
    }
}

lazy_static! {
    static ref GLOBAL_MANAGER: EngineManager = EngineManager::new(EngineConfig::default());
}

/// The process-wide manager. All production access to the engine goes
/// through here; arbitrary code never touches the singleton directly.
pub fn global() -> &'static EngineManager {
    &GLOBAL_MANAGER
}
