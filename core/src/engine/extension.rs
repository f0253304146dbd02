//! Engine extensions.
//!
//! An extension is a unit of functionality loaded into the engine instance
//! exactly once per process, identified by name. Its install hook runs under
//! the singleton manager's load gate, which is where backend registration is
//! expected to happen.

use std::sync::Arc;

use crate::backend::file::{FILE_BACKEND_NAME, FileMetadataBackend};
use crate::backend::memory::{MEMORY_BACKEND_NAME, MemoryMetadataBackend, MemoryStore};
use crate::backend::registry::BackendFactory;
use crate::backend::{BackendLocation, MetadataBackend};
use crate::engine::EngineInstance;
use crate::error::LakeResult;

/// How an extension is brought into the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Compiled into the engine binary.
    Static,
    /// Fetched and linked at runtime.
    Dynamic,
}

/// Per-extension record kept by the singleton manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionDescriptor {
    pub name: String,
    pub version: String,
    pub mode: LoadMode,
}

pub trait Extension: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn load_mode(&self) -> LoadMode;

    /// One-shot installation into the engine instance. Runs at most once per
    /// extension name per process; the manager serializes concurrent callers.
    fn install(&self, engine: &EngineInstance) -> LakeResult<()>;

    fn descriptor(&self) -> ExtensionDescriptor {
        ExtensionDescriptor {
            name: self.name().to_string(),
            version: self.version().to_string(),
            mode: self.load_mode(),
        }
    }
}

/// The built-in lakehouse extension: registers the reference metadata
/// backends (`"json"` and `"memory"`) with the engine's registry.
pub struct LakeExtension;

pub const LAKE_EXTENSION_NAME: &str = "ferrolake";

impl Extension for LakeExtension {
    fn name(&self) -> &str {
        LAKE_EXTENSION_NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn load_mode(&self) -> LoadMode {
        LoadMode::Static
    }

    fn install(&self, engine: &EngineInstance) -> LakeResult<()> {
        let registry = engine.registry();

        let file_factory: BackendFactory = Arc::new(|loc: &BackendLocation| {
            Ok(Box::new(FileMetadataBackend::new(loc)) as Box<dyn MetadataBackend>)
        });
        registry.register(FILE_BACKEND_NAME, file_factory)?;

        let store = Arc::new(MemoryStore::default());
        let memory_factory: BackendFactory = Arc::new(move |loc: &BackendLocation| {
            Ok(Box::new(MemoryMetadataBackend::new(Arc::clone(&store), loc))
                as Box<dyn MetadataBackend>)
        });
        registry.register(MEMORY_BACKEND_NAME, memory_factory)?;

        Ok(())
    }
}

/// Resolve a built-in extension by name, for callers that only hold a name
/// (the bridge surface).
pub fn builtin(name: &str) -> Option<Box<dyn Extension>> {
    match name {
        LAKE_EXTENSION_NAME => Some(Box::new(LakeExtension)),
        _ => None,
    }
}
