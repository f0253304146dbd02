//! FerroLake - an embeddable lakehouse storage engine with pluggable
//! metadata backends.
//!
//! One engine instance lives inside a long-running host process and is
//! shared by all of its workers. Catalogs are attached by name, each bound
//! to a metadata backend chosen by name at runtime through the backend
//! registry; hosts drive the engine through the primitive-typed C bridge
//! (or, in-process, through the [`host::HostAdapter`]).

pub mod backend;
pub mod bridge;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod host;

pub use backend::registry::BackendRegistry;
pub use catalog::AttachmentDescriptor;
pub use engine::EngineInstance;
pub use engine::manager::EngineManager;
pub use engine::ops::{CatalogOperation, OperationOutput, Row, Value};
pub use error::{ErrorKind, LakeError, LakeResult};
pub use host::{HostAdapter, HostError};

use std::path::PathBuf;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Root for relative catalog locations and engine-owned files.
    pub data_dir: PathBuf,
    /// Backend used when an attachment does not name one.
    pub default_backend: String,
    /// Extensions installed before the engine instance is published.
    pub autoload_extensions: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./ferrolake_data"),
            default_backend: "json".to_string(),
            autoload_extensions: vec![engine::extension::LAKE_EXTENSION_NAME.to_string()],
        }
    }
}
