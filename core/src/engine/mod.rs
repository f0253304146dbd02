//! The embedded engine instance.
//!
//! One `EngineInstance` lives for the lifetime of the process (see
//! [`manager`]); every host worker shares it. The instance owns the map of
//! attached catalogs and dispatches each [`ops::CatalogOperation`] to the
//! attachment it addresses. Everything downstream of the instance is either
//! immutable after startup (registry entries) or exclusively owned per
//! transaction (backend instances), so the attachment map is the only shared
//! mutable state here.

pub mod extension;
pub mod manager;
pub mod ops;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::info;

use crate::EngineConfig;
use crate::backend::registry::{self, BackendRegistry};
use crate::catalog::{AttachmentDescriptor, CatalogAttachment};
use crate::error::{LakeError, LakeResult};
use ops::{CatalogOperation, OperationOutput};

pub struct EngineInstance {
    config: EngineConfig,
    registry: Arc<BackendRegistry>,
    attachments: DashMap<String, Arc<CatalogAttachment>>,
}

impl std::fmt::Debug for EngineInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineInstance")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EngineInstance {
    /// Construct an instance against the process-wide backend registry.
    pub fn new(config: EngineConfig) -> LakeResult<Self> {
        Self::with_registry(config, registry::global())
    }

    /// Construct an instance with its own registry. Used by tests that need
    /// registration isolation; production code shares the global registry.
    pub fn with_registry(config: EngineConfig, registry: Arc<BackendRegistry>) -> LakeResult<Self> {
        fs::create_dir_all(&config.data_dir).map_err(|e| {
            LakeError::NotReady(format!(
                "cannot create engine data directory '{}': {e}",
                config.data_dir.display()
            ))
        })?;
        Ok(Self {
            config,
            registry,
            attachments: DashMap::new(),
        })
    }

    pub fn registry(&self) -> Arc<BackendRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn resolve(&self, path: &PathBuf) -> PathBuf {
        if path.is_absolute() {
            path.clone()
        } else {
            self.config.data_dir.join(path)
        }
    }

    /// Mount a catalog. Re-attaching the same name with identical parameters
    /// under `if_not_exists` is a no-op success; the same name with different
    /// parameters is a conflict. A failed attach leaves no entry behind, so
    /// retrying is always safe.
    pub fn attach(&self, descriptor: &AttachmentDescriptor) -> LakeResult<()> {
        let mut desc = descriptor.clone();
        if desc.backend_name.is_empty() {
            desc.backend_name = self.config.default_backend.clone();
        }
        desc.metadata_location = self.resolve(&desc.metadata_location);
        desc.data_location = self.resolve(&desc.data_location);

        // The entry guard serializes concurrent attaches for one name, so
        // exactly one caller performs the mount.
        match self.attachments.entry(desc.catalog_name.clone()) {
            Entry::Occupied(entry) => {
                if !entry.get().descriptor().same_target(&desc) {
                    return Err(LakeError::Conflict(format!(
                        "catalog '{}' is already attached with different parameters",
                        desc.catalog_name
                    )));
                }
                if desc.if_not_exists {
                    Ok(())
                } else {
                    Err(LakeError::Conflict(format!(
                        "catalog '{}' is already attached",
                        desc.catalog_name
                    )))
                }
            }
            Entry::Vacant(slot) => {
                let name = desc.catalog_name.clone();
                let backend = desc.backend_name.clone();
                let attachment = CatalogAttachment::attach(desc, Arc::clone(&self.registry))?;
                slot.insert(Arc::new(attachment));
                info!(catalog = %name, backend = %backend, "catalog attached");
                Ok(())
            }
        }
    }

    pub fn detach(&self, catalog: &str) -> LakeResult<()> {
        match self.attachments.remove(catalog) {
            Some(_) => {
                info!(catalog = %catalog, "catalog detached");
                Ok(())
            }
            None => Err(LakeError::NotFound(format!(
                "catalog '{catalog}' is not attached"
            ))),
        }
    }

    pub fn attachment(&self, catalog: &str) -> LakeResult<Arc<CatalogAttachment>> {
        self.attachments
            .get(catalog)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| LakeError::NotFound(format!("catalog '{catalog}' is not attached")))
    }

    pub fn attached_catalogs(&self) -> Vec<String> {
        let mut names: Vec<String> = self.attachments.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Execute one catalog operation.
    pub fn execute(&self, op: &CatalogOperation) -> LakeResult<OperationOutput> {
        match op {
            CatalogOperation::Attach(descriptor) => {
                self.attach(descriptor)?;
                Ok(OperationOutput::Done)
            }
            CatalogOperation::Detach { catalog } => {
                self.detach(catalog)?;
                Ok(OperationOutput::Done)
            }
            CatalogOperation::LoadCatalogInfo { catalog } => {
                Ok(OperationOutput::Info(self.attachment(catalog)?.info()?))
            }
            CatalogOperation::CreateSchema {
                catalog,
                schema,
                if_not_exists,
            } => {
                self.attachment(catalog)?
                    .create_schema(schema, *if_not_exists)?;
                Ok(OperationOutput::Done)
            }
            CatalogOperation::DropSchema { catalog, schema } => {
                self.attachment(catalog)?.drop_schema(schema)?;
                Ok(OperationOutput::Done)
            }
            CatalogOperation::CreateTable {
                catalog,
                schema,
                table,
                columns,
                if_not_exists,
            } => {
                self.attachment(catalog)?.create_table(
                    schema,
                    table,
                    columns.clone(),
                    *if_not_exists,
                )?;
                Ok(OperationOutput::Done)
            }
            CatalogOperation::DropTable {
                catalog,
                schema,
                table,
            } => {
                self.attachment(catalog)?.drop_table(schema, table)?;
                Ok(OperationOutput::Done)
            }
            CatalogOperation::CreateView {
                catalog,
                schema,
                view,
                definition,
                if_not_exists,
            } => {
                self.attachment(catalog)?
                    .create_view(schema, view, definition, *if_not_exists)?;
                Ok(OperationOutput::Done)
            }
            CatalogOperation::DropView {
                catalog,
                schema,
                view,
            } => {
                self.attachment(catalog)?.drop_view(schema, view)?;
                Ok(OperationOutput::Done)
            }
            CatalogOperation::ListTables { catalog, schema } => Ok(OperationOutput::Names(
                self.attachment(catalog)?.list_tables(schema)?,
            )),
            CatalogOperation::Insert {
                catalog,
                schema,
                table,
                rows,
            } => {
                self.attachment(catalog)?
                    .insert(schema, table, rows.clone())?;
                Ok(OperationOutput::Done)
            }
            CatalogOperation::Select {
                catalog,
                schema,
                table,
                order_by,
            } => Ok(OperationOutput::Rows(self.attachment(catalog)?.select(
                schema,
                table,
                order_by.as_deref(),
            )?)),
            CatalogOperation::UpdateStats {
                catalog,
                schema,
                table,
            } => Ok(OperationOutput::Stats(
                self.attachment(catalog)?.update_stats(schema, table)?,
            )),
            CatalogOperation::GetPartitionData {
                catalog,
                schema,
                table,
            } => Ok(OperationOutput::Partitions(
                self.attachment(catalog)?.partition_data(schema, table)?,
            )),
        }
    }

    /// Execute a JSON-serialized operation and return a JSON-serialized
    /// output. This is the engine side of the bridge: only byte buffers
    /// cross it.
    pub fn execute_envelope(&self, envelope: &str) -> LakeResult<String> {
        let op: CatalogOperation = serde_json::from_str(envelope)
            .map_err(|e| LakeError::Internal(format!("malformed operation envelope: {e}")))?;
        let output = self.execute(&op).map_err(|e| e.with_context(&op.describe()))?;
        Ok(serde_json::to_string(&output)?)
    }
}
