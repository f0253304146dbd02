//! Catalog attachments.
//!
//! A `CatalogAttachment` is one named, mounted storage catalog bound to a
//! metadata backend kind and a pair of locations. Every operation against the
//! attachment constructs a fresh backend instance through the registry, runs
//! it under that instance's transaction, and commits (or rolls back on
//! error); backend instances are never shared across operations.
//!
//! Table data lives in data files under the attachment's data location:
//! inserts write a new JSON-lines file and register it with the backend in
//! the same transaction, selects list the registered files through the
//! backend and read them back.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::registry::BackendRegistry;
use crate::backend::{
    BackendLocation, CatalogInfo, ColumnDef, DataFile, MetadataBackend, PartitionData, SchemaDef,
    TableDef, TableStats, TxnHandle, ViewDef,
};
use crate::engine::ops::{Row, Value};
use crate::error::{LakeError, LakeResult};

/// Everything needed to mount a catalog: its name, the backend kind, and
/// where metadata and data live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    pub catalog_name: String,
    pub backend_name: String,
    pub metadata_location: PathBuf,
    pub data_location: PathBuf,
    #[serde(default)]
    pub extra_options: BTreeMap<String, String>,
    /// When set, attaching an already-attached catalog with identical
    /// parameters is a no-op success instead of a conflict.
    #[serde(default)]
    pub if_not_exists: bool,
}

impl AttachmentDescriptor {
    pub fn location(&self) -> BackendLocation {
        BackendLocation {
            metadata_location: self.metadata_location.clone(),
            data_location: self.data_location.clone(),
            options: self.extra_options.clone(),
        }
    }

    /// Whether two descriptors target the same backend and locations.
    /// `if_not_exists` is attach-time behavior, not part of the target.
    pub fn same_target(&self, other: &Self) -> bool {
        self.catalog_name == other.catalog_name
            && self.backend_name == other.backend_name
            && self.metadata_location == other.metadata_location
            && self.data_location == other.data_location
            && self.extra_options == other.extra_options
    }
}

pub struct CatalogAttachment {
    descriptor: AttachmentDescriptor,
    registry: Arc<BackendRegistry>,
}

impl CatalogAttachment {
    /// Mount the catalog: construct a backend through the registry, run its
    /// idempotent first-use setup, and make sure the data location exists.
    /// Fails without side effects on the attachment map if the backend is
    /// unknown or setup fails.
    pub fn attach(
        descriptor: AttachmentDescriptor,
        registry: Arc<BackendRegistry>,
    ) -> LakeResult<Self> {
        let mut backend = registry.create(&descriptor.backend_name, &descriptor.location())?;
        backend.initialize()?;
        fs::create_dir_all(&descriptor.data_location)?;
        debug!(
            catalog = %descriptor.catalog_name,
            backend = %descriptor.backend_name,
            "attached catalog"
        );
        Ok(Self {
            descriptor,
            registry,
        })
    }

    pub fn descriptor(&self) -> &AttachmentDescriptor {
        &self.descriptor
    }

    fn new_backend(&self) -> LakeResult<Box<dyn MetadataBackend>> {
        self.registry
            .create(&self.descriptor.backend_name, &self.descriptor.location())
    }

    /// Run `f` in a fresh backend transaction and commit it.
    fn write_txn<T>(
        &self,
        f: impl FnOnce(&mut dyn MetadataBackend, TxnHandle) -> LakeResult<T>,
    ) -> LakeResult<T> {
        let mut backend = self.new_backend()?;
        let txn = backend.begin_transaction()?;
        match f(backend.as_mut(), txn) {
            Ok(value) => {
                backend.commit_transaction(txn)?;
                Ok(value)
            }
            Err(e) => {
                let _ = backend.rollback_transaction(txn);
                Err(e)
            }
        }
    }

    /// Run `f` in a fresh backend transaction and roll it back, leaving the
    /// committed snapshot untouched.
    fn read_txn<T>(
        &self,
        f: impl FnOnce(&dyn MetadataBackend, TxnHandle) -> LakeResult<T>,
    ) -> LakeResult<T> {
        let mut backend = self.new_backend()?;
        let txn = backend.begin_transaction()?;
        let result = f(backend.as_ref(), txn);
        let _ = backend.rollback_transaction(txn);
        result
    }

    pub fn info(&self) -> LakeResult<CatalogInfo> {
        self.new_backend()?.load_catalog_info()
    }

    pub fn create_schema(&self, schema: &str, if_not_exists: bool) -> LakeResult<()> {
        let def = SchemaDef::new(schema);
        self.write_txn(|backend, txn| backend.create_schema(txn, &def, if_not_exists))
    }

    pub fn drop_schema(&self, schema: &str) -> LakeResult<()> {
        self.write_txn(|backend, txn| backend.drop_schema(txn, schema))
    }

    pub fn create_table(
        &self,
        schema: &str,
        table: &str,
        columns: Vec<ColumnDef>,
        if_not_exists: bool,
    ) -> LakeResult<()> {
        if columns.is_empty() {
            return Err(LakeError::Conflict(format!(
                "table '{schema}.{table}' must have at least one column"
            )));
        }
        let def = TableDef::new(schema, table, columns);
        self.write_txn(|backend, txn| backend.create_table(txn, &def, if_not_exists))
    }

    /// Drop the table, then reclaim its data files from disk. File removal
    /// happens after the metadata commit and is best-effort: a leftover file
    /// is unregistered and therefore invisible.
    pub fn drop_table(&self, schema: &str, table: &str) -> LakeResult<()> {
        let files = self.write_txn(|backend, txn| {
            let files: Vec<DataFile> = backend.list_data_files(txn, schema, table)?.collect();
            backend.drop_table(txn, schema, table)?;
            Ok(files)
        })?;

        for file in files {
            let path = self.descriptor.data_location.join(&file.path);
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "could not remove dropped data file");
            }
        }
        Ok(())
    }

    pub fn create_view(
        &self,
        schema: &str,
        view: &str,
        definition: &str,
        if_not_exists: bool,
    ) -> LakeResult<()> {
        let def = ViewDef::new(schema, view, definition);
        self.write_txn(|backend, txn| backend.create_view(txn, &def, if_not_exists))
    }

    pub fn drop_view(&self, schema: &str, view: &str) -> LakeResult<()> {
        self.write_txn(|backend, txn| backend.drop_view(txn, schema, view))
    }

    pub fn list_tables(&self, schema: &str) -> LakeResult<Vec<String>> {
        self.read_txn(|backend, txn| backend.list_tables(txn, schema))
    }

    /// Insert rows: write one new data file, then register it and refresh
    /// stats in a single backend transaction. If the transaction fails the
    /// file is removed, so a retry starts clean.
    pub fn insert(&self, schema: &str, table: &str, rows: Vec<Row>) -> LakeResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let relative = format!("{schema}/{table}/{}.jsonl", Uuid::new_v4());
        let absolute = self.descriptor.data_location.join(&relative);
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&absolute)?;
        for row in &rows {
            let line = serde_json::to_string(row)?;
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")?;
        }
        file.sync_all()?;
        let size_bytes = file.metadata()?.len();
        drop(file);

        let row_count = rows.len() as u64;
        let data_file = DataFile {
            path: relative,
            row_count,
            size_bytes,
        };

        let result = self.write_txn(|backend, txn| {
            let def = backend.get_table(txn, schema, table)?;
            validate_rows(&def, &rows)?;
            backend.register_data_file(txn, schema, table, data_file.clone())?;

            // Stats are advisory: a failure here must not abort the insert.
            match compute_stats(backend, txn, schema, table) {
                Ok(stats) => {
                    if let Err(e) = backend.update_table_stats(txn, schema, table, stats) {
                        warn!(table = %format!("{schema}.{table}"), error = %e,
                            "stats update failed, continuing");
                    }
                }
                Err(e) => {
                    warn!(table = %format!("{schema}.{table}"), error = %e,
                        "stats computation failed, continuing");
                }
            }
            Ok(())
        });

        if let Err(e) = result {
            let _ = fs::remove_file(&absolute);
            return Err(e);
        }
        Ok(row_count)
    }

    pub fn select(
        &self,
        schema: &str,
        table: &str,
        order_by: Option<&str>,
    ) -> LakeResult<Vec<Row>> {
        self.read_txn(|backend, txn| {
            let def = backend.get_table(txn, schema, table)?;
            let mut rows = Vec::new();
            for file in backend.list_data_files(txn, schema, table)? {
                let path = self.descriptor.data_location.join(&file.path);
                let reader = fs::File::open(&path).map_err(|e| {
                    LakeError::BackendUnavailable(format!(
                        "cannot open data file '{}': {e}",
                        path.display()
                    ))
                })?;
                for line in BufReader::new(reader).lines() {
                    let line = line?;
                    if line.is_empty() {
                        continue;
                    }
                    let row: Row = serde_json::from_str(&line).map_err(|e| {
                        LakeError::BackendUnavailable(format!(
                            "corrupt data file '{}': {e}",
                            path.display()
                        ))
                    })?;
                    if row.len() != def.columns.len() {
                        return Err(LakeError::BackendUnavailable(format!(
                            "corrupt data file '{}': row has {} value(s), table has {} column(s)",
                            path.display(),
                            row.len(),
                            def.columns.len()
                        )));
                    }
                    rows.push(row);
                }
            }

            if let Some(column) = order_by {
                let idx = def
                    .columns
                    .iter()
                    .position(|c| c.name == column)
                    .ok_or_else(|| {
                        LakeError::NotFound(format!("column '{column}' in '{schema}.{table}'"))
                    })?;
                rows.sort_by(|a, b| a[idx].compare(&b[idx]));
            }
            Ok(rows)
        })
    }

    /// Recompute table statistics from the registered data files. Best-effort
    /// per the contract: failures are logged and reported as `None`.
    pub fn update_stats(&self, schema: &str, table: &str) -> LakeResult<Option<TableStats>> {
        let result = self.write_txn(|backend, txn| {
            // Table existence is a real error; only the stats work itself is
            // best-effort.
            backend.get_table(txn, schema, table)?;
            let stats = compute_stats(backend, txn, schema, table)?;
            backend.update_table_stats(txn, schema, table, stats.clone())?;
            Ok(stats)
        });
        match result {
            Ok(stats) => Ok(Some(stats)),
            Err(e @ (LakeError::NotFound(_) | LakeError::Internal(_))) => Err(e),
            Err(e) => {
                warn!(table = %format!("{schema}.{table}"), error = %e,
                    "stats update failed, continuing");
                Ok(None)
            }
        }
    }

    pub fn partition_data(&self, schema: &str, table: &str) -> LakeResult<Vec<PartitionData>> {
        self.read_txn(|backend, txn| backend.get_partition_data(txn, schema, table))
    }
}

fn validate_rows(def: &TableDef, rows: &[Row]) -> LakeResult<()> {
    for row in rows {
        if row.len() != def.columns.len() {
            return Err(LakeError::Conflict(format!(
                "row has {} value(s), table '{}.{}' has {} column(s)",
                row.len(),
                def.schema,
                def.name,
                def.columns.len()
            )));
        }
        for (value, column) in row.iter().zip(&def.columns) {
            if !value.matches(column.column_type) {
                return Err(LakeError::Conflict(format!(
                    "value {value:?} does not fit column '{}' of '{}.{}'",
                    column.name, def.schema, def.name
                )));
            }
        }
    }
    Ok(())
}

fn compute_stats(
    backend: &dyn MetadataBackend,
    txn: TxnHandle,
    schema: &str,
    table: &str,
) -> LakeResult<TableStats> {
    let mut row_count = 0;
    let mut file_count = 0;
    let mut total_size_bytes = 0;
    for file in backend.list_data_files(txn, schema, table)? {
        row_count += file.row_count;
        file_count += 1;
        total_size_bytes += file.size_bytes;
    }
    Ok(TableStats {
        row_count,
        file_count,
        total_size_bytes,
        updated_at: Utc::now(),
    })
}
