//! Metadata backend contract.
//!
//! A metadata backend implements durable catalog state for one attached
//! storage catalog. Backends are selected by name through the
//! [`registry::BackendRegistry`] and constructed fresh for every catalog
//! transaction; an instance is owned by exactly one transaction and its
//! methods are never called concurrently.
//!
//! The contract is grouped into five families: lifecycle, schema/table/view
//! CRUD, transaction control, data-file management, and statistics. All
//! families except statistics participate in transactional visibility;
//! statistics are advisory and callers treat their failures as best-effort.

pub mod document;
pub mod file;
pub mod memory;
pub mod registry;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LakeResult;

/// Handle for one backend transaction. Only valid against the instance that
/// issued it, and only until that transaction commits or rolls back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxnHandle(pub u64);

/// Monotonically increasing commit snapshot of a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotId(pub u64);

/// Column types supported by catalog table definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

/// Catalog-level metadata returned by [`MetadataBackend::load_catalog_info`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogInfo {
    pub catalog_uuid: String,
    pub created_at: DateTime<Utc>,
    pub snapshot: SnapshotId,
    pub schema_count: usize,
    pub table_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDef {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl SchemaDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub created_at: DateTime<Utc>,
}

impl TableDef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            columns,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDef {
    pub schema: String,
    pub name: String,
    /// Backend-opaque view definition text.
    pub definition: String,
    pub created_at: DateTime<Utc>,
}

impl ViewDef {
    pub fn new(
        schema: impl Into<String>,
        name: impl Into<String>,
        definition: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            definition: definition.into(),
            created_at: Utc::now(),
        }
    }
}

/// One data file registered against a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFile {
    /// Path relative to the attachment's data location.
    pub path: String,
    pub row_count: u64,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStats {
    pub row_count: u64,
    pub file_count: u64,
    pub total_size_bytes: u64,
    pub updated_at: DateTime<Utc>,
}

/// Partition-level metadata. The reference backends keep every file in a
/// single default partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionData {
    pub partition_id: u64,
    pub files: Vec<DataFile>,
}

/// Finite, restartable iteration over a table's registered data files.
/// The sequence is a snapshot taken at the time of the
/// [`MetadataBackend::list_data_files`] call; calling again restarts it.
pub struct DataFileIter {
    files: std::vec::IntoIter<DataFile>,
}

impl DataFileIter {
    pub fn new(files: Vec<DataFile>) -> Self {
        Self {
            files: files.into_iter(),
        }
    }
}

impl Iterator for DataFileIter {
    type Item = DataFile;

    fn next(&mut self) -> Option<DataFile> {
        self.files.next()
    }
}

/// Where an attachment keeps its metadata and data, as handed to backend
/// factories by the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendLocation {
    pub metadata_location: PathBuf,
    pub data_location: PathBuf,
    pub options: BTreeMap<String, String>,
}

/// Durable catalog state for one attached storage catalog.
///
/// Error policy: `NotFound` for missing objects, `Conflict` for duplicate
/// creates and commit-time write conflicts, `BackendUnavailable` for I/O
/// failures (retryable), `Internal` for contract violations such as using a
/// stale transaction handle.
pub trait MetadataBackend: Send {
    /// Idempotent first-use setup: create backing structures if absent,
    /// leave existing state untouched.
    fn initialize(&mut self) -> LakeResult<()>;

    /// Read current catalog-level metadata from the last committed state.
    fn load_catalog_info(&self) -> LakeResult<CatalogInfo>;

    /// Begin the instance's transaction. An instance carries at most one
    /// active transaction; beginning a second is a contract violation.
    fn begin_transaction(&mut self) -> LakeResult<TxnHandle>;
    fn commit_transaction(&mut self, txn: TxnHandle) -> LakeResult<()>;
    fn rollback_transaction(&mut self, txn: TxnHandle) -> LakeResult<()>;

    /// The committed snapshot this transaction reads from.
    fn get_snapshot(&self, txn: TxnHandle) -> LakeResult<SnapshotId>;

    fn create_schema(&mut self, txn: TxnHandle, def: &SchemaDef, if_not_exists: bool)
    -> LakeResult<()>;
    fn drop_schema(&mut self, txn: TxnHandle, name: &str) -> LakeResult<()>;

    fn create_table(&mut self, txn: TxnHandle, def: &TableDef, if_not_exists: bool)
    -> LakeResult<()>;
    fn drop_table(&mut self, txn: TxnHandle, schema: &str, name: &str) -> LakeResult<()>;

    fn create_view(&mut self, txn: TxnHandle, def: &ViewDef, if_not_exists: bool)
    -> LakeResult<()>;
    fn drop_view(&mut self, txn: TxnHandle, schema: &str, name: &str) -> LakeResult<()>;

    fn get_table(&self, txn: TxnHandle, schema: &str, name: &str) -> LakeResult<TableDef>;
    fn list_tables(&self, txn: TxnHandle, schema: &str) -> LakeResult<Vec<String>>;

    /// Register a data file against an existing table. Registration is
    /// transactionally consistent with table existence: registering against
    /// a dropped table fails with `NotFound`.
    fn register_data_file(
        &mut self,
        txn: TxnHandle,
        schema: &str,
        table: &str,
        file: DataFile,
    ) -> LakeResult<()>;
    fn delete_data_file(
        &mut self,
        txn: TxnHandle,
        schema: &str,
        table: &str,
        path: &str,
    ) -> LakeResult<()>;
    fn list_data_files(&self, txn: TxnHandle, schema: &str, table: &str)
    -> LakeResult<DataFileIter>;

    /// Best-effort: callers log and continue on failure rather than aborting
    /// the owning transaction.
    fn update_table_stats(
        &mut self,
        txn: TxnHandle,
        schema: &str,
        table: &str,
        stats: TableStats,
    ) -> LakeResult<()>;
    fn get_table_stats(&self, txn: TxnHandle, schema: &str, table: &str)
    -> LakeResult<Option<TableStats>>;
    fn get_partition_data(
        &self,
        txn: TxnHandle,
        schema: &str,
        table: &str,
    ) -> LakeResult<Vec<PartitionData>>;
}

impl std::fmt::Debug for dyn MetadataBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn MetadataBackend")
    }
}
