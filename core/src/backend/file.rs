//! File-backed metadata backend, registered as `"json"`.
//!
//! Keeps the whole catalog as one JSON document at the attachment's metadata
//! location. A transaction stages a private copy of the document; commit
//! re-reads the file, verifies the base snapshot is unchanged (commit-time
//! conflict detection) and publishes the staged copy with a
//! write-temp-then-rename. Readers always see the last committed document,
//! which gives transaction isolation and crash-safe retries for free.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::document::CatalogDocument;
use super::{
    BackendLocation, CatalogInfo, DataFile, DataFileIter, MetadataBackend, PartitionData,
    SchemaDef, SnapshotId, TableDef, TableStats, TxnHandle, ViewDef,
};
use crate::error::{LakeError, LakeResult};

pub const FILE_BACKEND_NAME: &str = "json";

lazy_static! {
    /// One lock per metadata path. Commit's snapshot check and publish must
    /// be atomic with respect to every other instance writing the same
    /// document in this process.
    static ref DOCUMENT_LOCKS: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>> =
        Mutex::new(HashMap::new());
}

fn document_lock(path: &Path) -> Arc<Mutex<()>> {
    Arc::clone(DOCUMENT_LOCKS.lock().entry(path.to_path_buf()).or_default())
}

struct ActiveTxn {
    handle: TxnHandle,
    base: SnapshotId,
    staged: CatalogDocument,
}

pub struct FileMetadataBackend {
    metadata_path: PathBuf,
    txn: Option<ActiveTxn>,
    next_txn_id: u64,
}

impl FileMetadataBackend {
    pub fn new(location: &BackendLocation) -> Self {
        Self {
            metadata_path: location.metadata_location.clone(),
            txn: None,
            next_txn_id: 1,
        }
    }

    fn load_committed(&self) -> LakeResult<CatalogDocument> {
        let mut contents = String::new();
        File::open(&self.metadata_path)
            .map_err(|e| {
                LakeError::BackendUnavailable(format!(
                    "cannot open catalog document '{}': {e}",
                    self.metadata_path.display()
                ))
            })?
            .read_to_string(&mut contents)?;

        serde_json::from_str(&contents).map_err(|e| {
            LakeError::BackendUnavailable(format!(
                "cannot parse catalog document '{}': {e}",
                self.metadata_path.display()
            ))
        })
    }

    fn write_atomic(path: &Path, doc: &CatalogDocument) -> LakeResult<()> {
        let json = serde_json::to_string_pretty(doc)?;
        let tmp = path.with_extension(format!("tmp.{}", Uuid::new_v4()));

        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);

        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(LakeError::BackendUnavailable(format!(
                "cannot publish catalog document '{}': {e}",
                path.display()
            )));
        }
        Ok(())
    }

    fn active(&self, txn: TxnHandle) -> LakeResult<&ActiveTxn> {
        self.txn
            .as_ref()
            .filter(|t| t.handle == txn)
            .ok_or_else(|| LakeError::Internal(format!("transaction {} is not active", txn.0)))
    }

    fn active_mut(&mut self, txn: TxnHandle) -> LakeResult<&mut ActiveTxn> {
        self.txn
            .as_mut()
            .filter(|t| t.handle == txn)
            .ok_or_else(|| LakeError::Internal(format!("transaction {} is not active", txn.0)))
    }
}

impl MetadataBackend for FileMetadataBackend {
    fn initialize(&mut self) -> LakeResult<()> {
        let lock = document_lock(&self.metadata_path);
        let _guard = lock.lock();
        if self.metadata_path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.metadata_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let doc = CatalogDocument::new();
        Self::write_atomic(&self.metadata_path, &doc)?;
        debug!(path = %self.metadata_path.display(), "created catalog document");
        Ok(())
    }

    fn load_catalog_info(&self) -> LakeResult<CatalogInfo> {
        Ok(self.load_committed()?.info())
    }

    fn begin_transaction(&mut self) -> LakeResult<TxnHandle> {
        if self.txn.is_some() {
            return Err(LakeError::Internal(
                "backend instance already has an active transaction".into(),
            ));
        }
        let committed = self.load_committed()?;
        let handle = TxnHandle(self.next_txn_id);
        self.next_txn_id += 1;
        self.txn = Some(ActiveTxn {
            handle,
            base: committed.snapshot,
            staged: committed,
        });
        Ok(handle)
    }

    fn commit_transaction(&mut self, txn: TxnHandle) -> LakeResult<()> {
        let mut active = match self.txn.take() {
            Some(t) if t.handle == txn => t,
            other => {
                self.txn = other;
                return Err(LakeError::Internal(format!(
                    "transaction {} is not active",
                    txn.0
                )));
            }
        };

        let lock = document_lock(&self.metadata_path);
        let _guard = lock.lock();
        let current = self.load_committed()?;
        if current.snapshot != active.base {
            return Err(LakeError::Conflict(format!(
                "catalog changed underneath transaction (snapshot {} -> {})",
                active.base.0, current.snapshot.0
            )));
        }
        active.staged.snapshot = SnapshotId(active.base.0 + 1);
        Self::write_atomic(&self.metadata_path, &active.staged)
    }

    fn rollback_transaction(&mut self, txn: TxnHandle) -> LakeResult<()> {
        self.active(txn)?;
        self.txn = None;
        Ok(())
    }

    fn get_snapshot(&self, txn: TxnHandle) -> LakeResult<SnapshotId> {
        Ok(self.active(txn)?.base)
    }

    fn create_schema(
        &mut self,
        txn: TxnHandle,
        def: &SchemaDef,
        if_not_exists: bool,
    ) -> LakeResult<()> {
        self.active_mut(txn)?.staged.create_schema(def, if_not_exists)
    }

    fn drop_schema(&mut self, txn: TxnHandle, name: &str) -> LakeResult<()> {
        self.active_mut(txn)?.staged.drop_schema(name)
    }

    fn create_table(
        &mut self,
        txn: TxnHandle,
        def: &TableDef,
        if_not_exists: bool,
    ) -> LakeResult<()> {
        self.active_mut(txn)?.staged.create_table(def, if_not_exists)
    }

    fn drop_table(&mut self, txn: TxnHandle, schema: &str, name: &str) -> LakeResult<()> {
        self.active_mut(txn)?.staged.drop_table(schema, name)?;
        Ok(())
    }

    fn create_view(
        &mut self,
        txn: TxnHandle,
        def: &ViewDef,
        if_not_exists: bool,
    ) -> LakeResult<()> {
        self.active_mut(txn)?.staged.create_view(def, if_not_exists)
    }

    fn drop_view(&mut self, txn: TxnHandle, schema: &str, name: &str) -> LakeResult<()> {
        self.active_mut(txn)?.staged.drop_view(schema, name)
    }

    fn get_table(&self, txn: TxnHandle, schema: &str, name: &str) -> LakeResult<TableDef> {
        self.active(txn)?.staged.get_table(schema, name)
    }

    fn list_tables(&self, txn: TxnHandle, schema: &str) -> LakeResult<Vec<String>> {
        self.active(txn)?.staged.list_tables(schema)
    }

    fn register_data_file(
        &mut self,
        txn: TxnHandle,
        schema: &str,
        table: &str,
        file: DataFile,
    ) -> LakeResult<()> {
        self.active_mut(txn)?
            .staged
            .register_data_file(schema, table, file)
    }

    fn delete_data_file(
        &mut self,
        txn: TxnHandle,
        schema: &str,
        table: &str,
        path: &str,
    ) -> LakeResult<()> {
        self.active_mut(txn)?
            .staged
            .delete_data_file(schema, table, path)
    }

    fn list_data_files(
        &self,
        txn: TxnHandle,
        schema: &str,
        table: &str,
    ) -> LakeResult<DataFileIter> {
        Ok(DataFileIter::new(
            self.active(txn)?.staged.list_data_files(schema, table)?,
        ))
    }

    fn update_table_stats(
        &mut self,
        txn: TxnHandle,
        schema: &str,
        table: &str,
        stats: TableStats,
    ) -> LakeResult<()> {
        self.active_mut(txn)?
            .staged
            .update_table_stats(schema, table, stats)
    }

    fn get_table_stats(
        &self,
        txn: TxnHandle,
        schema: &str,
        table: &str,
    ) -> LakeResult<Option<TableStats>> {
        self.active(txn)?.staged.get_table_stats(schema, table)
    }

    fn get_partition_data(
        &self,
        txn: TxnHandle,
        schema: &str,
        table: &str,
    ) -> LakeResult<Vec<PartitionData>> {
        self.active(txn)?.staged.get_partition_data(schema, table)
    }
}
