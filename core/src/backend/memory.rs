//! In-memory metadata backend, registered as `"memory"`.
//!
//! Same transactional contract as the file backend, but the committed
//! document lives in a store shared by every instance the same registration
//! produces, keyed by metadata location. Nothing survives the process; this
//! backend exists to prove the registry dispatches across backend kinds and
//! to keep unit tests off the disk.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::document::CatalogDocument;
use super::{
    BackendLocation, CatalogInfo, DataFile, DataFileIter, MetadataBackend, PartitionData,
    SchemaDef, SnapshotId, TableDef, TableStats, TxnHandle, ViewDef,
};
use crate::error::{LakeError, LakeResult};

pub const MEMORY_BACKEND_NAME: &str = "memory";

/// Committed catalog documents, shared by all instances of one registration.
#[derive(Default)]
pub struct MemoryStore {
    catalogs: Mutex<HashMap<String, CatalogDocument>>,
}

struct ActiveTxn {
    handle: TxnHandle,
    base: SnapshotId,
    staged: CatalogDocument,
}

pub struct MemoryMetadataBackend {
    store: Arc<MemoryStore>,
    key: String,
    txn: Option<ActiveTxn>,
    next_txn_id: u64,
}

impl MemoryMetadataBackend {
    pub fn new(store: Arc<MemoryStore>, location: &BackendLocation) -> Self {
        Self {
            store,
            key: location.metadata_location.display().to_string(),
            txn: None,
            next_txn_id: 1,
        }
    }

    fn load_committed(&self) -> LakeResult<CatalogDocument> {
        self.store
            .catalogs
            .lock()
            .get(&self.key)
            .cloned()
            .ok_or_else(|| {
                LakeError::BackendUnavailable(format!(
                    "no catalog document at '{}' (backend not initialized)",
                    self.key
                ))
            })
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

impl MetadataBackend for MemoryMetadataBackend {
    fn initialize(&mut self) -> LakeResult<()> {
        self.store
            .catalogs
            .lock()
            .entry(self.key.clone())
            .or_insert_with(CatalogDocument::new);
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

        let mut catalogs = self.store.catalogs.lock();
        let current = catalogs.get(&self.key).ok_or_else(|| {
            LakeError::BackendUnavailable(format!("no catalog document at '{}'", self.key))
        })?;
        if current.snapshot != active.base {
            return Err(LakeError::Conflict(format!(
                "catalog changed underneath transaction (snapshot {} -> {})",
                active.base.0, current.snapshot.0
            )));
        }
        active.staged.snapshot = SnapshotId(active.base.0 + 1);
        catalogs.insert(self.key.clone(), active.staged);
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ColumnDef, ColumnType};
    use crate::error::ErrorKind;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn location(key: &str) -> BackendLocation {
        BackendLocation {
            metadata_location: PathBuf::from(key),
            data_location: PathBuf::from(format!("{key}_data")),
            options: BTreeMap::new(),
        }
    }

    fn table_def(name: &str) -> TableDef {
        TableDef::new(
            "main",
            name,
            vec![ColumnDef {
                name: "i".into(),
                column_type: ColumnType::Integer,
            }],
        )
    }

    #[test]
    fn test_begin_before_initialize_is_unavailable() {
        let store = Arc::new(MemoryStore::default());
        let mut backend = MemoryMetadataBackend::new(store, &location("c1"));
        let err = backend.begin_transaction().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_isolation_between_instances() {
        let store = Arc::new(MemoryStore::default());
        let loc = location("c1");

        let mut writer = MemoryMetadataBackend::new(Arc::clone(&store), &loc);
        writer.initialize().unwrap();
        let txn = writer.begin_transaction().unwrap();
        writer.create_table(txn, &table_def("t"), false).unwrap();

        let mut reader = MemoryMetadataBackend::new(Arc::clone(&store), &loc);
        let rtxn = reader.begin_transaction().unwrap();
        assert_eq!(
            reader.get_table(rtxn, "main", "t").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        reader.rollback_transaction(rtxn).unwrap();

        writer.commit_transaction(txn).unwrap();

        let mut reader = MemoryMetadataBackend::new(store, &loc);
        let rtxn = reader.begin_transaction().unwrap();
        assert!(reader.get_table(rtxn, "main", "t").is_ok());
    }

    #[test]
    fn test_distinct_locations_are_distinct_catalogs() {
        let store = Arc::new(MemoryStore::default());

        let mut a = MemoryMetadataBackend::new(Arc::clone(&store), &location("a"));
        let mut b = MemoryMetadataBackend::new(store, &location("b"));
        a.initialize().unwrap();
        b.initialize().unwrap();

        let ta = a.begin_transaction().unwrap();
        a.create_table(ta, &table_def("only_in_a"), false).unwrap();
        a.commit_transaction(ta).unwrap();

        let tb = b.begin_transaction().unwrap();
        assert_eq!(
            b.get_table(tb, "main", "only_in_a").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_commit_conflict() {
        let store = Arc::new(MemoryStore::default());
        let loc = location("c1");

        let mut init = MemoryMetadataBackend::new(Arc::clone(&store), &loc);
        init.initialize().unwrap();

        let mut a = MemoryMetadataBackend::new(Arc::clone(&store), &loc);
        let mut b = MemoryMetadataBackend::new(store, &loc);
        let ta = a.begin_transaction().unwrap();
        let tb = b.begin_transaction().unwrap();
        a.create_table(ta, &table_def("x"), false).unwrap();
        b.create_table(tb, &table_def("y"), false).unwrap();

        a.commit_transaction(ta).unwrap();
        assert_eq!(
            b.commit_transaction(tb).unwrap_err().kind(),
            ErrorKind::Conflict
        );
    }
}
