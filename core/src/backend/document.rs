//! In-memory catalog document shared by the reference backends.
//!
//! Both the file and memory backends stage a copy of this document inside a
//! transaction and publish it atomically on commit. All object-level rules
//! (duplicate creates, missing objects, restrict-on-drop) live here so the
//! two backends cannot drift apart.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    CatalogInfo, DataFile, PartitionData, SchemaDef, SnapshotId, TableDef, TableStats, ViewDef,
};
use crate::error::{LakeError, LakeResult};

/// Schema every catalog starts with.
pub const DEFAULT_SCHEMA: &str = "main";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableEntry {
    pub def: TableDef,
    pub files: Vec<DataFile>,
    pub stats: Option<TableStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub def: SchemaDef,
    pub tables: BTreeMap<String, TableEntry>,
    pub views: BTreeMap<String, ViewDef>,
}

impl SchemaEntry {
    fn new(def: SchemaDef) -> Self {
        Self {
            def,
            tables: BTreeMap::new(),
            views: BTreeMap::new(),
        }
    }
}

/// The whole durable state of one catalog attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub catalog_uuid: String,
    pub created_at: chrono::DateTime<Utc>,
    pub snapshot: SnapshotId,
    pub schemas: BTreeMap<String, SchemaEntry>,
}

impl CatalogDocument {
    pub fn new() -> Self {
        let mut schemas = BTreeMap::new();
        schemas.insert(
            DEFAULT_SCHEMA.to_string(),
            SchemaEntry::new(SchemaDef::new(DEFAULT_SCHEMA)),
        );
        Self {
            catalog_uuid: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            snapshot: SnapshotId(0),
            schemas,
        }
    }

    pub fn info(&self) -> CatalogInfo {
        CatalogInfo {
            catalog_uuid: self.catalog_uuid.clone(),
            created_at: self.created_at,
            snapshot: self.snapshot,
            schema_count: self.schemas.len(),
            table_count: self.schemas.values().map(|s| s.tables.len()).sum(),
        }
    }

    fn schema(&self, name: &str) -> LakeResult<&SchemaEntry> {
        self.schemas
            .get(name)
            .ok_or_else(|| LakeError::NotFound(format!("schema '{name}'")))
    }

    fn schema_mut(&mut self, name: &str) -> LakeResult<&mut SchemaEntry> {
        self.schemas
            .get_mut(name)
            .ok_or_else(|| LakeError::NotFound(format!("schema '{name}'")))
    }

    fn table(&self, schema: &str, name: &str) -> LakeResult<&TableEntry> {
        self.schema(schema)?
            .tables
            .get(name)
            .ok_or_else(|| LakeError::NotFound(format!("table '{schema}.{name}'")))
    }

    fn table_mut(&mut self, schema: &str, name: &str) -> LakeResult<&mut TableEntry> {
        self.schema_mut(schema)?
            .tables
            .get_mut(name)
            .ok_or_else(|| LakeError::NotFound(format!("table '{schema}.{name}'")))
    }

    pub fn create_schema(&mut self, def: &SchemaDef, if_not_exists: bool) -> LakeResult<()> {
        if self.schemas.contains_key(&def.name) {
            if if_not_exists {
                return Ok(());
            }
            return Err(LakeError::Conflict(format!(
                "schema '{}' already exists",
                def.name
            )));
        }
        self.schemas
            .insert(def.name.clone(), SchemaEntry::new(def.clone()));
        Ok(())
    }

    /// Drop an empty schema. Dropping a schema that still holds tables or
    /// views is a `Conflict`.
    pub fn drop_schema(&mut self, name: &str) -> LakeResult<()> {
        let entry = self.schema(name)?;
        if !entry.tables.is_empty() || !entry.views.is_empty() {
            return Err(LakeError::Conflict(format!("schema '{name}' is not empty")));
        }
        self.schemas.remove(name);
        Ok(())
    }

    pub fn create_table(&mut self, def: &TableDef, if_not_exists: bool) -> LakeResult<()> {
        let schema = self.schema_mut(&def.schema)?;
        if schema.tables.contains_key(&def.name) {
            if if_not_exists {
                return Ok(());
            }
            return Err(LakeError::Conflict(format!(
                "table '{}.{}' already exists",
                def.schema, def.name
            )));
        }
        if schema.views.contains_key(&def.name) {
            return Err(LakeError::Conflict(format!(
                "view '{}.{}' already exists",
                def.schema, def.name
            )));
        }
        schema.tables.insert(
            def.name.clone(),
            TableEntry {
                def: def.clone(),
                files: Vec::new(),
                stats: None,
            },
        );
        Ok(())
    }

    /// Drop a table and return its registered files so the caller can reclaim
    /// the underlying storage.
    pub fn drop_table(&mut self, schema: &str, name: &str) -> LakeResult<Vec<DataFile>> {
        let entry = self.schema_mut(schema)?;
        match entry.tables.remove(name) {
            Some(table) => Ok(table.files),
            None => Err(LakeError::NotFound(format!("table '{schema}.{name}'"))),
        }
    }

    pub fn create_view(&mut self, def: &ViewDef, if_not_exists: bool) -> LakeResult<()> {
        let schema = self.schema_mut(&def.schema)?;
        if schema.views.contains_key(&def.name) {
            if if_not_exists {
                return Ok(());
            }
            return Err(LakeError::Conflict(format!(
                "view '{}.{}' already exists",
                def.schema, def.name
            )));
        }
        if schema.tables.contains_key(&def.name) {
            return Err(LakeError::Conflict(format!(
                "table '{}.{}' already exists",
                def.schema, def.name
            )));
        }
        schema.views.insert(def.name.clone(), def.clone());
        Ok(())
    }

    pub fn drop_view(&mut self, schema: &str, name: &str) -> LakeResult<()> {
        let entry = self.schema_mut(schema)?;
        if entry.views.remove(name).is_none() {
            return Err(LakeError::NotFound(format!("view '{schema}.{name}'")));
        }
        Ok(())
    }

    pub fn get_table(&self, schema: &str, name: &str) -> LakeResult<TableDef> {
        Ok(self.table(schema, name)?.def.clone())
    }

    pub fn list_tables(&self, schema: &str) -> LakeResult<Vec<String>> {
        Ok(self.schema(schema)?.tables.keys().cloned().collect())
    }

    pub fn register_data_file(
        &mut self,
        schema: &str,
        table: &str,
        file: DataFile,
    ) -> LakeResult<()> {
        let entry = self.table_mut(schema, table)?;
        if entry.files.iter().any(|f| f.path == file.path) {
            return Err(LakeError::Conflict(format!(
                "data file '{}' already registered for '{schema}.{table}'",
                file.path
            )));
        }
        entry.files.push(file);
        Ok(())
    }

    pub fn delete_data_file(&mut self, schema: &str, table: &str, path: &str) -> LakeResult<()> {
        let entry = self.table_mut(schema, table)?;
        let before = entry.files.len();
        entry.files.retain(|f| f.path != path);
        if entry.files.len() == before {
            return Err(LakeError::NotFound(format!(
                "data file '{path}' for '{schema}.{table}'"
            )));
        }
        Ok(())
    }

    pub fn list_data_files(&self, schema: &str, table: &str) -> LakeResult<Vec<DataFile>> {
        Ok(self.table(schema, table)?.files.clone())
    }

    pub fn update_table_stats(
        &mut self,
        schema: &str,
        table: &str,
        stats: TableStats,
    ) -> LakeResult<()> {
        self.table_mut(schema, table)?.stats = Some(stats);
        Ok(())
    }

    pub fn get_table_stats(&self, schema: &str, table: &str) -> LakeResult<Option<TableStats>> {
        Ok(self.table(schema, table)?.stats.clone())
    }

    pub fn get_partition_data(&self, schema: &str, table: &str) -> LakeResult<Vec<PartitionData>> {
        let entry = self.table(schema, table)?;
        Ok(vec![PartitionData {
            partition_id: 0,
            files: entry.files.clone(),
        }])
    }
}

impl Default for CatalogDocument {
    fn default() -> Self {
        Self::new()
    }
}
