//! Operation envelope.
//!
//! `CatalogOperation` and `OperationOutput` are the only things that cross
//! the bridge, and they cross it serialized as JSON byte buffers. Neither
//! side of the bridge ever hands the other a composite in-memory type.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::backend::{CatalogInfo, ColumnDef, ColumnType, PartitionData, TableStats};
use crate::catalog::AttachmentDescriptor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Null,
}

impl Value {
    /// Whether this value can be stored in a column of the given type.
    /// `Null` is storable everywhere.
    pub fn matches(&self, column_type: ColumnType) -> bool {
        matches!(
            (self, column_type),
            (Value::Null, _)
                | (Value::Integer(_), ColumnType::Integer)
                | (Value::Float(_), ColumnType::Float)
                | (Value::Text(_), ColumnType::Text)
                | (Value::Boolean(_), ColumnType::Boolean)
        )
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
        }
    }

    /// Total order used for `ORDER BY`: nulls first, then booleans, numbers,
    /// text. Integers and floats compare numerically.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Integer(a), Value::Float(b)) => {
                (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Value::Float(a), Value::Integer(b)) => {
                a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal)
            }
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

pub type Row = Vec<Value>;

/// One catalog operation, addressed to an attached catalog by name (except
/// `Attach`, which creates the attachment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CatalogOperation {
    Attach(AttachmentDescriptor),
    Detach {
        catalog: String,
    },
    LoadCatalogInfo {
        catalog: String,
    },
    CreateSchema {
        catalog: String,
        schema: String,
        if_not_exists: bool,
    },
    DropSchema {
        catalog: String,
        schema: String,
    },
    CreateTable {
        catalog: String,
        schema: String,
        table: String,
        columns: Vec<ColumnDef>,
        if_not_exists: bool,
    },
    DropTable {
        catalog: String,
        schema: String,
        table: String,
    },
    CreateView {
        catalog: String,
        schema: String,
        view: String,
        definition: String,
        if_not_exists: bool,
    },
    DropView {
        catalog: String,
        schema: String,
        view: String,
    },
    ListTables {
        catalog: String,
        schema: String,
    },
    Insert {
        catalog: String,
        schema: String,
        table: String,
        rows: Vec<Row>,
    },
    Select {
        catalog: String,
        schema: String,
        table: String,
        /// Column to order by, ascending. Unordered when absent.
        order_by: Option<String>,
    },
    UpdateStats {
        catalog: String,
        schema: String,
        table: String,
    },
    GetPartitionData {
        catalog: String,
        schema: String,
        table: String,
    },
}

impl CatalogOperation {
    /// Short human-readable description used in error context.
    pub fn describe(&self) -> String {
        match self {
            CatalogOperation::Attach(desc) => {
                format!("attach catalog '{}' (backend '{}')", desc.catalog_name, desc.backend_name)
            }
            CatalogOperation::Detach { catalog } => format!("detach catalog '{catalog}'"),
            CatalogOperation::LoadCatalogInfo { catalog } => {
                format!("load info for catalog '{catalog}'")
            }
            CatalogOperation::CreateSchema { catalog, schema, .. } => {
                format!("create schema '{catalog}.{schema}'")
            }
            CatalogOperation::DropSchema { catalog, schema } => {
                format!("drop schema '{catalog}.{schema}'")
            }
            CatalogOperation::CreateTable {
                catalog, schema, table, ..
            } => format!("create table '{catalog}.{schema}.{table}'"),
            CatalogOperation::DropTable { catalog, schema, table } => {
                format!("drop table '{catalog}.{schema}.{table}'")
            }
            CatalogOperation::CreateView { catalog, schema, view, .. } => {
                format!("create view '{catalog}.{schema}.{view}'")
            }
            CatalogOperation::DropView { catalog, schema, view } => {
                format!("drop view '{catalog}.{schema}.{view}'")
            }
            CatalogOperation::ListTables { catalog, schema } => {
                format!("list tables in '{catalog}.{schema}'")
            }
            CatalogOperation::Insert { catalog, schema, table, rows } => {
                format!("insert {} row(s) into '{catalog}.{schema}.{table}'", rows.len())
            }
            CatalogOperation::Select { catalog, schema, table, .. } => {
                format!("select from '{catalog}.{schema}.{table}'")
            }
            CatalogOperation::UpdateStats { catalog, schema, table } => {
                format!("update stats for '{catalog}.{schema}.{table}'")
            }
            CatalogOperation::GetPartitionData { catalog, schema, table } => {
                format!("get partition data for '{catalog}.{schema}.{table}'")
            }
        }
    }
}

/// Result of a successfully executed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationOutput {
    Done,
    Rows(Vec<Row>),
    Names(Vec<String>),
    Info(CatalogInfo),
    Partitions(Vec<PartitionData>),
    Stats(Option<TableStats>),
}

impl OperationOutput {
    /// Rows carried by this output, empty for non-row outputs.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            OperationOutput::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_ordering() {
        let mut values = vec![
            Value::Text("b".into()),
            Value::Integer(2),
            Value::Null,
            Value::Float(1.5),
            Value::Integer(1),
        ];
        values.sort_by(|a, b| a.compare(b));
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Integer(1),
                Value::Float(1.5),
                Value::Integer(2),
                Value::Text("b".into()),
            ]
        );
    }

    #[test]
    fn test_value_type_matching() {
        assert!(Value::Integer(1).matches(ColumnType::Integer));
        assert!(Value::Null.matches(ColumnType::Text));
        assert!(!Value::Text("x".into()).matches(ColumnType::Integer));
    }

    #[test]
    fn test_envelope_round_trips_as_json() {
        let op = CatalogOperation::Insert {
            catalog: "c".into(),
            schema: "main".into(),
            table: "t".into(),
            rows: vec![vec![Value::Integer(1)], vec![Value::Integer(2)]],
        };
        let json = serde_json::to_string(&op).unwrap();
        let back: CatalogOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(back.describe(), op.describe());
    }
}
