//! End-to-end tests through the host adapter against the process-wide
//! engine. All tests share one engine configuration (the global instance is
//! constructed once per process) and use distinct catalog names.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use ferrolake_core::backend::{ColumnDef, ColumnType};
use ferrolake_core::{
    AttachmentDescriptor, CatalogOperation, EngineConfig, ErrorKind, HostAdapter, OperationOutput,
    Value,
};

fn shared_config() -> EngineConfig {
    static DIR: OnceLock<TempDir> = OnceLock::new();
    let dir = DIR.get_or_init(|| tempfile::tempdir().unwrap());
    EngineConfig {
        data_dir: dir.path().to_path_buf(),
        ..EngineConfig::default()
    }
}

fn adapter() -> HostAdapter {
    HostAdapter::new(shared_config())
}

fn descriptor(catalog: &str, backend: &str, if_not_exists: bool) -> AttachmentDescriptor {
    AttachmentDescriptor {
        catalog_name: catalog.to_string(),
        backend_name: backend.to_string(),
        metadata_location: PathBuf::from(format!("{catalog}.json")),
        data_location: PathBuf::from(format!("{catalog}_data")),
        extra_options: BTreeMap::new(),
        if_not_exists,
    }
}

fn int_columns() -> Vec<ColumnDef> {
    vec![ColumnDef {
        name: "i".into(),
        column_type: ColumnType::Integer,
    }]
}

#[test]
fn test_round_trip_with_durability_across_detach() {
    let adapter = adapter();
    let catalog = "roundtrip";

    adapter
        .run_catalog_operation(&CatalogOperation::Attach(descriptor(catalog, "json", true)))
        .unwrap();
    adapter
        .run_catalog_operation(&CatalogOperation::CreateTable {
            catalog: catalog.into(),
            schema: "main".into(),
            table: "verify_table".into(),
            columns: int_columns(),
            if_not_exists: false,
        })
        .unwrap();
    adapter
        .run_catalog_operation(&CatalogOperation::Insert {
            catalog: catalog.into(),
            schema: "main".into(),
            table: "verify_table".into(),
            rows: vec![vec![Value::Integer(1)], vec![Value::Integer(2)]],
        })
        .unwrap();

    let rows = adapter
        .run_for_rows(&CatalogOperation::Select {
            catalog: catalog.into(),
            schema: "main".into(),
            table: "verify_table".into(),
            order_by: Some("i".into()),
        })
        .unwrap();
    assert_eq!(rows, vec![vec![Value::Integer(1)], vec![Value::Integer(2)]]);

    // Detach and re-attach: the catalog state must survive.
    adapter
        .run_catalog_operation(&CatalogOperation::Detach {
            catalog: catalog.into(),
        })
        .unwrap();
    adapter
        .run_catalog_operation(&CatalogOperation::Attach(descriptor(catalog, "json", true)))
        .unwrap();

    let rows = adapter
        .run_for_rows(&CatalogOperation::Select {
            catalog: catalog.into(),
            schema: "main".into(),
            table: "verify_table".into(),
            order_by: Some("i".into()),
        })
        .unwrap();
    assert_eq!(rows, vec![vec![Value::Integer(1)], vec![Value::Integer(2)]]);
}

#[test]
fn test_unknown_backend_has_no_side_effect() {
    let adapter = adapter();
    let catalog = "unknown_backend";

    let err = adapter
        .run_catalog_operation(&CatalogOperation::Attach(descriptor(
            catalog,
            "nonexistent",
            true,
        )))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownBackend);
    assert!(!err.retryable);

    // Nothing was attached, so the same name attaches cleanly afterwards.
    adapter
        .run_catalog_operation(&CatalogOperation::Attach(descriptor(catalog, "json", false)))
        .unwrap();
}

#[test]
fn test_error_mapping_carries_operation_context() {
    let adapter = adapter();

    let err = adapter
        .run_catalog_operation(&CatalogOperation::Select {
            catalog: "never_attached".into(),
            schema: "main".into(),
            table: "t".into(),
            order_by: None,
        })
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::NotFound);
    let message = err.to_string();
    assert!(message.contains("select from 'never_attached.main.t'"));
    assert!(message.contains("not attached"));
}

#[test]
fn test_creates_are_reentrant() {
    let adapter = adapter();
    let catalog = "reentrant";

    adapter
        .run_catalog_operation(&CatalogOperation::Attach(descriptor(catalog, "json", true)))
        .unwrap();

    let create = |if_not_exists| CatalogOperation::CreateTable {
        catalog: catalog.into(),
        schema: "main".into(),
        table: "t".into(),
        columns: int_columns(),
        if_not_exists,
    };

    adapter.run_catalog_operation(&create(false)).unwrap();
    let err = adapter.run_catalog_operation(&create(false)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    // A retry under if-not-exists is a clean no-op.
    adapter.run_catalog_operation(&create(true)).unwrap();
}

#[test]
fn test_stats_and_partitions_through_adapter() {
    let adapter = adapter();
    let catalog = "stats";

    adapter
        .run_catalog_operation(&CatalogOperation::Attach(descriptor(catalog, "memory", true)))
        .unwrap();
    adapter
        .run_catalog_operation(&CatalogOperation::CreateTable {
            catalog: catalog.into(),
            schema: "main".into(),
            table: "t".into(),
            columns: int_columns(),
            if_not_exists: false,
        })
        .unwrap();
    adapter
        .run_catalog_operation(&CatalogOperation::Insert {
            catalog: catalog.into(),
            schema: "main".into(),
            table: "t".into(),
            rows: vec![vec![Value::Integer(10)], vec![Value::Integer(20)]],
        })
        .unwrap();

    let output = adapter
        .run_catalog_operation(&CatalogOperation::UpdateStats {
            catalog: catalog.into(),
            schema: "main".into(),
            table: "t".into(),
        })
        .unwrap();
    match output {
        OperationOutput::Stats(Some(stats)) => {
            assert_eq!(stats.row_count, 2);
            assert_eq!(stats.file_count, 1);
        }
        other => panic!("unexpected output: {other:?}"),
    }

    let output = adapter
        .run_catalog_operation(&CatalogOperation::GetPartitionData {
            catalog: catalog.into(),
            schema: "main".into(),
            table: "t".into(),
        })
        .unwrap();
    match output {
        OperationOutput::Partitions(partitions) => {
            assert_eq!(partitions.len(), 1);
            assert_eq!(partitions[0].files.len(), 1);
        }
        other => panic!("unexpected output: {other:?}"),
    }

    let output = adapter
        .run_catalog_operation(&CatalogOperation::ListTables {
            catalog: catalog.into(),
            schema: "main".into(),
        })
        .unwrap();
    assert_eq!(output, OperationOutput::Names(vec!["t".into()]));
}
