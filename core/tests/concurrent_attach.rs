//! Concurrent first-use: many workers racing to attach the same catalog
//! must converge on exactly one attachment and one underlying catalog state.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Barrier;

use pretty_assertions::assert_eq;

use ferrolake_core::backend::{ColumnDef, ColumnType};
use ferrolake_core::engine::manager;
use ferrolake_core::{
    AttachmentDescriptor, CatalogOperation, EngineConfig, HostAdapter, OperationOutput, Value,
};

#[test]
fn test_concurrent_identical_attaches_yield_one_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        data_dir: dir.path().to_path_buf(),
        ..EngineConfig::default()
    };

    let descriptor = AttachmentDescriptor {
        catalog_name: "shared".into(),
        backend_name: "json".into(),
        metadata_location: PathBuf::from("shared.json"),
        data_location: PathBuf::from("shared_data"),
        extra_options: BTreeMap::new(),
        if_not_exists: true,
    };

    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let config = config.clone();
            let descriptor = descriptor.clone();
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let adapter = HostAdapter::new(config);
                barrier.wait();
                adapter.run_catalog_operation(&CatalogOperation::Attach(descriptor))
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    // Exactly one attachment exists on the engine.
    let engine = manager::global().try_instance().unwrap();
    assert_eq!(engine.attached_catalogs(), vec!["shared".to_string()]);

    // And exactly one underlying catalog state: create a table through one
    // adapter, every other view of the catalog sees it once.
    let adapter = HostAdapter::new(config);
    adapter
        .run_catalog_operation(&CatalogOperation::CreateTable {
            catalog: "shared".into(),
            schema: "main".into(),
            table: "t".into(),
            columns: vec![ColumnDef {
                name: "i".into(),
                column_type: ColumnType::Integer,
            }],
            if_not_exists: false,
        })
        .unwrap();
    adapter
        .run_catalog_operation(&CatalogOperation::Insert {
            catalog: "shared".into(),
            schema: "main".into(),
            table: "t".into(),
            rows: vec![vec![Value::Integer(1)]],
        })
        .unwrap();

    let output = adapter
        .run_catalog_operation(&CatalogOperation::ListTables {
            catalog: "shared".into(),
            schema: "main".into(),
        })
        .unwrap();
    assert_eq!(output, OperationOutput::Names(vec!["t".into()]));

    let info = adapter
        .run_catalog_operation(&CatalogOperation::LoadCatalogInfo {
            catalog: "shared".into(),
        })
        .unwrap();
    match info {
        OperationOutput::Info(info) => assert_eq!(info.table_count, 1),
        other => panic!("unexpected output: {other:?}"),
    }
}
