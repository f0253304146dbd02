//! The C bridge contract, exercised the way a foreign host would: status
//! codes, the thread-local error buffer, and readiness ordering. One test
//! function because the `NotReady` phase must run before the engine is
//! opened in this process.

use std::ffi::{CStr, CString, c_char};
use std::ptr;

use ferrolake_core::bridge::{
    BRIDGE_API_VERSION, STATUS_OK, ferrolake_bridge_version, ferrolake_ensure_extension_loaded,
    ferrolake_execute, ferrolake_open,
};
use ferrolake_core::{CatalogOperation, OperationOutput, Value};

unsafe fn message(ptr: *const c_char) -> String {
    assert!(!ptr.is_null(), "expected an error message");
    unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string()
}

fn execute(op: &CatalogOperation) -> (i32, Option<OperationOutput>, Option<String>) {
    let envelope = CString::new(serde_json::to_string(op).unwrap()).unwrap();
    let mut result: *const c_char = ptr::null();
    let mut errmsg: *const c_char = ptr::null();
    let status = unsafe { ferrolake_execute(envelope.as_ptr(), &mut result, &mut errmsg) };
    if status == STATUS_OK {
        let output = serde_json::from_str(&unsafe { message(result) }).unwrap();
        (status, Some(output), None)
    } else {
        (status, None, Some(unsafe { message(errmsg) }))
    }
}

#[test]
fn test_bridge_contract_end_to_end() {
    assert_eq!(ferrolake_bridge_version(), BRIDGE_API_VERSION);

    let extension = CString::new("ferrolake").unwrap();
    let mut errmsg: *const c_char = ptr::null();

    // Before the engine is opened, extension loading reports NotReady.
    let status = unsafe { ferrolake_ensure_extension_loaded(extension.as_ptr(), &mut errmsg) };
    assert_eq!(status, 1);
    assert!(unsafe { message(errmsg) }.contains("not ready"));

    // Open the engine; repeating with the same directory is idempotent.
    let dir = tempfile::tempdir().unwrap();
    let data_dir = CString::new(dir.path().to_str().unwrap()).unwrap();
    let mut errmsg: *const c_char = ptr::null();
    assert_eq!(
        unsafe { ferrolake_open(data_dir.as_ptr(), &mut errmsg) },
        STATUS_OK
    );
    assert_eq!(
        unsafe { ferrolake_open(data_dir.as_ptr(), &mut errmsg) },
        STATUS_OK
    );

    // A different directory conflicts with the running engine.
    let other = CString::new(dir.path().join("other").to_str().unwrap().to_string()).unwrap();
    let mut errmsg: *const c_char = ptr::null();
    assert_eq!(unsafe { ferrolake_open(other.as_ptr(), &mut errmsg) }, 6);
    assert!(unsafe { message(errmsg) }.contains("different configuration"));

    // Extension loading is now idempotent; an unknown name is a load failure.
    let mut errmsg: *const c_char = ptr::null();
    assert_eq!(
        unsafe { ferrolake_ensure_extension_loaded(extension.as_ptr(), &mut errmsg) },
        STATUS_OK
    );
    assert_eq!(
        unsafe { ferrolake_ensure_extension_loaded(extension.as_ptr(), &mut errmsg) },
        STATUS_OK
    );
    let unknown = CString::new("no_such_extension").unwrap();
    assert_eq!(
        unsafe { ferrolake_ensure_extension_loaded(unknown.as_ptr(), &mut errmsg) },
        2
    );

    // Drive a whole catalog lifecycle through envelopes.
    let attach = CatalogOperation::Attach(ferrolake_core::AttachmentDescriptor {
        catalog_name: "bridge".into(),
        backend_name: "json".into(),
        metadata_location: "bridge.json".into(),
        data_location: "bridge_data".into(),
        extra_options: Default::default(),
        if_not_exists: true,
    });
    assert_eq!(execute(&attach).0, STATUS_OK);

    let create = CatalogOperation::CreateTable {
        catalog: "bridge".into(),
        schema: "main".into(),
        table: "t".into(),
        columns: vec![ferrolake_core::backend::ColumnDef {
            name: "i".into(),
            column_type: ferrolake_core::backend::ColumnType::Integer,
        }],
        if_not_exists: false,
    };
    assert_eq!(execute(&create).0, STATUS_OK);

    let insert = CatalogOperation::Insert {
        catalog: "bridge".into(),
        schema: "main".into(),
        table: "t".into(),
        rows: vec![vec![Value::Integer(2)], vec![Value::Integer(1)]],
    };
    assert_eq!(execute(&insert).0, STATUS_OK);

    let select = CatalogOperation::Select {
        catalog: "bridge".into(),
        schema: "main".into(),
        table: "t".into(),
        order_by: Some("i".into()),
    };
    let (status, output, _) = execute(&select);
    assert_eq!(status, STATUS_OK);
    assert_eq!(
        output.unwrap().into_rows(),
        vec![vec![Value::Integer(1)], vec![Value::Integer(2)]]
    );

    // Failures surface the taxonomy through the status code and carry the
    // operation context in the message buffer.
    let missing = CatalogOperation::Select {
        catalog: "missing".into(),
        schema: "main".into(),
        table: "t".into(),
        order_by: None,
    };
    let (status, _, errmsg) = execute(&missing);
    assert_eq!(status, 5);
    assert!(errmsg.unwrap().contains("select from 'missing.main.t'"));

    // Null and malformed envelopes never unwind across the boundary.
    let mut result: *const c_char = ptr::null();
    let mut errmsg: *const c_char = ptr::null();
    assert_eq!(
        unsafe { ferrolake_execute(ptr::null(), &mut result, &mut errmsg) },
        8
    );
    let garbage = CString::new("not an envelope").unwrap();
    assert_eq!(
        unsafe { ferrolake_execute(garbage.as_ptr(), &mut result, &mut errmsg) },
        8
    );
}
