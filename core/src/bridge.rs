//! The C bridge.
//!
//! Host-facing entry points over the process-wide engine, restricted to
//! primitive types: NUL-terminated byte buffers, integers, and function
//! pointers. Nothing here exposes (or accepts) a composite type owned by
//! either side, so a foreign host can drive the engine without sharing any
//! declarations with it.
//!
//! Failure contract: no call ever unwinds across the boundary. Every entry
//! point returns a status code; on failure the error message out-parameter
//! points into a thread-local buffer that stays valid until the next bridge
//! call on the same thread. The safe functions the extern wrappers delegate
//! to are also what the in-process host adapter calls directly.
//!
//! Reverse callbacks use an explicit registration table: the host registers
//! named function pointers at startup and engine-side code resolves them by
//! name, instead of anyone scanning the process image for symbols.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{CStr, CString, c_char};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;

use crate::EngineConfig;
use crate::engine::EngineInstance;
use crate::engine::extension;
use crate::engine::manager;
use crate::error::{ErrorKind, LakeError, LakeResult};

/// Bumped whenever the set of bridge entry points or their contracts change.
pub const BRIDGE_API_VERSION: u32 = 1;

pub const STATUS_OK: i32 = 0;

/// Signature every registered host callback must have. The argument and
/// return value are opaque to the engine; their meaning is part of the
/// callback's documented name.
pub type HostCallback = extern "C" fn(arg: i64) -> i64;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
    static LAST_RESULT: RefCell<Option<CString>> = const { RefCell::new(None) };
}

lazy_static! {
    static ref HOST_CALLBACKS: RwLock<HashMap<String, HostCallback>> = RwLock::new(HashMap::new());
}

fn status_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::NotReady => 1,
        ErrorKind::LoadFailure => 2,
        ErrorKind::DuplicateRegistration => 3,
        ErrorKind::UnknownBackend => 4,
        ErrorKind::NotFound => 5,
        ErrorKind::Conflict => 6,
        ErrorKind::BackendUnavailable => 7,
        ErrorKind::Internal => 8,
    }
}

fn store_error(message: &str, errmsg_out: *mut *const c_char) {
    let cstring =
        CString::new(message.replace('\0', " ")).unwrap_or_else(|_| CString::new("error").unwrap());
    LAST_ERROR.with(|slot| {
        let ptr = cstring.as_ptr();
        *slot.borrow_mut() = Some(cstring);
        if !errmsg_out.is_null() {
            unsafe { *errmsg_out = ptr };
        }
    });
}

fn store_result(message: &str, result_out: *mut *const c_char) {
    let cstring =
        CString::new(message.replace('\0', " ")).unwrap_or_else(|_| CString::new("{}").unwrap());
    LAST_RESULT.with(|slot| {
        let ptr = cstring.as_ptr();
        *slot.borrow_mut() = Some(cstring);
        if !result_out.is_null() {
            unsafe { *result_out = ptr };
        }
    });
}

fn fail(err: &LakeError, errmsg_out: *mut *const c_char) -> i32 {
    store_error(&err.to_string(), errmsg_out);
    status_code(err.kind())
}

unsafe fn read_cstr<'a>(ptr: *const c_char, what: &str) -> LakeResult<&'a str> {
    if ptr.is_null() {
        return Err(LakeError::Internal(format!("{what} pointer is null")));
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| LakeError::Internal(format!("{what} is not valid UTF-8")))
}

/// Run `f` with panics converted to `Internal`, so nothing unwinds across
/// the C boundary.
fn contained<T>(f: impl FnOnce() -> LakeResult<T>) -> LakeResult<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => Err(LakeError::Internal("panic at bridge boundary".into())),
    }
}

// Safe internal API. The extern "C" wrappers below and the in-process host
// adapter both go through these.

/// Configure and (if needed) construct the process-wide engine.
pub fn ensure_ready(config: &EngineConfig) -> LakeResult<Arc<EngineInstance>> {
    let mgr = manager::global();
    mgr.configure(config.clone())?;
    mgr.get_or_create()
}

/// Load a built-in extension into the engine. Idempotent; fails with
/// `NotReady` only when the engine instance has not been constructed yet.
pub fn ensure_extension_loaded(name: &str) -> LakeResult<()> {
    let mgr = manager::global();
    let engine = mgr.try_instance()?;
    let ext = extension::builtin(name).ok_or_else(|| LakeError::LoadFailure {
        name: name.to_string(),
        reason: "no such built-in extension".into(),
    })?;
    mgr.ensure_extension_loaded(&engine, ext.as_ref())
}

/// Execute a JSON operation envelope against the process-wide engine.
pub fn execute_envelope(envelope: &str) -> LakeResult<String> {
    let engine = manager::global().try_instance()?;
    engine.execute_envelope(envelope)
}

pub fn register_host_callback(name: &str, callback: HostCallback) -> LakeResult<()> {
    let mut callbacks = HOST_CALLBACKS.write();
    if callbacks.contains_key(name) {
        return Err(LakeError::DuplicateRegistration(name.to_string()));
    }
    callbacks.insert(name.to_string(), callback);
    Ok(())
}

pub fn resolve_host_callback(name: &str) -> Option<HostCallback> {
    HOST_CALLBACKS.read().get(name).copied()
}

// extern "C" surface.

#[unsafe(no_mangle)]
pub extern "C" fn ferrolake_bridge_version() -> u32 {
    BRIDGE_API_VERSION
}

/// Construct the engine with the given data directory (idempotent once
/// constructed with the same directory). Returns 0 on success; on failure
/// writes a message pointer valid until the next bridge call on this thread.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ferrolake_open(
    data_dir: *const c_char,
    errmsg_out: *mut *const c_char,
) -> i32 {
    let result = contained(|| {
        let dir = unsafe { read_cstr(data_dir, "data directory") }?;
        let config = EngineConfig {
            data_dir: PathBuf::from(dir),
            ..EngineConfig::default()
        };
        ensure_ready(&config).map(|_| ())
    });
    match result {
        Ok(()) => STATUS_OK,
        Err(e) => fail(&e, errmsg_out),
    }
}

/// Idempotent extension load. Fails with the `NotReady` status if
/// `ferrolake_open` has not succeeded yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ferrolake_ensure_extension_loaded(
    name: *const c_char,
    errmsg_out: *mut *const c_char,
) -> i32 {
    let result = contained(|| {
        let name = unsafe { read_cstr(name, "extension name") }?;
        ensure_extension_loaded(name)
    });
    match result {
        Ok(()) => STATUS_OK,
        Err(e) => fail(&e, errmsg_out),
    }
}

/// Execute a JSON operation envelope. On success `result_out` receives the
/// JSON output; on failure `errmsg_out` receives the message. Both point
/// into thread-local buffers reused by the next call on the same thread.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ferrolake_execute(
    envelope: *const c_char,
    result_out: *mut *const c_char,
    errmsg_out: *mut *const c_char,
) -> i32 {
    let result = contained(|| {
        let envelope = unsafe { read_cstr(envelope, "operation envelope") }?;
        execute_envelope(envelope)
    });
    match result {
        Ok(output) => {
            store_result(&output, result_out);
            STATUS_OK
        }
        Err(e) => fail(&e, errmsg_out),
    }
}

/// Register a named host callback. Names must be unique for the process
/// lifetime; re-registering is an error.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ferrolake_register_host_callback(
    name: *const c_char,
    callback: HostCallback,
    errmsg_out: *mut *const c_char,
) -> i32 {
    let result = contained(|| {
        let name = unsafe { read_cstr(name, "callback name") }?;
        register_host_callback(name, callback)
    });
    match result {
        Ok(()) => STATUS_OK,
        Err(e) => fail(&e, errmsg_out),
    }
}

/// Resolve a previously registered host callback, or null if absent.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ferrolake_resolve_host_callback(
    name: *const c_char,
) -> Option<HostCallback> {
    contained(|| {
        let name = unsafe { read_cstr(name, "callback name") }?;
        Ok(resolve_host_callback(name))
    })
    .ok()
    .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    extern "C" fn session_id(_arg: i64) -> i64 {
        42
    }

    extern "C" fn other(_arg: i64) -> i64 {
        7
    }

    #[test]
    fn test_callback_table_register_and_resolve() {
        register_host_callback("test.session_id", session_id).unwrap();
        let cb = resolve_host_callback("test.session_id").unwrap();
        assert_eq!(cb(0), 42);

        let err = register_host_callback("test.session_id", other).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateRegistration);
        // First registration keeps winning.
        assert_eq!(resolve_host_callback("test.session_id").unwrap()(0), 42);

        assert!(resolve_host_callback("test.unregistered").is_none());
    }

    #[test]
    fn test_callback_resolution_via_c_surface() {
        register_host_callback("test.durability_position", session_id).unwrap();
        let name = CString::new("test.durability_position").unwrap();
        let cb = unsafe { ferrolake_resolve_host_callback(name.as_ptr()) }.unwrap();
        assert_eq!(cb(1), 42);

        assert!(unsafe { ferrolake_resolve_host_callback(std::ptr::null()) }.is_none());
    }

    #[test]
    fn test_bridge_version() {
        assert_eq!(ferrolake_bridge_version(), BRIDGE_API_VERSION);
    }
}
