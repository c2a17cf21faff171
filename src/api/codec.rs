//! Boundary codec
//!
//! Conversions between C strings and Rust values, and the mapping from an
//! operation's [`Outcome`] onto the `(result, error_out)` pointer pair:
//!
//! | outcome | return  | `*error_out` |
//! |---------|---------|--------------|
//! | data    | JSON    | null         |
//! | no data | null    | null         |
//! | error   | null    | message      |

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::client::Outcome;
use crate::error::{ErrorKind, StoreError, StoreResult};

/// Store a message in `*out`. A message with an interior NUL is truncated
/// at the NUL.
pub(crate) fn set_error(out: *mut *mut c_char, message: impl Into<String>) {
    if out.is_null() {
        return;
    }
    let mut bytes = message.into().into_bytes();
    if let Some(nul) = bytes.iter().position(|b| *b == 0) {
        bytes.truncate(nul);
    }
    let cstring = CString::new(bytes).unwrap_or_default();
    // SAFETY: `out` is non-null and points to caller-owned storage for one pointer.
    unsafe {
        *out = cstring.into_raw();
    }
}

pub(crate) fn clear_error(out: *mut *mut c_char) {
    if out.is_null() {
        return;
    }
    // SAFETY: as in `set_error`.
    unsafe {
        *out = std::ptr::null_mut();
    }
}

/// Read a required string argument
pub(crate) fn read_str(ptr: *const c_char, field: &str) -> StoreResult<String> {
    if ptr.is_null() {
        return Err(StoreError::Validation(format!("{} is null", field)));
    }
    // SAFETY: non-null; the caller guarantees a NUL-terminated string that
    // outlives this call.
    let raw = unsafe { CStr::from_ptr(ptr) };
    raw.to_str()
        .map(str::to_owned)
        .map_err(|e| StoreError::Validation(format!("{} is not valid UTF-8: {}", field, e)))
}

/// Read an optional JSON argument. Null and blank text are absent.
pub(crate) fn read_json(ptr: *const c_char, field: &'static str) -> StoreResult<Option<Value>> {
    if ptr.is_null() {
        return Ok(None);
    }
    // SAFETY: as in `read_str`.
    let raw = unsafe { CStr::from_ptr(ptr) };
    let text = raw.to_str().map_err(|e| StoreError::parse(field, e))?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(text)
        .map(Some)
        .map_err(|e| StoreError::parse(field, e))
}

/// `{ key: value }`
pub(crate) fn envelope(key: &str, value: impl Serialize) -> StoreResult<Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), serde_json::to_value(value)?);
    Ok(Value::Object(map))
}

pub(crate) fn to_value(value: impl Serialize) -> StoreResult<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Hand a JSON value to the caller as an owned C string
fn into_c_string(value: &Value) -> Result<*mut c_char, String> {
    let text = serde_json::to_string(value).map_err(|e| e.to_string())?;
    CString::new(text)
        .map(CString::into_raw)
        .map_err(|e| format!("result contains NUL byte: {}", e))
}

/// Run one boundary call: clear `error_out`, catch panics, and encode the
/// three-way outcome.
pub(crate) fn respond<F>(operation: &'static str, error_out: *mut *mut c_char, call: F) -> *mut c_char
where
    F: FnOnce() -> StoreResult<Value>,
{
    clear_error(error_out);

    let outcome: Outcome<Value> = match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result.into(),
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            tracing::error!(operation, reason = %reason, "Panic caught at C boundary");
            set_error(error_out, format!("{}: {} panicked: {}", ErrorKind::Internal, operation, reason));
            return std::ptr::null_mut();
        }
    };

    match outcome {
        Outcome::Data(value) => match into_c_string(&value) {
            Ok(ptr) => ptr,
            Err(err) => {
                set_error(error_out, format!("{}: {}", ErrorKind::Internal, err));
                std::ptr::null_mut()
            }
        },
        Outcome::NoData => std::ptr::null_mut(),
        Outcome::Error(err) => {
            if matches!(err.kind(), ErrorKind::Storage | ErrorKind::Internal) {
                tracing::error!(operation, error = %err, "Operation failed");
            } else {
                tracing::debug!(operation, error = %err, "Operation rejected");
            }
            set_error(error_out, err.boundary_message());
            std::ptr::null_mut()
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn take_string(ptr: *mut c_char) -> Option<String> {
        if ptr.is_null() {
            return None;
        }
        let owned = unsafe { CString::from_raw(ptr) };
        Some(owned.into_string().unwrap())
    }

    #[test]
    fn test_read_json_absent_and_blank() {
        assert!(read_json(std::ptr::null(), "options").unwrap().is_none());
        let blank = CString::new("   ").unwrap();
        assert!(read_json(blank.as_ptr(), "options").unwrap().is_none());
    }

    #[test]
    fn test_read_json_malformed_is_parse_error() {
        let bad = CString::new("{ not json").unwrap();
        let err = read_json(bad.as_ptr(), "options").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_respond_three_ways() {
        let mut error: *mut c_char = std::ptr::null_mut();

        let data = respond("test", &mut error, || Ok(json!({ "ok": true })));
        assert_eq!(take_string(data).unwrap(), r#"{"ok":true}"#);
        assert!(error.is_null());

        let none = respond("test", &mut error, || {
            Err(StoreError::aggregate_not_found("order", "A1"))
        });
        assert!(none.is_null());
        assert!(error.is_null());

        let failed = respond("test", &mut error, || {
            Err(StoreError::Validation("bad".to_string()))
        });
        assert!(failed.is_null());
        assert!(take_string(error).unwrap().starts_with("ValidationError: "));
    }

    #[test]
    fn test_respond_catches_panics() {
        let mut error: *mut c_char = std::ptr::null_mut();
        let result = respond("test", &mut error, || -> StoreResult<Value> {
            panic!("boom");
        });
        assert!(result.is_null());
        let message = take_string(error).unwrap();
        assert!(message.starts_with("InternalError: "));
        assert!(message.contains("boom"));
    }

    #[test]
    fn test_set_error_truncates_at_nul() {
        let mut error: *mut c_char = std::ptr::null_mut();
        set_error(&mut error, "before\0after");
        assert_eq!(take_string(error).unwrap(), "before");
    }
}
