//! C entry points
//!
//! Every operation takes `error_out: *mut *mut c_char` last and returns
//! `*mut c_char`. Returned strings (results and errors) belong to the
//! library and must be released with [`dbx_string_free`].

use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;
use tokio::runtime::Runtime;

use super::codec::{self, clear_error, envelope, read_json, read_str, respond, set_error};
use crate::client::EventStoreClient;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::telemetry;

/// Opaque client handle owned by the caller between `dbx_client_new` and
/// `dbx_client_free`
pub struct DbxHandle {
    runtime: Runtime,
    client: EventStoreClient,
}

impl DbxHandle {
    fn open(config_json: *const c_char) -> StoreResult<Self> {
        let value = read_json(config_json, "config")?.unwrap_or(Value::Null);
        let config = StoreConfig::from_json(value)?;

        if config.log_filter.is_some() {
            telemetry::init_tracing(config.log_filter.as_deref(), config.log_json);
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("eventdbx-native")
            .build()
            .map_err(|e| StoreError::Internal(format!("failed to start runtime: {}", e)))?;

        tracing::info!(
            lock_timeout_ms = config.lock_timeout.as_millis() as u64,
            lock_retries = config.lock_retries,
            "Event store client opened"
        );

        Ok(Self {
            runtime,
            client: EventStoreClient::new(config),
        })
    }

    fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

fn handle_ref<'a>(handle: *mut DbxHandle) -> StoreResult<&'a DbxHandle> {
    if handle.is_null() {
        return Err(StoreError::Validation("handle is null".to_string()));
    }
    // SAFETY: non-null handles only come from `dbx_client_new` and stay
    // valid until `dbx_client_free`.
    Ok(unsafe { &*handle })
}

/// Optional string argument; null reads as empty
fn read_optional_str(ptr: *const c_char, field: &str) -> StoreResult<String> {
    if ptr.is_null() {
        return Ok(String::new());
    }
    read_str(ptr, field)
}

// =========================================================================
// Lifecycle
// =========================================================================

/// Open a client. `config_json` may be null or blank for defaults.
/// Returns null and sets `*error_out` on failure.
#[no_mangle]
pub extern "C" fn dbx_client_new(config_json: *const c_char, error_out: *mut *mut c_char) -> *mut DbxHandle {
    clear_error(error_out);

    match panic::catch_unwind(AssertUnwindSafe(|| DbxHandle::open(config_json))) {
        Ok(Ok(handle)) => Box::into_raw(Box::new(handle)),
        Ok(Err(err)) => {
            set_error(error_out, err.boundary_message());
            std::ptr::null_mut()
        }
        Err(_) => {
            set_error(error_out, "InternalError: panic while opening client");
            std::ptr::null_mut()
        }
    }
}

/// Release a client. Null is ignored.
#[no_mangle]
pub extern "C" fn dbx_client_free(handle: *mut DbxHandle) {
    if handle.is_null() {
        return;
    }
    // SAFETY: the pointer came from `Box::into_raw` in `dbx_client_new`
    // and is freed once.
    let handle = unsafe { Box::from_raw(handle) };
    let DbxHandle { runtime, client } = *handle;
    drop(client);
    runtime.shutdown_background();
}

/// Release a string returned by any `dbx_` function. Null is ignored.
#[no_mangle]
pub extern "C" fn dbx_string_free(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    // SAFETY: every string handed out was produced by `CString::into_raw`.
    unsafe {
        drop(std::ffi::CString::from_raw(ptr));
    }
}

// =========================================================================
// Aggregates
// =========================================================================

#[no_mangle]
pub extern "C" fn dbx_list_aggregates(
    handle: *mut DbxHandle,
    aggregate_type: *const c_char,
    options_json: *const c_char,
    error_out: *mut *mut c_char,
) -> *mut c_char {
    respond("list_aggregates", error_out, || {
        let handle = handle_ref(handle)?;
        let aggregate_type = read_optional_str(aggregate_type, "aggregate_type")?;
        let options = read_json(options_json, "options")?;

        let page = handle.block_on(handle.client.list_aggregates(&aggregate_type, options))?;
        codec::to_value(page)
    })
}

#[no_mangle]
pub extern "C" fn dbx_get_aggregate(
    handle: *mut DbxHandle,
    aggregate_type: *const c_char,
    aggregate_id: *const c_char,
    error_out: *mut *mut c_char,
) -> *mut c_char {
    respond("get_aggregate", error_out, || {
        let handle = handle_ref(handle)?;
        let aggregate_type = read_str(aggregate_type, "aggregate_type")?;
        let aggregate_id = read_str(aggregate_id, "aggregate_id")?;

        let view = handle.block_on(handle.client.get_aggregate(&aggregate_type, &aggregate_id))?;
        envelope("aggregate", view)
    })
}

#[no_mangle]
pub extern "C" fn dbx_select_aggregate(
    handle: *mut DbxHandle,
    aggregate_type: *const c_char,
    aggregate_id: *const c_char,
    fields_json: *const c_char,
    error_out: *mut *mut c_char,
) -> *mut c_char {
    respond("select_aggregate", error_out, || {
        let handle = handle_ref(handle)?;
        let aggregate_type = read_str(aggregate_type, "aggregate_type")?;
        let aggregate_id = read_str(aggregate_id, "aggregate_id")?;
        let fields = read_json(fields_json, "fields")?;

        let selection = handle.block_on(handle.client.select_aggregate(
            &aggregate_type,
            &aggregate_id,
            fields,
        ))?;
        envelope("selection", selection)
    })
}

/// Project state at `options.version` (default: current version)
#[no_mangle]
pub extern "C" fn dbx_project_aggregate(
    handle: *mut DbxHandle,
    aggregate_type: *const c_char,
    aggregate_id: *const c_char,
    options_json: *const c_char,
    error_out: *mut *mut c_char,
) -> *mut c_char {
    respond("project_aggregate", error_out, || {
        let handle = handle_ref(handle)?;
        let aggregate_type = read_str(aggregate_type, "aggregate_type")?;
        let aggregate_id = read_str(aggregate_id, "aggregate_id")?;
        let options = read_json(options_json, "options")?;

        let projected = handle.block_on(handle.client.project_aggregate(
            &aggregate_type,
            &aggregate_id,
            options,
        ))?;
        codec::to_value(projected)
    })
}

#[no_mangle]
pub extern "C" fn dbx_create_aggregate(
    handle: *mut DbxHandle,
    aggregate_type: *const c_char,
    aggregate_id: *const c_char,
    event_type: *const c_char,
    options_json: *const c_char,
    error_out: *mut *mut c_char,
) -> *mut c_char {
    respond("create_aggregate", error_out, || {
        let handle = handle_ref(handle)?;
        let aggregate_type = read_str(aggregate_type, "aggregate_type")?;
        let aggregate_id = read_str(aggregate_id, "aggregate_id")?;
        let event_type = read_str(event_type, "event_type")?;
        let options = read_json(options_json, "options")?;

        let view = handle.block_on(handle.client.create_aggregate(
            &aggregate_type,
            &aggregate_id,
            &event_type,
            options,
        ))?;
        envelope("aggregate", view)
    })
}

#[no_mangle]
pub extern "C" fn dbx_set_archive(
    handle: *mut DbxHandle,
    aggregate_type: *const c_char,
    aggregate_id: *const c_char,
    archived: bool,
    options_json: *const c_char,
    error_out: *mut *mut c_char,
) -> *mut c_char {
    respond("set_archive", error_out, || {
        let handle = handle_ref(handle)?;
        let aggregate_type = read_str(aggregate_type, "aggregate_type")?;
        let aggregate_id = read_str(aggregate_id, "aggregate_id")?;
        let options = read_json(options_json, "options")?;

        let record = handle.block_on(handle.client.set_archive(
            &aggregate_type,
            &aggregate_id,
            archived,
            options,
        ))?;
        envelope("aggregate", record)
    })
}

// =========================================================================
// Events
// =========================================================================

#[no_mangle]
pub extern "C" fn dbx_list_events(
    handle: *mut DbxHandle,
    aggregate_type: *const c_char,
    aggregate_id: *const c_char,
    options_json: *const c_char,
    error_out: *mut *mut c_char,
) -> *mut c_char {
    respond("list_events", error_out, || {
        let handle = handle_ref(handle)?;
        let aggregate_type = read_str(aggregate_type, "aggregate_type")?;
        let aggregate_id = read_str(aggregate_id, "aggregate_id")?;
        let options = read_json(options_json, "options")?;

        let page = handle.block_on(handle.client.list_events(&aggregate_type, &aggregate_id, options))?;
        codec::to_value(page)
    })
}

#[no_mangle]
pub extern "C" fn dbx_append_event(
    handle: *mut DbxHandle,
    aggregate_type: *const c_char,
    aggregate_id: *const c_char,
    event_type: *const c_char,
    options_json: *const c_char,
    error_out: *mut *mut c_char,
) -> *mut c_char {
    respond("append_event", error_out, || {
        let handle = handle_ref(handle)?;
        let aggregate_type = read_str(aggregate_type, "aggregate_type")?;
        let aggregate_id = read_str(aggregate_id, "aggregate_id")?;
        let event_type = read_str(event_type, "event_type")?;
        let options = read_json(options_json, "options")?;

        let event = handle.block_on(handle.client.append_event(
            &aggregate_type,
            &aggregate_id,
            &event_type,
            options,
        ))?;
        envelope("event", event)
    })
}

#[no_mangle]
pub extern "C" fn dbx_patch_event(
    handle: *mut DbxHandle,
    aggregate_type: *const c_char,
    aggregate_id: *const c_char,
    event_type: *const c_char,
    patch_json: *const c_char,
    options_json: *const c_char,
    error_out: *mut *mut c_char,
) -> *mut c_char {
    respond("patch_event", error_out, || {
        let handle = handle_ref(handle)?;
        let aggregate_type = read_str(aggregate_type, "aggregate_type")?;
        let aggregate_id = read_str(aggregate_id, "aggregate_id")?;
        let event_type = read_str(event_type, "event_type")?;
        let patch = read_json(patch_json, "patch")?;
        let options = read_json(options_json, "options")?;

        let event = handle.block_on(handle.client.patch_event(
            &aggregate_type,
            &aggregate_id,
            &event_type,
            patch,
            options,
        ))?;
        envelope("event", event)
    })
}

// =========================================================================
// Verification
// =========================================================================

#[no_mangle]
pub extern "C" fn dbx_verify_aggregate(
    handle: *mut DbxHandle,
    aggregate_type: *const c_char,
    aggregate_id: *const c_char,
    error_out: *mut *mut c_char,
) -> *mut c_char {
    respond("verify_aggregate", error_out, || {
        let handle = handle_ref(handle)?;
        let aggregate_type = read_str(aggregate_type, "aggregate_type")?;
        let aggregate_id = read_str(aggregate_id, "aggregate_id")?;

        let report = handle.block_on(handle.client.verify_aggregate(&aggregate_type, &aggregate_id))?;
        codec::to_value(report)
    })
}

// =========================================================================
// Snapshots
// =========================================================================

#[no_mangle]
pub extern "C" fn dbx_create_snapshot(
    handle: *mut DbxHandle,
    aggregate_type: *const c_char,
    aggregate_id: *const c_char,
    options_json: *const c_char,
    error_out: *mut *mut c_char,
) -> *mut c_char {
    respond("create_snapshot", error_out, || {
        let handle = handle_ref(handle)?;
        let aggregate_type = read_str(aggregate_type, "aggregate_type")?;
        let aggregate_id = read_str(aggregate_id, "aggregate_id")?;
        let options = read_json(options_json, "options")?;

        let snapshot = handle.block_on(handle.client.create_snapshot(
            &aggregate_type,
            &aggregate_id,
            options,
        ))?;
        envelope("snapshot", snapshot)
    })
}

#[no_mangle]
pub extern "C" fn dbx_list_snapshots(
    handle: *mut DbxHandle,
    options_json: *const c_char,
    error_out: *mut *mut c_char,
) -> *mut c_char {
    respond("list_snapshots", error_out, || {
        let handle = handle_ref(handle)?;
        let options = read_json(options_json, "options")?;

        let page = handle.block_on(handle.client.list_snapshots(options))?;
        codec::to_value(page)
    })
}

#[no_mangle]
pub extern "C" fn dbx_get_snapshot(
    handle: *mut DbxHandle,
    snapshot_id: u64,
    options_json: *const c_char,
    error_out: *mut *mut c_char,
) -> *mut c_char {
    respond("get_snapshot", error_out, || {
        let handle = handle_ref(handle)?;
        let options = read_json(options_json, "options")?;

        let snapshot = handle.block_on(handle.client.get_snapshot(snapshot_id, options))?;
        envelope("snapshot", snapshot)
    })
}
