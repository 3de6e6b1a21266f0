/*
 * lib.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Traghetto, a cross-platform file transfer client.
 *
 * Traghetto is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Traghetto is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Traghetto.  If not, see <http://www.gnu.org/licenses/>.
 */

//! C FFI for traghetto core. Engines are identified by opaque u64 handles.
//! Calls are blocking: each borrows the engine for the duration of the
//! transfer, so concurrent calls on one handle serialize. All string
//! parameters are UTF-8 NUL-terminated.

use libc::{c_char, c_int, size_t};
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use traghetto_core::protocol::http::{
    BufferWriter, FileTransferCommand, FileWriter, HttpControlSocket, RequestThrottler,
};
use traghetto_core::server::{Credentials, Server};
use traghetto_core::uri::Uri;

type Engine = Arc<Mutex<HttpControlSocket>>;

/// Registry of engines keyed by handle. Hosts the shared tokio runtime for
/// all transfer I/O and the process-wide throttler every engine shares.
struct Registry {
    runtime: tokio::runtime::Runtime,
    throttler: Arc<RequestThrottler>,
    engines: RwLock<HashMap<u64, Engine>>,
    engine_counter: AtomicU64,
}

fn registry() -> &'static Registry {
    static REGISTRY: once_cell::sync::OnceCell<Registry> = once_cell::sync::OnceCell::new();
    REGISTRY.get_or_init(|| {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("failed to create tokio runtime");
        Registry {
            runtime,
            throttler: Arc::new(RequestThrottler::new()),
            engines: RwLock::new(HashMap::new()),
            engine_counter: AtomicU64::new(1),
        }
    })
}

fn engine_for(handle: u64) -> Option<Engine> {
    registry()
        .engines
        .read()
        .ok()
        .and_then(|map| map.get(&handle).cloned())
}

fn ptr_to_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string()) }
}

thread_local! {
    static LAST_ERROR: std::cell::RefCell<Option<CString>> = std::cell::RefCell::new(None);
}

fn set_last_error(err: &dyn std::fmt::Display) {
    let msg = CString::new(err.to_string()).unwrap_or_else(|_| CString::new("(error)").unwrap());
    LAST_ERROR.with(|e| *e.borrow_mut() = Some(msg));
}

fn clear_last_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
}

/// Version string (static, do not free).
#[no_mangle]
pub extern "C" fn traghetto_version() -> *const c_char {
    b"0.1.0\0".as_ptr() as *const c_char
}

/// Last error message from a failed call. Valid until next FFI call. Do not free.
#[no_mangle]
pub extern "C" fn traghetto_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|s| s.as_ptr())
            .unwrap_or(ptr::null())
    })
}

/// Free a string returned by this library. No-op if ptr is NULL.
#[no_mangle]
pub unsafe extern "C" fn traghetto_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        let _ = CString::from_raw(ptr);
    }
}

/// Free a byte buffer returned by traghetto_engine_fetch. No-op if ptr is NULL.
#[no_mangle]
pub unsafe extern "C" fn traghetto_free_bytes(ptr: *mut u8, len: size_t) {
    if !ptr.is_null() {
        let _ = Vec::from_raw_parts(ptr, len, len);
    }
}

/// Create an engine. Returns its handle (never 0). Free with traghetto_engine_free.
#[no_mangle]
pub extern "C" fn traghetto_engine_new() -> u64 {
    let reg = registry();
    let handle = reg.engine_counter.fetch_add(1, Ordering::SeqCst);
    let engine = Arc::new(Mutex::new(HttpControlSocket::new(Arc::clone(
        &reg.throttler,
    ))));
    if let Ok(mut map) = reg.engines.write() {
        map.insert(handle, engine);
    }
    clear_last_error();
    handle
}

/// Destroy an engine, dropping any live connection. No-op for unknown handles.
#[no_mangle]
pub extern "C" fn traghetto_engine_free(handle: u64) {
    if let Ok(mut map) = registry().engines.write() {
        map.remove(&handle);
    }
}

/// Connect to host:port (secure != 0 for TLS). Reuses a matching live
/// connection. Returns 0 on success, -1 on error (see traghetto_last_error).
#[no_mangle]
pub extern "C" fn traghetto_engine_connect(
    handle: u64,
    host: *const c_char,
    port: u16,
    secure: c_int,
    user: *const c_char,
    password: *const c_char,
) -> c_int {
    let Some(host) = ptr_to_str(host) else {
        set_last_error(&"host is null or not valid UTF-8");
        return -1;
    };
    let credentials = match (ptr_to_str(user), ptr_to_str(password)) {
        (Some(u), Some(p)) => Credentials::new(u, p),
        _ => Credentials::anonymous(),
    };
    let Some(engine) = engine_for(handle) else {
        set_last_error(&"engine not found");
        return -1;
    };
    let server = Server::new(host, port, secure != 0);
    let mut engine = engine.lock().unwrap_or_else(|p| p.into_inner());
    match registry()
        .runtime
        .block_on(engine.connect(&server, &credentials))
    {
        Ok(()) => {
            clear_last_error();
            0
        }
        Err(e) => {
            set_last_error(&e);
            -1
        }
    }
}

/// Download url to dest_path, blocking until complete. Creates or truncates
/// the destination file. Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn traghetto_engine_download(
    handle: u64,
    url: *const c_char,
    dest_path: *const c_char,
) -> c_int {
    let (Some(url), Some(dest_path)) = (ptr_to_str(url), ptr_to_str(dest_path)) else {
        set_last_error(&"url or dest_path is null or not valid UTF-8");
        return -1;
    };
    let uri = match Uri::parse(&url) {
        Ok(uri) => uri,
        Err(e) => {
            set_last_error(&e);
            return -1;
        }
    };
    let writer = match FileWriter::create(&dest_path) {
        Ok(w) => w,
        Err(e) => {
            set_last_error(&e);
            return -1;
        }
    };
    let Some(engine) = engine_for(handle) else {
        set_last_error(&"engine not found");
        return -1;
    };
    let mut engine = engine.lock().unwrap_or_else(|p| p.into_inner());
    let command = FileTransferCommand {
        uri,
        writer: Box::new(writer),
        update_transfer_status: false,
    };
    match registry().runtime.block_on(engine.file_transfer(command)) {
        Ok(()) => {
            clear_last_error();
            0
        }
        Err(e) => {
            set_last_error(&e);
            -1
        }
    }
}

/// Fetch url into memory, blocking until complete. On success returns the
/// body (free with traghetto_free_bytes) and writes its length to out_len.
/// Returns NULL on error.
#[no_mangle]
pub extern "C" fn traghetto_engine_fetch(
    handle: u64,
    url: *const c_char,
    out_len: *mut size_t,
) -> *mut u8 {
    if out_len.is_null() {
        set_last_error(&"out_len is null");
        return ptr::null_mut();
    }
    let Some(url) = ptr_to_str(url) else {
        set_last_error(&"url is null or not valid UTF-8");
        return ptr::null_mut();
    };
    let uri = match Uri::parse(&url) {
        Ok(uri) => uri,
        Err(e) => {
            set_last_error(&e);
            return ptr::null_mut();
        }
    };
    let Some(engine) = engine_for(handle) else {
        set_last_error(&"engine not found");
        return ptr::null_mut();
    };
    let writer = BufferWriter::new();
    let body = writer.handle();
    let mut engine = engine.lock().unwrap_or_else(|p| p.into_inner());
    let command = FileTransferCommand {
        uri,
        writer: Box::new(writer),
        update_transfer_status: false,
    };
    match registry().runtime.block_on(engine.file_transfer(command)) {
        Ok(()) => {
            clear_last_error();
            let body = std::mem::take(&mut *body.lock().unwrap_or_else(|p| p.into_inner()));
            let mut body = body.into_boxed_slice();
            unsafe { *out_len = body.len() };
            let ptr = body.as_mut_ptr();
            std::mem::forget(body);
            ptr
        }
        Err(e) => {
            set_last_error(&e);
            ptr::null_mut()
        }
    }
}

/// 1 if the engine holds a live connection, 0 otherwise (including unknown handles).
#[no_mangle]
pub extern "C" fn traghetto_engine_is_connected(handle: u64) -> c_int {
    match engine_for(handle) {
        Some(engine) => {
            let engine = engine.lock().unwrap_or_else(|p| p.into_inner());
            engine.is_connected() as c_int
        }
        None => 0,
    }
}

/// Drop the engine's connection and abandon any queued work. Safe to call at
/// any time; the next operation reconnects.
#[no_mangle]
pub extern "C" fn traghetto_engine_disconnect(handle: u64) {
    if let Some(engine) = engine_for(handle) {
        let mut engine = engine.lock().unwrap_or_else(|p| p.into_inner());
        engine.disconnect();
    }
}

/// Milliseconds until requests to host may resume, 0 if not throttled.
/// The backoff table is process-wide, shared by every engine.
#[no_mangle]
pub extern "C" fn traghetto_throttle_remaining_ms(host: *const c_char) -> u64 {
    let Some(host) = ptr_to_str(host) else {
        return 0;
    };
    registry().throttler.get_throttle(&host).as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn engine_lifecycle() {
        let handle = traghetto_engine_new();
        assert_ne!(handle, 0);
        assert_eq!(traghetto_engine_is_connected(handle), 0);
        traghetto_engine_disconnect(handle);
        traghetto_engine_free(handle);
        assert_eq!(traghetto_engine_is_connected(handle), 0);
    }

    #[test]
    fn throttle_shared_across_handles() {
        registry()
            .throttler
            .throttle("ffi.example", std::time::Duration::from_secs(2));
        let host = CString::new("ffi.example").unwrap();
        assert!(traghetto_throttle_remaining_ms(host.as_ptr()) > 0);
    }

    #[test]
    fn null_arguments_fail_cleanly() {
        let handle = traghetto_engine_new();
        let rc = traghetto_engine_download(handle, ptr::null(), ptr::null());
        assert_eq!(rc, -1);
        let err = traghetto_last_error();
        assert!(!err.is_null());
        traghetto_engine_free(handle);
    }
}
