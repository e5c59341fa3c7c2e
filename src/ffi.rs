//! FFI bindings for the HCI task timer
//!
//! This module exposes the recorder and sequencer through C-compatible
//! functions so a native mobile UI can drive them. All functions use C strings
//! (null-terminated). Strings returned by this module are allocated here and
//! must be freed by the caller using `hci_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::recorder::SessionRecorder;
use crate::sequencer::TaskSequencer;
use crate::storage::ResultStore;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

// ============================================================================
// Session Recorder
// ============================================================================

/// Opaque handle to a SessionRecorder
pub struct RecorderHandle {
    recorder: SessionRecorder,
}

/// Create a recorder for a participant.
///
/// # Safety
/// - `participant_id` must be a valid null-terminated C string.
/// - Must be freed with `hci_recorder_free`.
/// - Returns NULL on error; call `hci_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn hci_recorder_new(participant_id: *const c_char) -> *mut RecorderHandle {
    clear_last_error();

    let participant = match cstr_to_string(participant_id) {
        Some(s) => s,
        None => {
            set_last_error("Invalid participant id pointer");
            return ptr::null_mut();
        }
    };

    match SessionRecorder::create(participant) {
        Ok(recorder) => Box::into_raw(Box::new(RecorderHandle { recorder })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a recorder.
///
/// # Safety
/// - `recorder` must be a valid pointer returned by `hci_recorder_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn hci_recorder_free(recorder: *mut RecorderHandle) {
    if !recorder.is_null() {
        drop(Box::from_raw(recorder));
    }
}

/// Append one task result. `status` is `"COMPLETE"` or `"GIVE_UP"`.
///
/// # Safety
/// - `recorder` must be a valid pointer returned by `hci_recorder_new`.
/// - `status` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error (recorded results are unchanged).
#[no_mangle]
pub unsafe extern "C" fn hci_recorder_record(
    recorder: *mut RecorderHandle,
    duration_millis: i64,
    status: *const c_char,
) -> i32 {
    clear_last_error();

    if recorder.is_null() {
        set_last_error("Null recorder pointer");
        return -1;
    }
    let handle = &mut *recorder;

    let status = match cstr_to_string(status) {
        Some(s) => s,
        None => {
            set_last_error("Invalid status string pointer");
            return -1;
        }
    };

    match handle.recorder.record_raw(duration_millis, &status) {
        Ok(_) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Number of recorded results, or -1 for a null handle.
///
/// # Safety
/// - `recorder` must be a valid pointer returned by `hci_recorder_new`, or NULL.
#[no_mangle]
pub unsafe extern "C" fn hci_recorder_len(recorder: *const RecorderHandle) -> i64 {
    if recorder.is_null() {
        return -1;
    }
    i64::try_from((*recorder).recorder.len()).unwrap_or(i64::MAX)
}

/// Serialize the results document.
///
/// # Safety
/// - `recorder` must be a valid pointer returned by `hci_recorder_new`.
/// - Returns a newly allocated string that must be freed with `hci_free_string`.
/// - Returns NULL on error; call `hci_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn hci_recorder_to_json(recorder: *const RecorderHandle) -> *mut c_char {
    clear_last_error();

    if recorder.is_null() {
        set_last_error("Null recorder pointer");
        return ptr::null_mut();
    }

    match (*recorder).recorder.to_json_string() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Write the results document under `documents_root` and return the written
/// file path.
///
/// # Safety
/// - `recorder` must be a valid pointer returned by `hci_recorder_new`.
/// - `documents_root` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `hci_free_string`.
/// - Returns NULL on error; call `hci_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn hci_recorder_export(
    recorder: *const RecorderHandle,
    documents_root: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if recorder.is_null() {
        set_last_error("Null recorder pointer");
        return ptr::null_mut();
    }

    let root = match cstr_to_string(documents_root) {
        Some(s) => s,
        None => {
            set_last_error("Invalid documents root pointer");
            return ptr::null_mut();
        }
    };

    let store = ResultStore::new(root);
    match (*recorder).recorder.export_to_storage(&store) {
        Ok(path) => string_to_cstr(&path.to_string_lossy()),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Task Sequencer
// ============================================================================

/// Opaque handle to a TaskSequencer
pub struct SequencerHandle {
    sequencer: TaskSequencer,
}

/// Create a sequencer with no round selected. Free it with `hci_sequencer_free`.
#[no_mangle]
pub extern "C" fn hci_sequencer_new() -> *mut SequencerHandle {
    clear_last_error();
    Box::into_raw(Box::new(SequencerHandle {
        sequencer: TaskSequencer::new(),
    }))
}

/// Free a sequencer.
///
/// # Safety
/// - `sequencer` must be a valid pointer returned by `hci_sequencer_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn hci_sequencer_free(sequencer: *mut SequencerHandle) {
    if !sequencer.is_null() {
        drop(Box::from_raw(sequencer));
    }
}

/// Select a round (0, 1 or 2) and rewind to its first task.
///
/// # Safety
/// - `sequencer` must be a valid pointer returned by `hci_sequencer_new`.
/// - Returns 0 on success, -1 on error (sequencer state unchanged).
#[no_mangle]
pub unsafe extern "C" fn hci_sequencer_select_round(sequencer: *mut SequencerHandle, round: i32) -> i32 {
    clear_last_error();

    if sequencer.is_null() {
        set_last_error("Null sequencer pointer");
        return -1;
    }
    let handle = &mut *sequencer;

    let round = match usize::try_from(round) {
        Ok(r) => r,
        Err(_) => {
            set_last_error(&format!("Invalid round index {round}"));
            return -1;
        }
    };

    match handle.sequencer.select_round(round) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Current prompt as JSON (`{"round","index","text","screenshot"}`).
///
/// # Safety
/// - `sequencer` must be a valid pointer returned by `hci_sequencer_new`.
/// - Returns a newly allocated string that must be freed with `hci_free_string`.
/// - Returns NULL when the round has no more tasks; call `hci_last_error`.
#[no_mangle]
pub unsafe extern "C" fn hci_sequencer_current_prompt(sequencer: *const SequencerHandle) -> *mut c_char {
    clear_last_error();

    if sequencer.is_null() {
        set_last_error("Null sequencer pointer");
        return ptr::null_mut();
    }

    let prompt = match (*sequencer).sequencer.current_prompt() {
        Ok(p) => p,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    match serde_json::to_string(&prompt) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Move to the next task.
///
/// # Safety
/// - `sequencer` must be a valid pointer returned by `hci_sequencer_new`, or NULL.
#[no_mangle]
pub unsafe extern "C" fn hci_sequencer_advance(sequencer: *mut SequencerHandle) {
    if !sequencer.is_null() {
        (*sequencer).sequencer.advance();
    }
}

/// 1 if the active round has no more tasks, 0 otherwise, -1 for a null handle.
///
/// # Safety
/// - `sequencer` must be a valid pointer returned by `hci_sequencer_new`, or NULL.
#[no_mangle]
pub unsafe extern "C" fn hci_sequencer_is_round_complete(sequencer: *const SequencerHandle) -> i32 {
    if sequencer.is_null() {
        return -1;
    }
    i32::from((*sequencer).sequencer.is_round_complete())
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by this library.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by an `hci_` function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn hci_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next `hci_` call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn hci_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn hci_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
