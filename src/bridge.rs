//! The native callback entry point.
//!
//! Every stream registers the same `extern "C"` function. It runs on the
//! stream's dispatch queue, looks the owner up by context token, decodes
//! the parallel native arrays and hands the whole batch to the owner.

use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::slice;
use std::sync::LazyLock;

use crate::event::{Event, EventBatch};
use crate::flags::EventFlags;
use crate::registry::{ContextToken, Registry};
use crate::stream::Publisher;

/// Streams currently started, keyed by the token in their native context.
pub(crate) static ACTIVE_STREAMS: LazyLock<Registry<Publisher>> = LazyLock::new(Registry::new);

/// Callback registered with every native stream.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub(crate) extern "C" fn native_callback(
    _stream_ref: *mut c_void,
    client_callback_info: *mut c_void,
    num_events: usize,
    event_paths: *mut c_void,
    event_flags: *const u32,
    event_ids: *const u64,
) {
    let token = ContextToken::from_info(client_callback_info);
    contain(token, num_events, || unsafe {
        deliver(
            token,
            num_events,
            event_paths as *const *const c_char,
            event_flags,
            event_ids,
        )
    });
}

/// Runs one delivery, logging a panic instead of letting it unwind.
///
/// Unwinding into the native runtime is undefined behavior.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn contain(token: ContextToken, count: usize, delivery: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(delivery)).is_err() {
        log::error!("panic while delivering {count} event(s) for stream {token}");
    }
}

/// Decodes one native batch and publishes it to the stream registered under `token`.
///
/// # Safety
/// Each array must be null or point to `count` readable elements, and every
/// non-null path must be NUL-terminated.
unsafe fn deliver(
    token: ContextToken,
    count: usize,
    paths: *const *const c_char,
    flags: *const u32,
    ids: *const u64,
) {
    let Some(publisher) = ACTIVE_STREAMS.get(token) else {
        log::warn!("dropping {count} event(s) for unregistered stream {token}");
        return;
    };
    let batch = decode_batch(count, paths, flags, ids);
    publisher.publish(batch);
}

/// Pairs the i-th path, flag word and id of a native batch into events.
///
/// A null path decodes to an empty string. A null array yields an empty batch.
///
/// # Safety
/// Each array must be null or point to `count` readable elements, and every
/// non-null path must be NUL-terminated.
pub unsafe fn decode_batch(
    count: usize,
    paths: *const *const c_char,
    flags: *const u32,
    ids: *const u64,
) -> EventBatch {
    if count == 0 {
        return Vec::new();
    }
    if paths.is_null() || flags.is_null() || ids.is_null() {
        log::warn!("native batch of {count} event(s) is missing an array");
        return Vec::new();
    }

    let paths = slice::from_raw_parts(paths, count);
    let flags = slice::from_raw_parts(flags, count);
    let ids = slice::from_raw_parts(ids, count);

    paths
        .iter()
        .zip(flags)
        .zip(ids)
        .map(|((&path, &flags), &id)| Event {
            path: decode_path(path),
            flags: EventFlags::from_native(flags),
            id,
        })
        .collect()
}

unsafe fn decode_path(path: *const c_char) -> String {
    if path.is_null() {
        return String::new();
    }
    CStr::from_ptr(path).to_string_lossy().into_owned()
}
