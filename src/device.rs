//! Storage device lookups used to scope and resume watches.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::source::EventSource;

/// A `dev_t`. Only stable within one boot; use [`device_uuid`] to persist.
pub type DeviceId = i32;

/// Returns the device containing `path`.
#[cfg(unix)]
pub fn device_for_path(path: impl AsRef<Path>) -> Result<DeviceId> {
    use std::os::unix::fs::MetadataExt;

    let metadata = fs::metadata(path.as_ref())?;
    // dev_t is 32 bits on macOS; MetadataExt widens it.
    Ok(metadata.dev() as DeviceId)
}

#[cfg(not(unix))]
pub fn device_for_path(path: impl AsRef<Path>) -> Result<DeviceId> {
    fs::metadata(path.as_ref())?;
    Err(crate::error::FsEventsError::Unsupported(
        "device ids are only available on unix targets".to_string(),
    ))
}

/// Durable UUID for `device`, or `None` if the source has none (stale or zero id).
pub fn device_uuid(source: &dyn EventSource, device: DeviceId) -> Option<String> {
    if device == 0 {
        return None;
    }
    source.uuid_for_device(device)
}

/// Last event id recorded for `device` at or before `before`.
pub fn event_id_for_device_before_time(
    source: &dyn EventSource,
    device: DeviceId,
    before: DateTime<Utc>,
) -> u64 {
    source.last_event_id_for_device_before_time(device, absolute_time(before))
}

/// Latest event id issued system-wide.
pub fn current_event_id(source: &dyn EventSource) -> u64 {
    source.current_event_id()
}

/// Unix timestamp of the CoreFoundation reference date, 2001-01-01T00:00:00Z.
const CF_REFERENCE_UNIX_SECS: i64 = 978_307_200;

/// Converts `time` to a CFAbsoluteTime.
pub fn absolute_time(time: DateTime<Utc>) -> f64 {
    let micros = time.timestamp_micros() - CF_REFERENCE_UNIX_SECS * 1_000_000;
    micros as f64 / 1_000_000.0
}
