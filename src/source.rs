//! The contract with the native event source.
//!
//! [`EventSource`] lists the calls the stream lifecycle makes, in the shape
//! FSEvents and libdispatch expose them. [`CoreServices`] is the real
//! implementation on macOS.

#[cfg(target_os = "macos")]
mod core_services;
#[cfg(test)]
pub(crate) mod fake;

use std::time::Duration;

use crate::device::DeviceId;
use crate::error::Result;
use crate::flags::CreateFlags;
use crate::registry::ContextToken;

#[cfg(target_os = "macos")]
pub use core_services::CoreServices;

/// A native stream handle.
///
/// Not `Clone`: the single value is consumed by [`EventSource::release_stream`].
#[derive(Debug, PartialEq, Eq)]
pub struct StreamRef(usize);

impl StreamRef {
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> usize {
        self.0
    }
}

/// A native dispatch queue handle, consumed by [`EventSource::release_queue`].
#[derive(Debug, PartialEq, Eq)]
pub struct QueueRef(usize);

impl QueueRef {
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> usize {
        self.0
    }
}

/// Arguments for creating one native stream.
#[derive(Debug, Clone, Copy)]
pub struct StreamRequest<'a> {
    /// Absolute paths, or volume-relative paths when `device` is non-zero.
    pub paths: &'a [String],
    /// Passed back to the callback bridge with every batch.
    pub context: ContextToken,
    /// First event id to report, or [`crate::EVENT_ID_SINCE_NOW`].
    pub since: u64,
    pub latency: Duration,
    pub flags: CreateFlags,
    /// Non-zero selects the device-relative creation variant.
    pub device: DeviceId,
}

/// Calls into the OS event source.
///
/// Setup order is create, bind queue, start; teardown is stop, invalidate,
/// release stream, release queue. Introspection calls have no side effects.
pub trait EventSource: Send + Sync {
    fn create_stream(&self, request: &StreamRequest<'_>) -> Result<StreamRef>;

    fn create_queue(&self, label: &str) -> Result<QueueRef>;

    fn set_dispatch_queue(&self, stream: &StreamRef, queue: &QueueRef);

    /// Returns `false` if the native source refused to start delivery.
    fn start(&self, stream: &StreamRef) -> bool;

    fn stop(&self, stream: &StreamRef);

    fn invalidate(&self, stream: &StreamRef);

    fn release_stream(&self, stream: StreamRef);

    fn release_queue(&self, queue: QueueRef);

    /// Blocks until buffered events have been delivered.
    fn flush_sync(&self, stream: &StreamRef);

    /// Schedules delivery of buffered events and returns the last id that
    /// will be delivered.
    fn flush_async(&self, stream: &StreamRef) -> u64;

    fn latest_event_id(&self, stream: &StreamRef) -> u64;

    /// Latest id issued on the whole system.
    fn current_event_id(&self) -> u64;

    fn device_being_watched(&self, stream: &StreamRef) -> DeviceId;

    fn copy_description(&self, stream: &StreamRef) -> String;

    fn copy_paths_being_watched(&self, stream: &StreamRef) -> Vec<String>;

    /// `None` when the source has no UUID for the device.
    fn uuid_for_device(&self, device: DeviceId) -> Option<String>;

    /// `absolute_time` is seconds since 2001-01-01T00:00:00Z.
    fn last_event_id_for_device_before_time(&self, device: DeviceId, absolute_time: f64) -> u64;
}
