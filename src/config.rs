//! Event stream configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::DeviceId;
use crate::error::{FsEventsError, Result};
use crate::flags::CreateFlags;

/// Settings fixed for the lifetime of one native stream.
///
/// Changing a config only affects the next `start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Paths to watch. Relative entries are resolved against the current
    /// directory, also when `device` is set; the native source always
    /// receives absolute paths.
    pub paths: Vec<String>,
    #[serde(default)]
    pub flags: CreateFlags,
    /// Minimum time the native source batches events for.
    #[serde(default)]
    pub latency: Duration,
    /// Restricts the watch to one volume. 0 watches by path only.
    #[serde(default)]
    pub device: DeviceId,
    /// Continue from the stream's recorded event id instead of "since now".
    #[serde(default)]
    pub resume: bool,
    /// Batches buffered before delivery blocks. 0 hands each batch over directly.
    #[serde(default)]
    pub channel_capacity: usize,
}

impl StreamConfig {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            flags: CreateFlags::empty(),
            latency: Duration::ZERO,
            device: 0,
            resume: false,
            channel_capacity: 0,
        }
    }

    pub fn with_flags(mut self, flags: CreateFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = device;
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Checks the settings that would make native stream creation fail.
    pub fn validate(&self) -> Result<()> {
        if self.paths.is_empty() {
            return Err(FsEventsError::InvalidConfig(
                "at least one path must be watched".to_string(),
            ));
        }
        Ok(())
    }
}
