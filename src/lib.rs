//! macOS filesystem change notifications.
//!
//! This crate bridges the FSEvents service to Rust:
//! - Event streams with explicit start/stop/flush lifecycle
//! - One shared native callback that routes batches by context token
//! - Decoding of native batches into owned, ordered [`Event`] records
//! - Device lookups and persisted checkpoints for resuming after a restart
//!
//! ```no_run
//! # #[cfg(target_os = "macos")]
//! # fn main() -> fsevents::Result<()> {
//! use std::time::Duration;
//!
//! use fsevents::{CreateFlags, EventStream, StreamConfig};
//!
//! let stream = EventStream::new(
//!     StreamConfig::new(["/tmp"])
//!         .with_flags(CreateFlags::FILE_EVENTS)
//!         .with_latency(Duration::from_millis(500)),
//! );
//! stream.start()?;
//! for batch in stream.events() {
//!     for event in batch {
//!         println!("{} {:?}", event.path, event.flags);
//!     }
//! }
//! # Ok(())
//! # }
//! # #[cfg(not(target_os = "macos"))]
//! # fn main() {}
//! ```

mod bridge;
pub mod checkpoint;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod flags;
pub mod marshal;
pub mod registry;
pub mod source;
pub mod stream;

// Re-export main types
pub use checkpoint::Checkpoint;
pub use config::StreamConfig;
pub use device::{
    current_event_id, device_for_path, device_uuid, event_id_for_device_before_time, DeviceId,
};
pub use error::{FsEventsError, PathFailure, Result};
pub use event::{Event, EventBatch};
pub use flags::{CreateFlags, EventFlags, EVENT_ID_SINCE_NOW};
pub use source::{EventSource, QueueRef, StreamRef, StreamRequest};
pub use stream::EventStream;

#[cfg(target_os = "macos")]
pub use source::CoreServices;
