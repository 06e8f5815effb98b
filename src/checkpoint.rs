//! Persisted resumption checkpoints.
//!
//! An event id only means something together with the volume it came
//! from, and device ids can be reassigned between boots. A checkpoint
//! therefore stores the volume UUID next to the id, and is only honored
//! when the watched device still reports the same UUID.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::device::{device_uuid, DeviceId};
use crate::error::{FsEventsError, Result};
use crate::source::EventSource;
use crate::stream::EventStream;

/// Checkpoint format version - increment when changing the format.
pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    /// Durable UUID of the volume the id belongs to.
    pub device_uuid: String,
    /// Last delivered event id.
    pub event_id: u64,
    /// Unix timestamp (seconds) when the checkpoint was taken.
    pub saved_at: i64,
}

impl Checkpoint {
    pub fn new(device_uuid: impl Into<String>, event_id: u64) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            device_uuid: device_uuid.into(),
            event_id,
            saved_at: Utc::now().timestamp(),
        }
    }

    /// Builds a checkpoint for `device`, or `None` if it has no UUID.
    pub fn capture(source: &dyn EventSource, device: DeviceId, event_id: u64) -> Option<Self> {
        device_uuid(source, device).map(|uuid| Self::new(uuid, event_id))
    }

    /// The stored id, if `device` is still the volume it was recorded on.
    pub fn resume_point(&self, source: &dyn EventSource, device: DeviceId) -> Option<u64> {
        match device_uuid(source, device) {
            Some(uuid) if uuid == self.device_uuid => Some(self.event_id),
            Some(uuid) => {
                log::debug!(
                    "checkpoint volume mismatch: {} != {uuid}",
                    self.device_uuid
                );
                None
            }
            None => None,
        }
    }

    /// Writes the checkpoint, replacing `path` atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                FsEventsError::Checkpoint(format!(
                    "failed to create checkpoint directory {}: {error}",
                    parent.display()
                ))
            })?;
        }

        let bytes = postcard::to_stdvec(self).map_err(|error| {
            FsEventsError::Checkpoint(format!("failed to encode checkpoint: {error}"))
        })?;

        // Write to temp file first for atomic operation
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, &bytes).map_err(|error| {
            FsEventsError::Checkpoint(format!(
                "failed to write checkpoint {}: {error}",
                tmp_path.display()
            ))
        })?;
        fs::rename(&tmp_path, path).map_err(|error| {
            FsEventsError::Checkpoint(format!(
                "failed to finalize checkpoint {}: {error}",
                path.display()
            ))
        })?;

        log::debug!(
            "saved checkpoint {} at event {:#x}",
            path.display(),
            self.event_id
        );
        Ok(())
    }

    /// Reads a checkpoint. A missing file is `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        let checkpoint: Checkpoint = postcard::from_bytes(&bytes).map_err(|error| {
            FsEventsError::Checkpoint(format!(
                "failed to decode checkpoint {}: {error}",
                path.display()
            ))
        })?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(FsEventsError::Checkpoint(format!(
                "unsupported checkpoint version {} in {}",
                checkpoint.version,
                path.display()
            )));
        }
        Ok(Some(checkpoint))
    }
}

impl EventStream {
    /// Captures the stream's current position, or `None` if its volume has no UUID.
    pub fn checkpoint(&self) -> Result<Option<Checkpoint>> {
        let device = self.watched_device()?;
        Ok(Checkpoint::capture(self.source(), device, self.event_id()))
    }

    /// Seeds the stream from `checkpoint` when it belongs to the watched volume.
    ///
    /// Returns whether the checkpoint was applied. Takes effect on the next
    /// `start` with `resume` set.
    pub fn resume_from(&self, checkpoint: &Checkpoint) -> Result<bool> {
        let device = self.watched_device()?;
        match checkpoint.resume_point(self.source(), device) {
            Some(event_id) => {
                self.set_event_id(event_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::StreamConfig;
    use crate::source::fake::FakeSource;

    const UUID: &str = "0B4E6A41-5E0C-4F2B-9D41-7F1C6B2A9E10";

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state").join("stream.checkpoint");

        let checkpoint = Checkpoint::new(UUID, 0x1234);
        checkpoint.save(&path).expect("save");
        assert!(!path.with_extension("tmp").exists());

        let loaded = Checkpoint::load(&path).expect("load").expect("present");
        assert_eq!(loaded, checkpoint);
    }

    #[test]
    fn load_missing_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = Checkpoint::load(&dir.path().join("missing")).expect("load");
        assert!(loaded.is_none());
    }

    #[test]
    fn load_rejects_garbage_and_other_versions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("checkpoint");

        fs::write(&path, [0xFFu8; 3]).expect("write garbage");
        assert!(matches!(
            Checkpoint::load(&path),
            Err(FsEventsError::Checkpoint(_))
        ));

        let mut future = Checkpoint::new(UUID, 1);
        future.version = CHECKPOINT_VERSION + 1;
        fs::write(&path, postcard::to_stdvec(&future).expect("encode")).expect("write");
        assert!(matches!(
            Checkpoint::load(&path),
            Err(FsEventsError::Checkpoint(_))
        ));
    }

    #[test]
    fn resume_point_requires_same_volume() {
        let source = FakeSource::new();
        source.set_uuid(4, UUID);
        source.set_uuid(5, "another-volume");

        let checkpoint = Checkpoint::new(UUID, 99);
        assert_eq!(checkpoint.resume_point(&source, 4), Some(99));
        assert_eq!(checkpoint.resume_point(&source, 5), None);
        assert_eq!(checkpoint.resume_point(&source, 6), None);
        assert_eq!(checkpoint.resume_point(&source, 0), None);
    }

    #[test]
    fn capture_needs_a_uuid() {
        let source = FakeSource::new();
        source.set_uuid(4, UUID);
        let checkpoint = Checkpoint::capture(&source, 4, 17).expect("uuid known");
        assert_eq!(checkpoint.device_uuid, UUID);
        assert_eq!(checkpoint.event_id, 17);
        assert!(Checkpoint::capture(&source, 9, 17).is_none());
    }

    #[test]
    fn stream_checkpoint_survives_restart() {
        let source = Arc::new(FakeSource::new());
        source.set_uuid(4, UUID);
        let config = StreamConfig::new(["/a"])
            .with_device(4)
            .with_resume(true)
            .with_channel_capacity(1);

        let first = EventStream::with_source(config.clone(), source.clone());
        first.start().expect("start");
        source.fire_live(&[("/a/x", 0, 500)]);
        first.stop();

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("checkpoint");
        first
            .checkpoint()
            .expect("checkpoint")
            .expect("uuid known")
            .save(&path)
            .expect("save");
        drop(first);

        let second = EventStream::with_source(config, source.clone());
        let checkpoint = Checkpoint::load(&path).expect("load").expect("present");
        assert!(second.resume_from(&checkpoint).expect("resume"));
        second.start().expect("start");
        assert_eq!(source.created()[1].since, 500);
        second.stop();
    }

    #[test]
    fn foreign_checkpoint_is_ignored() {
        let source = Arc::new(FakeSource::new());
        source.set_uuid(4, "rebooted-volume");
        let stream =
            EventStream::with_source(StreamConfig::new(["/a"]).with_device(4), source.clone());
        assert!(!stream
            .resume_from(&Checkpoint::new(UUID, 500))
            .expect("resume"));
        assert_eq!(stream.event_id(), 0);
    }
}
