//! Event stream lifecycle.
//!
//! `Created -> Started -> Stopped`, and `Stopped -> Started` again. Each
//! start acquires a fresh native stream and dispatch queue and registers
//! under a fresh context token; stop gives them back in reverse order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::bridge::ACTIVE_STREAMS;
use crate::config::StreamConfig;
use crate::device::{device_for_path, DeviceId};
use crate::error::{FsEventsError, Result};
use crate::event::EventBatch;
use crate::flags::EVENT_ID_SINCE_NOW;
use crate::marshal::resolve_paths;
use crate::registry::ContextToken;
use crate::source::{EventSource, QueueRef, StreamRef, StreamRequest};

// ---------------------------------------------------------------------------
// Publication
// ---------------------------------------------------------------------------

/// The part of a stream the callback bridge writes to.
#[derive(Debug)]
pub(crate) struct Publisher {
    event_id: AtomicU64,
    sender: Sender<EventBatch>,
}

impl Publisher {
    pub(crate) fn new(sender: Sender<EventBatch>) -> Self {
        Self {
            event_id: AtomicU64::new(0),
            sender,
        }
    }

    pub(crate) fn event_id(&self) -> u64 {
        self.event_id.load(Ordering::Acquire)
    }

    pub(crate) fn set_event_id(&self, id: u64) {
        self.event_id.store(id, Ordering::Release);
    }

    /// Records the batch's checkpoint, then hands the batch over whole.
    ///
    /// Blocks while the channel is full; this is the only backpressure.
    pub(crate) fn publish(&self, batch: EventBatch) {
        let Some(last) = batch.last() else {
            return;
        };

        if batch.iter().any(|event| event.flags.event_ids_wrapped()) {
            self.event_id.store(last.id, Ordering::Release);
        } else {
            let highest = batch.iter().map(|event| event.id).max().unwrap_or(last.id);
            self.event_id.fetch_max(highest, Ordering::AcqRel);
        }

        let len = batch.len();
        if self.sender.send(batch).is_err() {
            log::debug!("dropping batch of {len} event(s): no receivers left");
        }
    }
}

// ---------------------------------------------------------------------------
// EventStream
// ---------------------------------------------------------------------------

/// Native resources held while started.
///
/// Shared with calls that run without the slot lock (flush, introspection).
/// Whoever drops the last reference after `stop` releases the handles.
#[derive(Debug)]
struct NativeHandles {
    stream: StreamRef,
    queue: QueueRef,
    token: ContextToken,
}

/// One subscription to the native event source.
///
/// All methods take `&self`; a stream can be shared across threads and
/// stopped from a different thread than the one that started it.
pub struct EventStream {
    config: StreamConfig,
    source: Arc<dyn EventSource>,
    publisher: Arc<Publisher>,
    receiver: Receiver<EventBatch>,
    native: Mutex<Option<Arc<NativeHandles>>>,
}

impl EventStream {
    /// Creates a stream backed by FSEvents.
    #[cfg(target_os = "macos")]
    pub fn new(config: StreamConfig) -> Self {
        Self::with_source(config, Arc::new(crate::source::CoreServices))
    }

    /// Creates a stream backed by `source`.
    pub fn with_source(config: StreamConfig, source: Arc<dyn EventSource>) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(config.channel_capacity);
        Self {
            config,
            source,
            publisher: Arc::new(Publisher::new(sender)),
            receiver,
            native: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub(crate) fn source(&self) -> &dyn EventSource {
        self.source.as_ref()
    }

    /// Receiving end of the batch channel. The channel outlives restarts.
    pub fn events(&self) -> Receiver<EventBatch> {
        self.receiver.clone()
    }

    /// Highest event id delivered so far; the resumption checkpoint.
    pub fn event_id(&self) -> u64 {
        self.publisher.event_id()
    }

    /// Seeds the checkpoint a resumed `start` continues from.
    pub fn set_event_id(&self, id: u64) {
        self.publisher.set_event_id(id);
    }

    pub fn is_started(&self) -> bool {
        self.native.lock().is_some()
    }

    /// Creates the native stream and begins delivery.
    ///
    /// On failure every partially acquired resource is released and the
    /// stream stays stopped, so `start` may be retried.
    pub fn start(&self) -> Result<()> {
        let mut native = self.native.lock();
        if native.is_some() {
            return Err(FsEventsError::AlreadyStarted);
        }
        self.config.validate()?;

        let resolved = resolve_paths(&self.config.paths);
        if let Some(error) = resolved.error() {
            if resolved.paths.is_empty() {
                return Err(error);
            }
            log::warn!("watching {} path(s) only: {error}", resolved.paths.len());
        }

        let since = if self.config.resume {
            self.publisher.event_id()
        } else {
            EVENT_ID_SINCE_NOW
        };

        let token = ACTIVE_STREAMS.issue_token();
        let request = StreamRequest {
            paths: &resolved.paths,
            context: token,
            since,
            latency: self.config.latency,
            flags: self.config.flags,
            device: self.config.device,
        };
        let stream = self.source.create_stream(&request)?;

        let queue = match self.source.create_queue(&format!("fsevents.stream.{}", token.as_raw())) {
            Ok(queue) => queue,
            Err(error) => {
                self.source.release_stream(stream);
                return Err(error);
            }
        };
        self.source.set_dispatch_queue(&stream, &queue);
        if !ACTIVE_STREAMS.insert(token, self.publisher.clone()) {
            log::error!("context token {token} is already registered");
            self.source.invalidate(&stream);
            self.source.release_stream(stream);
            self.source.release_queue(queue);
            return Err(FsEventsError::StartFailed);
        }

        if !self.source.start(&stream) {
            self.source.invalidate(&stream);
            self.source.release_stream(stream);
            self.source.release_queue(queue);
            ACTIVE_STREAMS.remove(token);
            return Err(FsEventsError::StartFailed);
        }

        log::debug!(
            "started event stream {token} for {} path(s) since {since:#x}",
            resolved.paths.len()
        );
        *native = Some(Arc::new(NativeHandles {
            stream,
            queue,
            token,
        }));
        Ok(())
    }

    /// Stops delivery and releases native resources. Does nothing if stopped.
    ///
    /// A callback already blocked publishing is not woken; drain
    /// [`EventStream::events`] concurrently for a prompt shutdown. If a
    /// flush is still running on another thread, the handles are released
    /// when it returns.
    pub fn stop(&self) {
        let Some(handles) = self.native.lock().take() else {
            return;
        };

        self.source.stop(&handles.stream);
        self.source.invalidate(&handles.stream);
        ACTIVE_STREAMS.remove(handles.token);
        log::debug!("stopped event stream {}", handles.token);
        self.release(handles);
    }

    /// Asks the native source to deliver buffered events now.
    ///
    /// With `sync` the call returns once they have been delivered. No-op
    /// while stopped. Does not hold the stream's lock, so `stop` may run
    /// while a synchronous flush waits on the consumer.
    pub fn flush(&self, sync: bool) {
        self.with_stream(|source, stream| {
            if sync {
                source.flush_sync(stream);
            } else {
                source.flush_async(stream);
            }
        });
    }

    /// Latest event id the live native stream has seen.
    pub fn latest_event_id(&self) -> Option<u64> {
        self.with_stream(|source, stream| source.latest_event_id(stream))
    }

    /// Device the live native stream is scoped to; 0 for path-set streams.
    pub fn device_being_watched(&self) -> Option<DeviceId> {
        self.with_stream(|source, stream| source.device_being_watched(stream))
    }

    /// Native debug description of the live stream.
    pub fn description(&self) -> Option<String> {
        self.with_stream(|source, stream| source.copy_description(stream))
    }

    /// Paths the live native stream watches, as the source reports them.
    pub fn paths_being_watched(&self) -> Option<Vec<String>> {
        self.with_stream(|source, stream| source.copy_paths_being_watched(stream))
    }

    /// Device this stream's events belong to: the configured device, or
    /// the device holding the first configured path.
    pub fn watched_device(&self) -> Result<DeviceId> {
        if self.config.device != 0 {
            return Ok(self.config.device);
        }
        let resolved = resolve_paths(&self.config.paths);
        match resolved.paths.first() {
            Some(path) => device_for_path(path),
            None => Err(resolved.error().unwrap_or_else(|| {
                FsEventsError::InvalidConfig("at least one path must be watched".to_string())
            })),
        }
    }

    /// Runs `query` against the live native stream without holding the slot lock.
    fn with_stream<T>(&self, query: impl FnOnce(&dyn EventSource, &StreamRef) -> T) -> Option<T> {
        let handles = self.native.lock().as_ref().map(Arc::clone)?;
        let value = query(self.source.as_ref(), &handles.stream);
        self.release(handles);
        Some(value)
    }

    /// Drops one reference to `handles`, releasing them if it was the last.
    ///
    /// Only the last reference can exist after `stop` took the slot, so
    /// release always follows stop and invalidate.
    fn release(&self, handles: Arc<NativeHandles>) {
        let Some(NativeHandles {
            stream,
            queue,
            token,
        }) = Arc::into_inner(handles)
        else {
            return;
        };
        self.source.release_stream(stream);
        self.source.release_queue(queue);
        log::debug!("released native resources of event stream {token}");
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("config", &self.config)
            .field("event_id", &self.event_id())
            .field("started", &self.is_started())
            .finish()
    }
}
