//! In-memory event source that records every call.
//!
//! Batches are injected through the real callback entry point using C
//! arrays, so the bridge decodes them exactly as it would native ones.

use std::ffi::CString;
use std::os::raw::{c_char, c_void};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fnv::FnvHashMap;
use parking_lot::Mutex;

use super::{EventSource, QueueRef, StreamRef, StreamRequest};
use crate::bridge;
use crate::device::DeviceId;
use crate::error::{FsEventsError, Result};
use crate::flags::CreateFlags;
use crate::registry::ContextToken;
use crate::stream::Publisher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Create { stream: usize },
    CreateQueue(usize),
    SetQueue { stream: usize, queue: usize },
    Start(usize),
    Stop(usize),
    Invalidate(usize),
    ReleaseStream(usize),
    ReleaseQueue(usize),
    FlushSync(usize),
    FlushAsync(usize),
}

/// What a `create_stream` call asked for.
#[derive(Debug, Clone)]
pub(crate) struct Created {
    pub paths: Vec<String>,
    pub context: ContextToken,
    pub since: u64,
    pub latency: Duration,
    pub flags: CreateFlags,
    pub device: DeviceId,
}

#[derive(Debug)]
struct FakeStream {
    request: Created,
    latest: u64,
}

#[derive(Debug, Default)]
pub(crate) struct FakeSource {
    next_handle: AtomicUsize,
    fail_create: AtomicBool,
    fail_queue: AtomicBool,
    fail_start: AtomicBool,
    claim_tokens: AtomicBool,
    flush_batch: Mutex<Option<Vec<(String, u32, u64)>>>,
    calls: Mutex<Vec<Call>>,
    created: Mutex<Vec<Created>>,
    streams: Mutex<FnvHashMap<usize, FakeStream>>,
    started: Mutex<Vec<usize>>,
    uuids: Mutex<FnvHashMap<DeviceId, String>>,
}

impl FakeSource {
    pub(crate) fn new() -> Self {
        Self {
            next_handle: AtomicUsize::new(0x1000),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub(crate) fn created(&self) -> Vec<Created> {
        self.created.lock().clone()
    }

    /// Native streams created and not yet released.
    pub(crate) fn live_streams(&self) -> usize {
        self.streams.lock().len()
    }

    pub(crate) fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_queue(&self, fail: bool) {
        self.fail_queue.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Makes `create_stream` register another owner under the request's token.
    pub(crate) fn claim_tokens(&self, claim: bool) {
        self.claim_tokens.store(claim, Ordering::SeqCst);
    }

    /// Has the next `flush_sync` deliver `events` before it returns, as a
    /// native synchronous flush does with buffered events.
    pub(crate) fn fire_on_flush(&self, events: &[(&str, u32, u64)]) {
        let events = events
            .iter()
            .map(|(path, flags, id)| (path.to_string(), *flags, *id))
            .collect();
        *self.flush_batch.lock() = Some(events);
    }

    pub(crate) fn set_uuid(&self, device: DeviceId, uuid: &str) {
        self.uuids.lock().insert(device, uuid.to_string());
    }

    /// Delivers one batch to the most recently started stream that is still live.
    pub(crate) fn fire_live(&self, events: &[(&str, u32, u64)]) {
        let (handle, token) = {
            let started = self.started.lock();
            let streams = self.streams.lock();
            let handle = *started.last().expect("no started stream");
            let stream = streams.get(&handle).expect("started stream was released");
            (handle, stream.request.context)
        };

        if let Some(highest) = events.iter().map(|(_, _, id)| *id).max() {
            if let Some(stream) = self.streams.lock().get_mut(&handle) {
                stream.latest = if stream.latest == crate::EVENT_ID_SINCE_NOW {
                    highest
                } else {
                    stream.latest.max(highest)
                };
            }
        }
        Self::fire(token, events);
    }

    /// Invokes the callback entry point as the native runtime would.
    pub(crate) fn fire(token: ContextToken, events: &[(&str, u32, u64)]) {
        let owned: Vec<CString> = events
            .iter()
            .map(|(path, _, _)| CString::new(*path).expect("no NUL in test path"))
            .collect();
        let paths: Vec<*const c_char> = owned.iter().map(|path| path.as_ptr()).collect();
        let flags: Vec<u32> = events.iter().map(|(_, flags, _)| *flags).collect();
        let ids: Vec<u64> = events.iter().map(|(_, _, id)| *id).collect();

        bridge::native_callback(
            ptr::null_mut(),
            token.into_info(),
            events.len(),
            paths.as_ptr() as *mut c_void,
            flags.as_ptr(),
            ids.as_ptr(),
        );
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn issue(&self) -> usize {
        self.next_handle.fetch_add(1, Ordering::SeqCst)
    }
}

impl EventSource for FakeSource {
    fn create_stream(&self, request: &StreamRequest<'_>) -> Result<StreamRef> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(FsEventsError::CreateFailed);
        }
        let handle = self.issue();
        let created = Created {
            paths: request.paths.to_vec(),
            context: request.context,
            since: request.since,
            latency: request.latency,
            flags: request.flags,
            device: request.device,
        };
        self.created.lock().push(created.clone());
        self.streams.lock().insert(
            handle,
            FakeStream {
                request: created,
                latest: request.since,
            },
        );
        if self.claim_tokens.load(Ordering::SeqCst) {
            let (sender, _receiver) = crossbeam_channel::bounded(1);
            bridge::ACTIVE_STREAMS.insert(request.context, Arc::new(Publisher::new(sender)));
        }
        self.record(Call::Create { stream: handle });
        Ok(StreamRef::from_raw(handle))
    }

    fn create_queue(&self, _label: &str) -> Result<QueueRef> {
        if self.fail_queue.load(Ordering::SeqCst) {
            return Err(FsEventsError::QueueFailed);
        }
        let handle = self.issue();
        self.record(Call::CreateQueue(handle));
        Ok(QueueRef::from_raw(handle))
    }

    fn set_dispatch_queue(&self, stream: &StreamRef, queue: &QueueRef) {
        self.record(Call::SetQueue {
            stream: stream.as_raw(),
            queue: queue.as_raw(),
        });
    }

    fn start(&self, stream: &StreamRef) -> bool {
        self.record(Call::Start(stream.as_raw()));
        if self.fail_start.load(Ordering::SeqCst) {
            return false;
        }
        self.started.lock().push(stream.as_raw());
        true
    }

    fn stop(&self, stream: &StreamRef) {
        self.record(Call::Stop(stream.as_raw()));
    }

    fn invalidate(&self, stream: &StreamRef) {
        self.record(Call::Invalidate(stream.as_raw()));
    }

    fn release_stream(&self, stream: StreamRef) {
        let removed = self.streams.lock().remove(&stream.as_raw());
        assert!(removed.is_some(), "stream {:#x} released twice", stream.as_raw());
        self.started.lock().retain(|handle| *handle != stream.as_raw());
        self.record(Call::ReleaseStream(stream.as_raw()));
    }

    fn release_queue(&self, queue: QueueRef) {
        self.record(Call::ReleaseQueue(queue.as_raw()));
    }

    fn flush_sync(&self, stream: &StreamRef) {
        self.record(Call::FlushSync(stream.as_raw()));
        let pending = self.flush_batch.lock().take();
        if let Some(events) = pending {
            let events: Vec<(&str, u32, u64)> = events
                .iter()
                .map(|(path, flags, id)| (path.as_str(), *flags, *id))
                .collect();
            self.fire_live(&events);
        }
    }

    fn flush_async(&self, stream: &StreamRef) -> u64 {
        self.record(Call::FlushAsync(stream.as_raw()));
        self.latest_event_id(stream)
    }

    fn latest_event_id(&self, stream: &StreamRef) -> u64 {
        self.streams
            .lock()
            .get(&stream.as_raw())
            .map_or(0, |stream| stream.latest)
    }

    fn current_event_id(&self) -> u64 {
        self.streams
            .lock()
            .values()
            .map(|stream| stream.latest)
            .filter(|id| *id != crate::EVENT_ID_SINCE_NOW)
            .max()
            .unwrap_or(0)
    }

    fn device_being_watched(&self, stream: &StreamRef) -> DeviceId {
        self.streams
            .lock()
            .get(&stream.as_raw())
            .map_or(0, |stream| stream.request.device)
    }

    fn copy_description(&self, stream: &StreamRef) -> String {
        match self.streams.lock().get(&stream.as_raw()) {
            Some(fake) => format!(
                "FakeStream {:#x} {{ paths = {:?}, since = {} }}",
                stream.as_raw(),
                fake.request.paths,
                fake.request.since
            ),
            None => String::new(),
        }
    }

    fn copy_paths_being_watched(&self, stream: &StreamRef) -> Vec<String> {
        self.streams
            .lock()
            .get(&stream.as_raw())
            .map(|stream| stream.request.paths.clone())
            .unwrap_or_default()
    }

    fn uuid_for_device(&self, device: DeviceId) -> Option<String> {
        self.uuids.lock().get(&device).cloned()
    }

    fn last_event_id_for_device_before_time(&self, _device: DeviceId, absolute_time: f64) -> u64 {
        absolute_time.max(0.0) as u64
    }
}
