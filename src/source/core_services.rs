//! FSEvents (CoreServices) and libdispatch bindings.

use std::ffi::CString;
use std::os::raw::{c_char, c_void};
use std::ptr;

use core_foundation_sys::array::CFArrayRef;
use core_foundation_sys::base::{kCFAllocatorDefault, CFAllocatorRef, CFIndex, CFRelease, CFTypeRef};
use core_foundation_sys::date::CFAbsoluteTime;
use core_foundation_sys::string::CFStringRef;
use core_foundation_sys::uuid::{CFUUIDCreateString, CFUUIDRef};

use super::{EventSource, QueueRef, StreamRef, StreamRequest};
use crate::bridge;
use crate::device::DeviceId;
use crate::error::{FsEventsError, Result};
use crate::marshal::cf::{CfArray, CfString};

// ---------------------------------------------------------------------------
// FSEvents C types
// ---------------------------------------------------------------------------

type FSEventStreamRef = *mut c_void;
type ConstFSEventStreamRef = *const c_void;
type FSEventStreamEventId = u64;
type DispatchQueue = *mut c_void;

#[repr(C)]
struct FSEventStreamContext {
    version: CFIndex,
    info: *mut c_void,
    retain: Option<extern "C" fn(*const c_void) -> *const c_void>,
    release: Option<extern "C" fn(*const c_void)>,
    copy_description: Option<extern "C" fn(*const c_void) -> CFStringRef>,
}

type FSEventStreamCallback = extern "C" fn(
    stream_ref: FSEventStreamRef,
    client_callback_info: *mut c_void,
    num_events: usize,
    event_paths: *mut c_void,
    event_flags: *const u32,
    event_ids: *const FSEventStreamEventId,
);

#[link(name = "CoreServices", kind = "framework")]
extern "C" {
    fn FSEventStreamCreate(
        allocator: CFAllocatorRef,
        callback: FSEventStreamCallback,
        context: *mut FSEventStreamContext,
        paths_to_watch: CFArrayRef,
        since_when: FSEventStreamEventId,
        latency: f64,
        flags: u32,
    ) -> FSEventStreamRef;

    fn FSEventStreamCreateRelativeToDevice(
        allocator: CFAllocatorRef,
        callback: FSEventStreamCallback,
        context: *mut FSEventStreamContext,
        device_to_watch: DeviceId,
        paths_relative_to_device: CFArrayRef,
        since_when: FSEventStreamEventId,
        latency: f64,
        flags: u32,
    ) -> FSEventStreamRef;

    fn FSEventStreamSetDispatchQueue(stream: FSEventStreamRef, queue: DispatchQueue);
    fn FSEventStreamStart(stream: FSEventStreamRef) -> bool;
    fn FSEventStreamStop(stream: FSEventStreamRef);
    fn FSEventStreamInvalidate(stream: FSEventStreamRef);
    fn FSEventStreamRelease(stream: FSEventStreamRef);

    fn FSEventStreamFlushAsync(stream: FSEventStreamRef) -> FSEventStreamEventId;
    fn FSEventStreamFlushSync(stream: FSEventStreamRef);

    fn FSEventStreamGetLatestEventId(stream: ConstFSEventStreamRef) -> FSEventStreamEventId;
    fn FSEventStreamGetDeviceBeingWatched(stream: ConstFSEventStreamRef) -> DeviceId;
    fn FSEventStreamCopyDescription(stream: ConstFSEventStreamRef) -> CFStringRef;
    fn FSEventStreamCopyPathsBeingWatched(stream: ConstFSEventStreamRef) -> CFArrayRef;

    fn FSEventsGetCurrentEventId() -> FSEventStreamEventId;
    fn FSEventsCopyUUIDForDevice(dev: DeviceId) -> CFUUIDRef;
    fn FSEventsGetLastEventIdForDeviceBeforeTime(
        dev: DeviceId,
        time: CFAbsoluteTime,
    ) -> FSEventStreamEventId;
}

// libdispatch is part of libSystem, which every macOS binary links.
extern "C" {
    fn dispatch_queue_create(label: *const c_char, attr: *mut c_void) -> DispatchQueue;
    fn dispatch_release(object: *mut c_void);
}

// Event paths arrive as CFArrays of CFStrings instead of C strings when set.
const CREATE_FLAG_USE_CF_TYPES: u32 = 0x0000_0001;

/// The macOS FSEvents service.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreServices;

impl CoreServices {
    fn stream_ptr(stream: &StreamRef) -> FSEventStreamRef {
        stream.as_raw() as FSEventStreamRef
    }
}

impl EventSource for CoreServices {
    fn create_stream(&self, request: &StreamRequest<'_>) -> Result<StreamRef> {
        let paths = CfArray::from_strings(request.paths).ok_or(FsEventsError::CreateFailed)?;

        // FSEventStreamCreate copies the context; it does not need to outlive the call.
        let mut context = FSEventStreamContext {
            version: 0,
            info: request.context.into_info(),
            retain: None,
            release: None,
            copy_description: None,
        };
        let latency = request.latency.as_secs_f64();
        let flags = request.flags.bits() & !CREATE_FLAG_USE_CF_TYPES;

        // Safety: every pointer argument is live for the duration of the call.
        let stream = unsafe {
            if request.device != 0 {
                FSEventStreamCreateRelativeToDevice(
                    kCFAllocatorDefault,
                    bridge::native_callback,
                    &mut context,
                    request.device,
                    paths.as_raw(),
                    request.since,
                    latency,
                    flags,
                )
            } else {
                FSEventStreamCreate(
                    kCFAllocatorDefault,
                    bridge::native_callback,
                    &mut context,
                    paths.as_raw(),
                    request.since,
                    latency,
                    flags,
                )
            }
        };
        paths.release();

        if stream.is_null() {
            return Err(FsEventsError::CreateFailed);
        }
        Ok(StreamRef::from_raw(stream as usize))
    }

    fn create_queue(&self, label: &str) -> Result<QueueRef> {
        let label = CString::new(label).map_err(|_| FsEventsError::QueueFailed)?;
        // Safety: a null attribute requests a serial queue; the label is copied.
        let queue = unsafe { dispatch_queue_create(label.as_ptr(), ptr::null_mut()) };
        if queue.is_null() {
            return Err(FsEventsError::QueueFailed);
        }
        Ok(QueueRef::from_raw(queue as usize))
    }

    fn set_dispatch_queue(&self, stream: &StreamRef, queue: &QueueRef) {
        unsafe {
            FSEventStreamSetDispatchQueue(Self::stream_ptr(stream), queue.as_raw() as DispatchQueue)
        }
    }

    fn start(&self, stream: &StreamRef) -> bool {
        unsafe { FSEventStreamStart(Self::stream_ptr(stream)) }
    }

    fn stop(&self, stream: &StreamRef) {
        unsafe { FSEventStreamStop(Self::stream_ptr(stream)) }
    }

    fn invalidate(&self, stream: &StreamRef) {
        unsafe { FSEventStreamInvalidate(Self::stream_ptr(stream)) }
    }

    fn release_stream(&self, stream: StreamRef) {
        unsafe { FSEventStreamRelease(Self::stream_ptr(&stream)) }
    }

    fn release_queue(&self, queue: QueueRef) {
        unsafe { dispatch_release(queue.as_raw() as *mut c_void) }
    }

    fn flush_sync(&self, stream: &StreamRef) {
        unsafe { FSEventStreamFlushSync(Self::stream_ptr(stream)) }
    }

    fn flush_async(&self, stream: &StreamRef) -> u64 {
        unsafe { FSEventStreamFlushAsync(Self::stream_ptr(stream)) }
    }

    fn latest_event_id(&self, stream: &StreamRef) -> u64 {
        unsafe { FSEventStreamGetLatestEventId(Self::stream_ptr(stream)) }
    }

    fn current_event_id(&self) -> u64 {
        unsafe { FSEventsGetCurrentEventId() }
    }

    fn device_being_watched(&self, stream: &StreamRef) -> DeviceId {
        unsafe { FSEventStreamGetDeviceBeingWatched(Self::stream_ptr(stream)) }
    }

    fn copy_description(&self, stream: &StreamRef) -> String {
        // Safety: Copy functions return a reference we own.
        let Some(description) =
            (unsafe { CfString::from_owned(FSEventStreamCopyDescription(Self::stream_ptr(stream))) })
        else {
            return String::new();
        };
        let text = description.to_string_lossy();
        description.release();
        text
    }

    fn copy_paths_being_watched(&self, stream: &StreamRef) -> Vec<String> {
        // Safety: Copy functions return a reference we own.
        let Some(paths) = (unsafe {
            CfArray::from_owned(FSEventStreamCopyPathsBeingWatched(Self::stream_ptr(stream)))
        }) else {
            return Vec::new();
        };
        let values = paths.to_strings();
        paths.release();
        values
    }

    fn uuid_for_device(&self, device: DeviceId) -> Option<String> {
        // Safety: Copy/Create functions return references we own; each is released once.
        unsafe {
            let uuid = FSEventsCopyUUIDForDevice(device);
            if uuid.is_null() {
                return None;
            }
            let text = CfString::from_owned(CFUUIDCreateString(kCFAllocatorDefault, uuid));
            CFRelease(uuid as CFTypeRef);

            let text = text?;
            let value = text.to_string_lossy();
            text.release();
            (!value.is_empty()).then_some(value)
        }
    }

    fn last_event_id_for_device_before_time(&self, device: DeviceId, absolute_time: f64) -> u64 {
        unsafe { FSEventsGetLastEventIdForDeviceBeforeTime(device, absolute_time) }
    }
}
