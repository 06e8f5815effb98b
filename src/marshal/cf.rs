//! CoreFoundation string and array handles.
//!
//! The wrappers own one reference each and give it back through a
//! consuming `release`, so a handle cannot be released twice. They do not
//! release on drop; every path that obtains one must release it.

use std::ffi::CStr;
use std::os::raw::{c_char, c_void};

use core_foundation_sys::array::{
    kCFTypeArrayCallBacks, CFArrayAppendValue, CFArrayCreateMutable, CFArrayGetCount,
    CFArrayGetValueAtIndex, CFArrayRef,
};
use core_foundation_sys::base::{kCFAllocatorDefault, CFIndex, CFRelease, CFTypeRef};
use core_foundation_sys::string::{
    kCFStringEncodingUTF8, CFStringCreateWithBytes, CFStringGetCString, CFStringGetCStringPtr,
    CFStringGetLength, CFStringGetMaximumSizeForEncoding, CFStringRef,
};

/// An owned `CFStringRef`.
#[derive(Debug)]
pub struct CfString(CFStringRef);

impl CfString {
    /// Creates a UTF-8 CFString. Returns `None` if CoreFoundation refuses.
    pub fn new(value: &str) -> Option<Self> {
        // Safety: the byte pointer and length describe a live UTF-8 buffer.
        let raw = unsafe {
            CFStringCreateWithBytes(
                kCFAllocatorDefault,
                value.as_ptr(),
                value.len() as CFIndex,
                kCFStringEncodingUTF8,
                false as u8,
            )
        };
        (!raw.is_null()).then_some(Self(raw))
    }

    /// Takes ownership of a reference returned by a `Create`/`Copy` call.
    ///
    /// # Safety
    /// `raw` must be null or a CFString the caller owns a reference to.
    pub unsafe fn from_owned(raw: CFStringRef) -> Option<Self> {
        (!raw.is_null()).then_some(Self(raw))
    }

    pub fn as_raw(&self) -> CFStringRef {
        self.0
    }

    pub fn to_string_lossy(&self) -> String {
        // Safety: self.0 is a live CFString.
        unsafe { string_from_cf(self.0) }
    }

    pub fn release(self) {
        // Safety: we own exactly one reference and consume it here.
        unsafe { CFRelease(self.0 as CFTypeRef) }
    }
}

/// An owned `CFArrayRef` of CFStrings.
#[derive(Debug)]
pub struct CfArray(CFArrayRef);

impl CfArray {
    /// Builds an array holding one CFString per value, in order.
    ///
    /// Returns `None` if any value cannot be converted, so a built array
    /// always has one slot per value.
    pub fn from_strings<S: AsRef<str>>(values: &[S]) -> Option<Self> {
        Self::build(values, CfString::new)
    }

    /// The array retains its elements, so each intermediate string is
    /// released as soon as it has been appended.
    fn build<S: AsRef<str>>(
        values: &[S],
        convert: impl Fn(&str) -> Option<CfString>,
    ) -> Option<Self> {
        // Safety: kCFTypeArrayCallBacks makes the array retain/release its values.
        let array = unsafe {
            CFArrayCreateMutable(
                kCFAllocatorDefault,
                values.len() as CFIndex,
                &kCFTypeArrayCallBacks,
            )
        };
        if array.is_null() {
            return None;
        }

        for value in values {
            let value = value.as_ref();
            let Some(string) = convert(value) else {
                log::warn!("CoreFoundation could not encode path {value:?}");
                // Safety: the array was created above and not handed out.
                unsafe { CFRelease(array as CFTypeRef) };
                return None;
            };
            // Safety: both handles are live; the array takes its own reference.
            unsafe { CFArrayAppendValue(array, string.as_raw() as *const c_void) };
            string.release();
        }

        Some(Self(array as CFArrayRef))
    }

    /// Takes ownership of a reference returned by a `Create`/`Copy` call.
    ///
    /// # Safety
    /// `raw` must be null or a CFArray the caller owns a reference to.
    pub unsafe fn from_owned(raw: CFArrayRef) -> Option<Self> {
        (!raw.is_null()).then_some(Self(raw))
    }

    pub fn as_raw(&self) -> CFArrayRef {
        self.0
    }

    pub fn len(&self) -> usize {
        // Safety: self.0 is a live CFArray.
        let count = unsafe { CFArrayGetCount(self.0) };
        usize::try_from(count).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies every element out as a Rust string. Non-string slots decode empty.
    pub fn to_strings(&self) -> Vec<String> {
        (0..self.len())
            .map(|index| {
                // Safety: index < count; the element is borrowed from the array.
                unsafe {
                    let value = CFArrayGetValueAtIndex(self.0, index as CFIndex);
                    string_from_cf(value as CFStringRef)
                }
            })
            .collect()
    }

    pub fn release(self) {
        // Safety: we own exactly one reference and consume it here.
        unsafe { CFRelease(self.0 as CFTypeRef) }
    }
}

/// Copies a borrowed CFString into a Rust string.
///
/// The copy buffer is sized with `CFStringGetMaximumSizeForEncoding`, which
/// bounds the UTF-8 size of any UTF-16 content, so nothing is truncated.
///
/// # Safety
/// `value` must be null or a live CFString.
pub unsafe fn string_from_cf(value: CFStringRef) -> String {
    if value.is_null() {
        return String::new();
    }

    let direct = CFStringGetCStringPtr(value, kCFStringEncodingUTF8);
    if !direct.is_null() {
        return CStr::from_ptr(direct).to_string_lossy().into_owned();
    }

    let length = CFStringGetLength(value);
    if length == 0 {
        return String::new();
    }

    let max_size = CFStringGetMaximumSizeForEncoding(length, kCFStringEncodingUTF8);
    let Some(capacity) = usize::try_from(max_size).ok().and_then(|size| size.checked_add(1))
    else {
        log::warn!("CFString of length {length} is too large to convert");
        return String::new();
    };

    let mut buffer = vec![0u8; capacity];
    let copied = CFStringGetCString(
        value,
        buffer.as_mut_ptr() as *mut c_char,
        capacity as CFIndex,
        kCFStringEncodingUTF8,
    );
    if copied == 0 {
        return String::new();
    }

    let end = buffer.iter().position(|&byte| byte == 0).unwrap_or(capacity);
    buffer.truncate(end);
    String::from_utf8_lossy(&buffer).into_owned()
}
