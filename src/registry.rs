//! Token table shared between application threads and the native callback.
//!
//! The native source hands the callback an untyped context pointer. We put
//! a [`ContextToken`] there and look the owning stream up by token, so the
//! callback never dereferences a pointer into Rust memory.

use std::fmt;
use std::os::raw::c_void;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fnv::FnvHashMap;
use parking_lot::Mutex;

/// Identifies one registration. Tokens are never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextToken(u64);

impl ContextToken {
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Encodes the token as the native context `info` pointer.
    pub fn into_info(self) -> *mut c_void {
        self.0 as usize as *mut c_void
    }

    /// Decodes a context `info` pointer produced by [`ContextToken::into_info`].
    pub fn from_info(info: *mut c_void) -> Self {
        Self(info as usize as u64)
    }
}

impl fmt::Display for ContextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Maps issued tokens to their owners.
pub struct Registry<T> {
    next_token: AtomicU64,
    entries: Mutex<FnvHashMap<u64, Arc<T>>>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            // 0 would encode as a null info pointer.
            next_token: AtomicU64::new(1),
            entries: Mutex::new(FnvHashMap::default()),
        }
    }

    /// Issues a fresh token without registering anything under it yet.
    pub fn issue_token(&self) -> ContextToken {
        ContextToken(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers `owner` under `token`. Returns `false` if the token was taken.
    pub fn insert(&self, token: ContextToken, owner: Arc<T>) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&token.0) {
            return false;
        }
        entries.insert(token.0, owner);
        true
    }

    pub fn get(&self, token: ContextToken) -> Option<Arc<T>> {
        self.entries.lock().get(&token.0).cloned()
    }

    pub fn remove(&self, token: ContextToken) -> Option<Arc<T>> {
        self.entries.lock().remove(&token.0)
    }

    pub fn contains(&self, token: ContextToken) -> bool {
        self.entries.lock().contains_key(&token.0)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.len())
            .finish()
    }
}
