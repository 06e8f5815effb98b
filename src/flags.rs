//! Creation and event flag sets.
//!
//! Both sets keep the native numeric values, so `bits()` can be handed to
//! FSEvents unchanged and raw callback words convert without loss.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// `kFSEventStreamEventIdSinceNow`: start with events that happen after creation.
pub const EVENT_ID_SINCE_NOW: u64 = u64::MAX;

bitflags! {
    /// Flags fixed when the native stream is created.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct CreateFlags: u32 {
        const NO_DEFER    = 0x0000_0002;
        const WATCH_ROOT  = 0x0000_0004;
        const IGNORE_SELF = 0x0000_0008;
        const FILE_EVENTS = 0x0000_0010;
    }
}

impl CreateFlags {
    /// Deliver the first event of a quiet period immediately instead of
    /// waiting for the latency window.
    pub fn no_defer(self) -> bool {
        self.contains(Self::NO_DEFER)
    }

    /// Report changes to the path leading up to each watched root.
    pub fn watch_root(self) -> bool {
        self.contains(Self::WATCH_ROOT)
    }

    /// Suppress events generated by this process.
    pub fn ignore_self(self) -> bool {
        self.contains(Self::IGNORE_SELF)
    }

    /// Report individual files rather than only their parent directories.
    pub fn file_events(self) -> bool {
        self.contains(Self::FILE_EVENTS)
    }
}

bitflags! {
    /// Conditions reported for a single event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct EventFlags: u32 {
        const MUST_SCAN_SUBDIRS    = 0x0000_0001;
        const KERNEL_DROPPED       = 0x0000_0002;
        const USER_DROPPED         = 0x0000_0004;
        const EVENT_IDS_WRAPPED    = 0x0000_0008;
        const HISTORY_DONE         = 0x0000_0010;
        const ROOT_CHANGED         = 0x0000_0020;
        const MOUNT                = 0x0000_0040;
        const UNMOUNT              = 0x0000_0080;
        const ITEM_CREATED         = 0x0000_0100;
        const ITEM_REMOVED         = 0x0000_0200;
        const ITEM_INODE_META_MOD  = 0x0000_0400;
        const ITEM_RENAMED         = 0x0000_0800;
        const ITEM_MODIFIED        = 0x0000_1000;
        const ITEM_FINDER_INFO_MOD = 0x0000_2000;
        const ITEM_CHANGE_OWNER    = 0x0000_4000;
        const ITEM_XATTR_MOD       = 0x0000_8000;
        const ITEM_IS_FILE         = 0x0001_0000;
        const ITEM_IS_DIR          = 0x0002_0000;
        const ITEM_IS_SYMLINK      = 0x0004_0000;
    }
}

impl EventFlags {
    /// Converts a raw callback word. Bits this crate does not name are kept.
    pub fn from_native(raw: u32) -> Self {
        Self::from_bits_retain(raw)
    }

    pub fn must_scan_subdirs(self) -> bool {
        self.contains(Self::MUST_SCAN_SUBDIRS)
    }

    pub fn kernel_dropped(self) -> bool {
        self.contains(Self::KERNEL_DROPPED)
    }

    pub fn user_dropped(self) -> bool {
        self.contains(Self::USER_DROPPED)
    }

    pub fn event_ids_wrapped(self) -> bool {
        self.contains(Self::EVENT_IDS_WRAPPED)
    }

    pub fn history_done(self) -> bool {
        self.contains(Self::HISTORY_DONE)
    }

    pub fn root_changed(self) -> bool {
        self.contains(Self::ROOT_CHANGED)
    }

    pub fn mount(self) -> bool {
        self.contains(Self::MOUNT)
    }

    pub fn unmount(self) -> bool {
        self.contains(Self::UNMOUNT)
    }

    pub fn created(self) -> bool {
        self.contains(Self::ITEM_CREATED)
    }

    pub fn removed(self) -> bool {
        self.contains(Self::ITEM_REMOVED)
    }

    pub fn inode_meta_modified(self) -> bool {
        self.contains(Self::ITEM_INODE_META_MOD)
    }

    pub fn renamed(self) -> bool {
        self.contains(Self::ITEM_RENAMED)
    }

    pub fn modified(self) -> bool {
        self.contains(Self::ITEM_MODIFIED)
    }

    pub fn finder_info_modified(self) -> bool {
        self.contains(Self::ITEM_FINDER_INFO_MOD)
    }

    pub fn owner_changed(self) -> bool {
        self.contains(Self::ITEM_CHANGE_OWNER)
    }

    pub fn xattr_modified(self) -> bool {
        self.contains(Self::ITEM_XATTR_MOD)
    }

    pub fn is_file(self) -> bool {
        self.contains(Self::ITEM_IS_FILE)
    }

    pub fn is_dir(self) -> bool {
        self.contains(Self::ITEM_IS_DIR)
    }

    pub fn is_symlink(self) -> bool {
        self.contains(Self::ITEM_IS_SYMLINK)
    }
}
