//! Decoded event records.

use serde::{Deserialize, Serialize};

use crate::flags::EventFlags;

/// One reported change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Absolute path of the changed item. Empty if the native path was null.
    pub path: String,
    pub flags: EventFlags,
    /// Native event identifier; also the resumption token.
    pub id: u64,
}

/// All events from one native callback invocation, in delivery order.
pub type EventBatch = Vec<Event>;
