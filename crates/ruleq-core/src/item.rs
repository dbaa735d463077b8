//! A single timestamped value held by a queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One value in a queue, with the time it was produced (if the source has one)
///
/// Items are immutable once created. Timer and time-series sources stamp
/// their values; key/value style sources leave `time` empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// The opaque payload
    pub value: serde_json::Value,

    /// When the value was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}

impl QueueItem {
    /// Create a new item
    pub fn new(value: serde_json::Value, time: Option<DateTime<Utc>>) -> Self {
        Self { value, time }
    }

    /// Create an item stamped with the current time
    pub fn now(value: serde_json::Value) -> Self {
        Self::new(value, Some(Utc::now()))
    }

    /// The item's time in milliseconds since the Unix epoch, if any
    pub fn time_millis(&self) -> Option<i64> {
        self.time.as_ref().map(crate::time::to_millis)
    }
}
