//! Core types for ruleq
//!
//! This crate provides the value types shared by the queue, rule and runtime
//! crates: the immutable [`QueueItem`], the [`QueueSnapshot`] handed to change
//! observers, and the [`Position`] counter used for queue indexing.

mod item;
mod snapshot;

pub use item::QueueItem;
pub use snapshot::QueueSnapshot;

/// A logical, monotonically increasing slot index in a queue's history
///
/// Positions are 1-based: the first item ever added to a queue sits at
/// position 1, and position 0 means "before anything was produced".
pub type Position = u64;

/// Default queue capacity when a definition does not specify one
pub const DEFAULT_CAPACITY: usize = 1;

/// Timestamp helpers
pub mod time {
    use chrono::{DateTime, TimeZone, Utc};

    /// Convert a timestamp to milliseconds since the Unix epoch
    pub fn to_millis(time: &DateTime<Utc>) -> i64 {
        time.timestamp_millis()
    }

    /// Convert milliseconds since the Unix epoch to a timestamp
    ///
    /// Returns `None` if the value is outside chrono's representable range.
    pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(millis).single()
    }
}
