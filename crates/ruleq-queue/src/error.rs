//! Queue error types

use ruleq_core::Position;
use thiserror::Error;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur when working with queues
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Position is outside the retained range (evicted or not yet produced)
    #[error("queue {queue}: get({index}) out of range (empty={empty}, max={max})")]
    IndexOutOfRange {
        queue: String,
        index: Position,
        empty: Position,
        max: Position,
    },

    /// Cursor write outside `empty..=max`
    #[error("queue {queue}: current={requested} outside {empty}..={max}")]
    CursorOutOfRange {
        queue: String,
        requested: Position,
        empty: Position,
        max: Position,
    },

    /// No queue registered under this name
    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    /// A queue with this name already exists
    #[error("queue already exists: {0}")]
    DuplicateQueue(String),

    /// Capacity must be at least one
    #[error("queue {queue}: invalid capacity {capacity}")]
    InvalidCapacity { queue: String, capacity: usize },
}
