//! Point-in-time view of a queue for change observers

use serde::{Deserialize, Serialize};

use crate::{Position, QueueItem};

/// The state of a queue as seen by change observers
///
/// Observers (for example a UI push layer) receive one of these every time
/// a queue is added to or explicitly marked changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Queue name
    pub name: String,
    /// Position before the oldest retained item
    pub empty: Position,
    /// Consumption cursor
    pub current: Position,
    /// Position of the most recently added item
    pub max: Position,
    /// Maximum number of retained items
    pub capacity: usize,
    /// The most recently added item, if the queue holds any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<QueueItem>,
}

impl QueueSnapshot {
    /// Number of items currently retained
    pub fn len(&self) -> usize {
        (self.max - self.empty) as usize
    }

    /// Whether the queue retains no items
    pub fn is_empty(&self) -> bool {
        self.max == self.empty
    }
}
