//! The bounded queue itself

use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ruleq_core::{Position, QueueItem, QueueSnapshot};
use tracing::{error, trace};

use crate::error::{QueueError, QueueResult};

/// Callback invoked with a snapshot whenever a queue changes
pub type ChangeListener = Arc<dyn Fn(&QueueSnapshot) + Send + Sync>;

/// A bounded, ordered buffer of timestamped values
///
/// Invariants, upheld after every operation:
/// - `empty <= current <= max`
/// - `max - empty <= capacity` (the buffer never holds more than `capacity` items)
///
/// `max` is the position of the most recently added item and `empty` is the
/// position just before the oldest retained item. When eviction moves
/// `empty` past `current`, the cursor is pulled forward so it never points
/// at evicted data.
pub struct Queue {
    name: String,
    capacity: usize,
    buffer: VecDeque<QueueItem>,
    empty: Position,
    current: Position,
    max: Position,
    listeners: Vec<ChangeListener>,
}

impl Queue {
    /// Create a new, empty queue
    ///
    /// Fails if `capacity` is zero.
    pub fn new(name: impl Into<String>, capacity: usize) -> QueueResult<Self> {
        let name = name.into();
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity { queue: name, capacity });
        }

        Ok(Self {
            name,
            capacity,
            buffer: VecDeque::with_capacity(capacity),
            empty: 0,
            current: 0,
            max: 0,
            listeners: Vec::new(),
        })
    }

    /// Queue name (unique within a registry)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum number of retained items
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Position before the oldest retained item
    pub fn empty(&self) -> Position {
        self.empty
    }

    /// Consumption cursor
    pub fn current(&self) -> Position {
        self.current
    }

    /// Position of the most recently added item
    pub fn max(&self) -> Position {
        self.max
    }

    /// Number of retained items
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether no items are retained
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Append a value, evicting the oldest item if over capacity
    ///
    /// Never fails and never blocks. All change listeners run synchronously,
    /// in registration order, before this returns.
    pub fn add(&mut self, value: serde_json::Value, time: Option<DateTime<Utc>>) {
        self.push(QueueItem::new(value, time));
    }

    /// Append an already constructed item
    pub fn push(&mut self, item: QueueItem) {
        self.buffer.push_back(item);
        self.max += 1;

        if self.buffer.len() > self.capacity {
            self.buffer.pop_front();
            self.empty += 1;
            if self.empty > self.current {
                self.current = self.empty;
            }
        }

        trace!(
            queue = %self.name,
            empty = self.empty,
            current = self.current,
            max = self.max,
            "Item added"
        );

        self.call_changed();
    }

    /// Get the item at `index`
    ///
    /// Valid only for `empty < index <= max`.
    pub fn get(&self, index: Position) -> QueueResult<&QueueItem> {
        if index <= self.empty || index > self.max {
            return Err(QueueError::IndexOutOfRange {
                queue: self.name.clone(),
                index,
                empty: self.empty,
                max: self.max,
            });
        }

        let offset = (index - self.empty - 1) as usize;
        self.buffer
            .get(offset)
            .ok_or_else(|| QueueError::IndexOutOfRange {
                queue: self.name.clone(),
                index,
                empty: self.empty,
                max: self.max,
            })
    }

    /// The most recently added item, if any is retained
    pub fn latest(&self) -> Option<&QueueItem> {
        self.buffer.back()
    }

    /// Retained items with their positions, oldest first
    pub fn iter(&self) -> impl Iterator<Item = (Position, &QueueItem)> {
        let first = self.empty + 1;
        self.buffer
            .iter()
            .enumerate()
            .map(move |(offset, item)| (first + offset as Position, item))
    }

    /// Move the consumption cursor
    ///
    /// The new position must lie within `empty..=max`. Listeners are not
    /// notified; callers batch cursor moves and then call [`Queue::call_changed`].
    pub fn set_current(&mut self, position: Position) -> QueueResult<()> {
        if position < self.empty || position > self.max {
            return Err(QueueError::CursorOutOfRange {
                queue: self.name.clone(),
                requested: position,
                empty: self.empty,
                max: self.max,
            });
        }

        self.current = position;
        Ok(())
    }

    /// Register a change listener
    pub fn on_changed<F>(&mut self, listener: F)
    where
        F: Fn(&QueueSnapshot) + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Number of registered change listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Notify every listener of the current state
    ///
    /// A panicking listener is logged and skipped; the remaining listeners
    /// still run and the queue is unaffected.
    pub fn call_changed(&self) {
        if self.listeners.is_empty() {
            return;
        }

        let snapshot = self.snapshot();
        for listener in &self.listeners {
            let result = catch_unwind(AssertUnwindSafe(|| listener(&snapshot)));
            if let Err(panic) = result {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(queue = %self.name, error = %message, "Error in queue change listener");
            }
        }
    }

    /// Take a snapshot for observers
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            name: self.name.clone(),
            empty: self.empty,
            current: self.current,
            max: self.max,
            capacity: self.capacity,
            latest: self.latest().cloned(),
        }
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("empty", &self.empty)
            .field("current", &self.current)
            .field("max", &self.max)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
