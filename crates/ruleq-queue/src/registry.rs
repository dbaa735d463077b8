//! Process-wide registry of queues keyed by name

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use ruleq_core::QueueSnapshot;
use tracing::{debug, instrument};

use crate::error::{QueueError, QueueResult};
use crate::queue::Queue;

/// Owns every queue, keyed by unique name, in registration order
///
/// Queues are created once at startup and never removed.
#[derive(Debug, Default)]
pub struct QueueRegistry {
    queues: IndexMap<String, Queue>,
}

impl QueueRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a queue
    #[instrument(skip(self))]
    pub fn create(&mut self, name: &str, capacity: usize) -> QueueResult<&mut Queue> {
        if self.queues.contains_key(name) {
            return Err(QueueError::DuplicateQueue(name.to_string()));
        }

        let queue = Queue::new(name, capacity)?;
        debug!("Registering queue");
        let entry = self.queues.entry(name.to_string()).or_insert(queue);
        Ok(entry)
    }

    /// Get a queue by name
    pub fn get(&self, name: &str) -> Option<&Queue> {
        self.queues.get(name)
    }

    /// Get a mutable queue by name
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Queue> {
        self.queues.get_mut(name)
    }

    /// Whether a queue with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.queues.contains_key(name)
    }

    /// Add a value to the named queue
    pub fn add(
        &mut self,
        name: &str,
        value: serde_json::Value,
        time: Option<DateTime<Utc>>,
    ) -> QueueResult<()> {
        let queue = self
            .queues
            .get_mut(name)
            .ok_or_else(|| QueueError::UnknownQueue(name.to_string()))?;
        queue.add(value, time);
        Ok(())
    }

    /// Notify the listeners of the named queue
    pub fn call_changed(&self, name: &str) -> QueueResult<()> {
        let queue = self
            .queues
            .get(name)
            .ok_or_else(|| QueueError::UnknownQueue(name.to_string()))?;
        queue.call_changed();
        Ok(())
    }

    /// Iterate over all queues in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Queue> {
        self.queues.values()
    }

    /// Iterate mutably over all queues in registration order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Queue> {
        self.queues.values_mut()
    }

    /// Snapshots of every queue
    pub fn snapshots(&self) -> Vec<QueueSnapshot> {
        self.queues.values().map(Queue::snapshot).collect()
    }

    /// All queue names in registration order
    pub fn names(&self) -> Vec<String> {
        self.queues.keys().cloned().collect()
    }

    /// Number of queues
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    /// Whether the registry has no queues
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}
