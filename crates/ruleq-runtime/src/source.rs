//! Queue sources: manual queues and timers

use std::time::Duration;

use chrono::Utc;
use ruleq_core::{QueueItem, DEFAULT_CAPACITY};
use ruleq_queue::Queue;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::handle::EngineHandle;

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

/// A queue fed only through [`EngineHandle::add`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

/// A queue filled with `true` by a periodic timer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Number of items added at startup
    #[serde(default, alias = "initialvalue")]
    pub initial_value: usize,

    /// Tick period; the first tick comes one period after start
    #[serde(alias = "intervalms")]
    pub interval_ms: u64,
}

impl TimerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Add the timer's startup items
pub(crate) fn prefill(queue: &mut Queue, count: usize) {
    for _ in 0..count {
        queue.push(QueueItem::now(json!(true)));
    }
}

/// Spawn the task that ticks a timer queue
///
/// The task stops once the engine no longer accepts commands.
pub(crate) fn spawn_timer(name: String, period: Duration, handle: EngineHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            trace!(timer = %name, "Timer tick");
            if handle.add(&name, json!(true), Some(Utc::now())).await.is_err() {
                debug!(timer = %name, "Engine closed, stopping timer");
                break;
            }
        }
    })
}
