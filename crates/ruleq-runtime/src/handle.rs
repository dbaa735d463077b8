//! Command handle for the engine task

use chrono::{DateTime, Utc};
use ruleq_core::QueueSnapshot;
use ruleq_rules::{RuleConfig, RuleInfo};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::RuntimeStats;

type Reply<T> = oneshot::Sender<RuntimeResult<T>>;

/// Messages handled by the engine task
#[derive(Debug)]
pub(crate) enum Command {
    Add {
        queue: String,
        value: serde_json::Value,
        time: Option<DateTime<Utc>>,
        reply: Reply<()>,
    },
    AddRule {
        config: Box<RuleConfig>,
        reply: Reply<()>,
    },
    EnableRule {
        name: String,
        reply: Reply<()>,
    },
    DisableRule {
        name: String,
        reply: Reply<()>,
    },
    FireRule {
        name: String,
        fire_id: u64,
        reply: Reply<bool>,
    },
    GetRules {
        reply: Reply<Vec<RuleInfo>>,
    },
    GetQueues {
        reply: Reply<Vec<QueueSnapshot>>,
    },
    Stats {
        reply: Reply<RuntimeStats>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running engine
///
/// Every method is a round trip to the engine task. Once the task has
/// stopped they all fail with [`RuntimeError::Closed`].
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    snapshots: broadcast::Sender<QueueSnapshot>,
}

impl EngineHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        snapshots: broadcast::Sender<QueueSnapshot>,
    ) -> Self {
        Self {
            commands,
            snapshots,
        }
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> RuntimeResult<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| RuntimeError::Closed)?;
        rx.await.map_err(|_| RuntimeError::Closed)?
    }

    /// Add a value to a queue; `time` is absent for non time-series sources
    pub async fn add(
        &self,
        queue: &str,
        value: serde_json::Value,
        time: Option<DateTime<Utc>>,
    ) -> RuntimeResult<()> {
        self.request(|reply| Command::Add {
            queue: queue.to_string(),
            value,
            time,
            reply,
        })
        .await
    }

    pub async fn add_rule(&self, config: RuleConfig) -> RuntimeResult<()> {
        self.request(|reply| Command::AddRule {
            config: Box::new(config),
            reply,
        })
        .await
    }

    pub async fn enable_rule(&self, name: &str) -> RuntimeResult<()> {
        self.request(|reply| Command::EnableRule {
            name: name.to_string(),
            reply,
        })
        .await
    }

    pub async fn disable_rule(&self, name: &str) -> RuntimeResult<()> {
        self.request(|reply| Command::DisableRule {
            name: name.to_string(),
            reply,
        })
        .await
    }

    /// Confirm a manual rule's arming; returns whether `fire_id` matched
    pub async fn fire_rule(&self, name: &str, fire_id: u64) -> RuntimeResult<bool> {
        self.request(|reply| Command::FireRule {
            name: name.to_string(),
            fire_id,
            reply,
        })
        .await
    }

    pub async fn get_rules(&self) -> RuntimeResult<Vec<RuleInfo>> {
        self.request(|reply| Command::GetRules { reply }).await
    }

    pub async fn get_queues(&self) -> RuntimeResult<Vec<QueueSnapshot>> {
        self.request(|reply| Command::GetQueues { reply }).await
    }

    pub async fn stats(&self) -> RuntimeResult<RuntimeStats> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Receive a snapshot every time a queue changes
    pub fn subscribe(&self) -> broadcast::Receiver<QueueSnapshot> {
        self.snapshots.subscribe()
    }

    /// Stop the engine task and its timers
    pub async fn shutdown(&self) -> RuntimeResult<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Shutdown { reply })
            .await
            .map_err(|_| RuntimeError::Closed)?;
        rx.await.map_err(|_| RuntimeError::Closed)
    }
}
