//! Engine runtime
//!
//! A single tokio task owns the [`QueueRegistry`] and the [`RuleEngine`].
//! Queue sources and management calls reach it through an [`EngineHandle`];
//! queue change listeners only mark a pass as pending on the shared
//! [`ChangeNotifier`], and the task runs that pass once the current burst of
//! commands has been handled.

use std::sync::Arc;
use std::time::Duration;

use ruleq_core::QueueSnapshot;
use ruleq_queue::{Queue, QueueRegistry};
use ruleq_rules::{ActuatorRegistry, EngineConfig, RuleConfig, RuleEngine};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::handle::{Command, EngineHandle};
use crate::notifier::ChangeNotifier;
use crate::source::{self, QueueConfig, TimerConfig};

const COMMAND_BUFFER: usize = 256;
const SNAPSHOT_BUFFER: usize = 1024;

/// Counters kept by the engine task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    /// Evaluation passes run
    pub passes: u64,
    /// Rule firings across all passes
    pub rules_fired: u64,
    /// Items added through the handle, timers included
    pub items_added: u64,
}

/// Collects queues, timers and rules before the engine starts
pub struct RuntimeBuilder {
    queues: QueueRegistry,
    engine: RuleEngine,
    timers: Vec<(String, Duration)>,
}

impl RuntimeBuilder {
    pub fn new(config: EngineConfig, actuators: Arc<ActuatorRegistry>) -> Self {
        Self {
            queues: QueueRegistry::new(),
            engine: RuleEngine::new(config, actuators),
            timers: Vec::new(),
        }
    }

    /// Declare a queue fed through [`EngineHandle::add`]
    pub fn add_queue(&mut self, name: &str, config: &QueueConfig) -> RuntimeResult<&mut Self> {
        self.queues.create(name, config.capacity)?;
        Ok(self)
    }

    /// Declare a timer queue, pre-filled with its initial items
    pub fn add_timer(&mut self, name: &str, config: &TimerConfig) -> RuntimeResult<&mut Self> {
        if config.interval_ms == 0 {
            return Err(RuntimeError::InvalidTimer {
                name: name.to_string(),
                reason: "interval_ms must be greater than zero".to_string(),
            });
        }

        let queue = self.queues.create(name, config.capacity)?;
        source::prefill(queue, config.initial_value);
        self.timers.push((name.to_string(), config.interval()));
        Ok(self)
    }

    /// Compile and register a rule
    pub fn add_rule(&mut self, config: RuleConfig) -> RuntimeResult<&mut Self> {
        self.engine.add_rule(config)?;
        Ok(self)
    }

    /// Spawn the engine task and the timers
    ///
    /// Must be called from within a tokio runtime. An initial pass runs as
    /// soon as the task starts, so rules see pre-filled queues.
    pub fn start(self) -> RunningEngine {
        let Self {
            mut queues,
            engine,
            timers,
        } = self;

        let notifier = Arc::new(ChangeNotifier::new());
        let (snapshots, _) = broadcast::channel(SNAPSHOT_BUFFER);
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);

        for queue in queues.iter_mut() {
            watch_queue(queue, notifier.clone(), snapshots.clone());
        }

        let handle = EngineHandle::new(commands, snapshots);
        let timers = timers
            .into_iter()
            .map(|(name, period)| source::spawn_timer(name, period, handle.clone()))
            .collect();

        info!(
            queues = queues.len(),
            rules = engine.len(),
            "Starting rule engine runtime"
        );

        notifier.schedule();
        let actor = EngineTask {
            queues,
            engine,
            notifier,
            timers,
            stats: RuntimeStats::default(),
        };
        let task = tokio::spawn(actor.run(rx));

        RunningEngine { handle, task }
    }
}

/// Schedule a pass and publish a snapshot whenever the queue changes
fn watch_queue(
    queue: &mut Queue,
    notifier: Arc<ChangeNotifier>,
    snapshots: broadcast::Sender<QueueSnapshot>,
) {
    queue.on_changed(move |snapshot| {
        notifier.schedule();
        // No subscribers is not an error
        let _ = snapshots.send(snapshot.clone());
    });
}

/// A started engine
#[derive(Debug)]
pub struct RunningEngine {
    handle: EngineHandle,
    task: JoinHandle<()>,
}

impl RunningEngine {
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Stop the engine and wait for its task to finish
    pub async fn shutdown(self) -> RuntimeResult<()> {
        self.handle.shutdown().await?;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Engine task ended abnormally");
        }
        Ok(())
    }
}

enum Flow {
    Continue,
    Stop,
}

struct EngineTask {
    queues: QueueRegistry,
    engine: RuleEngine,
    notifier: Arc<ChangeNotifier>,
    timers: Vec<JoinHandle<()>>,
    stats: RuntimeStats,
}

impl EngineTask {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let notifier = self.notifier.clone();
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => {
                    let Some(command) = command else {
                        info!("All engine handles dropped");
                        break;
                    };
                    if let Flow::Stop = self.handle_burst(command, &mut commands) {
                        break;
                    }
                }
                _ = notifier.notified() => self.run_pending_pass(),
            }
        }

        for timer in &self.timers {
            timer.abort();
        }
        info!("Rule engine runtime stopped");
    }

    /// Handle a command and everything queued behind it, then run one pass
    fn handle_burst(&mut self, first: Command, commands: &mut mpsc::Receiver<Command>) -> Flow {
        if let Flow::Stop = self.handle_command(first) {
            return Flow::Stop;
        }
        while let Ok(command) = commands.try_recv() {
            if let Flow::Stop = self.handle_command(command) {
                return Flow::Stop;
            }
        }
        self.run_pending_pass();
        Flow::Continue
    }

    fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Add {
                queue,
                value,
                time,
                reply,
            } => {
                let result = self.queues.add(&queue, value, time);
                match &result {
                    Ok(()) => self.stats.items_added += 1,
                    Err(e) => warn!(queue = %queue, error = %e, "Add to unknown queue"),
                }
                let _ = reply.send(result.map_err(RuntimeError::from));
            }
            Command::AddRule { config, reply } => {
                let result = self.engine.add_rule(*config);
                if result.is_ok() {
                    self.notifier.schedule();
                }
                let _ = reply.send(result.map_err(RuntimeError::from));
            }
            Command::EnableRule { name, reply } => {
                let result = self.engine.enable_rule(&name);
                if result.is_ok() {
                    self.notifier.schedule();
                }
                let _ = reply.send(result.map_err(RuntimeError::from));
            }
            Command::DisableRule { name, reply } => {
                let result = self.engine.disable_rule(&name);
                let _ = reply.send(result.map_err(RuntimeError::from));
            }
            Command::FireRule {
                name,
                fire_id,
                reply,
            } => {
                let result = self.engine.fire_rule(&name, fire_id);
                if result.is_ok() {
                    self.notifier.schedule();
                }
                let _ = reply.send(result.map_err(RuntimeError::from));
            }
            Command::GetRules { reply } => {
                self.run_pending_pass();
                let _ = reply.send(Ok(self.engine.get_rules()));
            }
            Command::GetQueues { reply } => {
                self.run_pending_pass();
                let _ = reply.send(Ok(self.queues.snapshots()));
            }
            Command::Stats { reply } => {
                self.run_pending_pass();
                let _ = reply.send(Ok(self.stats));
            }
            Command::Shutdown { reply } => {
                info!("Shutting down rule engine runtime");
                let _ = reply.send(());
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// Run the pending pass, if any
    ///
    /// Updates made by a pass notify their queues, which schedules a follow-up
    /// pass. That pass runs on a later turn of the loop so commands are never
    /// starved by rules that keep changing their own queues.
    fn run_pending_pass(&mut self) {
        if self.notifier.take() {
            let report = self.engine.check_rules(&mut self.queues);
            self.stats.passes += 1;
            self.stats.rules_fired += report.fired_count() as u64;
            debug!(
                pass = self.stats.passes,
                evaluated = report.evaluated.len(),
                fired = report.fired_count(),
                armed = report.armed.len(),
                disabled = report.disabled.len(),
                "Pass complete"
            );
        }
    }
}
