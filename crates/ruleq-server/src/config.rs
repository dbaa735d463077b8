//! Server configuration
//!
//! ```yaml
//! engine:
//!   firing_policy: all
//! timers:
//!   1Hz:
//!     capacity: 1
//!     initial_value: 1
//!     interval_ms: 1000
//! queues:
//!   DS:LIGHT:
//!     capacity: 3
//! actuators:
//!   - PLUG_SET
//! rules:
//!   - name: lights-off
//!     ...
//! ```

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use ruleq_config::{load_config, ConfigResult};
use ruleq_rules::{ActuatorCall, ActuatorRegistry, EngineConfig, RuleConfig};
use ruleq_runtime::{QueueConfig, RuntimeBuilder, RuntimeResult, TimerConfig};
use serde::Deserialize;
use tracing::info;

/// Top-level configuration document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    /// Queues fed through the engine handle
    pub queues: IndexMap<String, QueueConfig>,
    pub timers: IndexMap<String, TimerConfig>,
    /// Actuator ids served by the logging actuator
    pub actuators: Vec<String>,
    pub rules: Vec<RuleConfig>,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        load_config(path)
    }

    /// Registry with a logging actuator for every configured id
    ///
    /// Manual queues are registered as read-only so that actuating one is
    /// reported as such rather than as an unknown actuator.
    pub fn actuator_registry(&self) -> Arc<ActuatorRegistry> {
        let registry = ActuatorRegistry::new();
        for name in self.queues.keys() {
            registry.register_read_only(name.clone());
        }
        for id in &self.actuators {
            registry.register(id.clone(), |call: ActuatorCall| async move {
                info!(
                    actuator = %call.actuator,
                    rule = %call.rule,
                    call_id = %call.id,
                    value = %call.value,
                    "Actuate"
                );
                Ok(())
            });
        }
        Arc::new(registry)
    }

    /// Declare every queue, timer and rule on a runtime builder
    pub fn builder(&self, actuators: Arc<ActuatorRegistry>) -> RuntimeResult<RuntimeBuilder> {
        let mut builder = RuntimeBuilder::new(self.engine.clone(), actuators);
        for (name, queue) in &self.queues {
            builder.add_queue(name, queue)?;
        }
        for (name, timer) in &self.timers {
            builder.add_timer(name, timer)?;
        }
        for rule in &self.rules {
            builder.add_rule(rule.clone())?;
        }
        Ok(builder)
    }
}
