//! Rule and engine configuration records

use indexmap::IndexMap;
use ruleq_expr::DEFAULT_MAX_STEPS;
use serde::{Deserialize, Serialize};

/// Rule configuration from YAML
///
/// ```yaml
/// name: lights-off
/// priority: 1
/// qs:
///   timer: 1Hz
///   light: DS:LIGHT
/// preconditions:
///   - timer.max > timer.current
///   - light.max > light.empty
///   - light.get(light.max).value[1] > 0
/// actions:
///   - actuator: TPLINK_PLUG_SET
///     value: "{data: 'off'}"
/// updates:
///   - timer.current++
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Unique rule name
    pub name: String,

    /// Whether the rule takes part in passes
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Lower runs first
    #[serde(default)]
    pub priority: i64,

    /// Require an external fire confirmation once armed
    #[serde(default)]
    pub manual: bool,

    /// Local binding name to queue name
    #[serde(default)]
    pub qs: IndexMap<String, String>,

    /// Conditions that must all hold, evaluated in order
    #[serde(default, alias = "precondition")]
    pub preconditions: Vec<String>,

    /// Actuator commands issued when the rule fires
    #[serde(default, alias = "action")]
    pub actions: Vec<ActionConfig>,

    /// Expressions run after the actions, typically advancing a cursor
    #[serde(default, alias = "update")]
    pub updates: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl RuleConfig {
    /// A minimal enabled rule with no bindings or expressions
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            priority: 0,
            manual: false,
            qs: IndexMap::new(),
            preconditions: Vec::new(),
            actions: Vec::new(),
            updates: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn manual(mut self) -> Self {
        self.manual = true;
        self
    }

    pub fn bind(mut self, binding: impl Into<String>, queue: impl Into<String>) -> Self {
        self.qs.insert(binding.into(), queue.into());
        self
    }

    pub fn precondition(mut self, expression: impl Into<String>) -> Self {
        self.preconditions.push(expression.into());
        self
    }

    pub fn action(mut self, actuator: impl Into<String>, value: impl Into<String>) -> Self {
        self.actions.push(ActionConfig {
            actuator: actuator.into(),
            value: value.into(),
        });
        self
    }

    pub fn update(mut self, expression: impl Into<String>) -> Self {
        self.updates.push(expression.into());
        self
    }
}

/// One actuator command of a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    /// Actuator identifier
    pub actuator: String,

    /// Expression producing the value sent to the actuator
    pub value: String,
}

/// How many ready rules fire in one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FiringPolicy {
    /// Every ready rule fires, in priority order
    #[default]
    All,

    /// The pass stops after the first rule that fires
    HighestPriority,
}

/// Engine-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub firing_policy: FiringPolicy,

    /// Step budget for a single expression evaluation
    #[serde(default = "default_max_expression_steps")]
    pub max_expression_steps: usize,
}

fn default_max_expression_steps() -> usize {
    DEFAULT_MAX_STEPS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            firing_policy: FiringPolicy::default(),
            max_expression_steps: default_max_expression_steps(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_config_defaults() {
        let config: RuleConfig = serde_json::from_value(serde_json::json!({
            "name": "r1",
        }))
        .unwrap();

        assert!(config.enabled);
        assert_eq!(config.priority, 0);
        assert!(!config.manual);
        assert!(config.qs.is_empty());
        assert!(config.preconditions.is_empty());
    }

    #[test]
    fn test_rule_config_full() {
        let config: RuleConfig = serde_json::from_value(serde_json::json!({
            "name": "lights-off",
            "priority": 2,
            "manual": true,
            "qs": {"timer": "1Hz", "plug": "DS:PLUG"},
            "preconditions": ["timer.max > timer.current"],
            "actions": [{"actuator": "PLUG_SET", "value": "{data: 'off'}"}],
            "updates": ["timer.current++"],
        }))
        .unwrap();

        assert_eq!(config.priority, 2);
        assert!(config.manual);
        assert_eq!(config.qs.keys().collect::<Vec<_>>(), vec!["timer", "plug"]);
        assert_eq!(config.actions[0].actuator, "PLUG_SET");
    }

    #[test]
    fn test_engine_config_policy_names() {
        let config: EngineConfig =
            serde_json::from_value(serde_json::json!({"firing_policy": "highest_priority"}))
                .unwrap();
        assert_eq!(config.firing_policy, FiringPolicy::HighestPriority);
        assert_eq!(config.max_expression_steps, DEFAULT_MAX_STEPS);
        assert_eq!(EngineConfig::default().firing_policy, FiringPolicy::All);
    }
}
