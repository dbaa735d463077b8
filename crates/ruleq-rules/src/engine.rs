//! Rule registry and evaluation passes

use std::sync::Arc;

use indexmap::IndexMap;
use ruleq_expr::Evaluator;
use ruleq_queue::QueueRegistry;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::actuator::ActuatorRegistry;
use crate::config::{EngineConfig, FiringPolicy, RuleConfig};
use crate::error::{RuleError, RuleResult};
use crate::rule::{Rule, RuleInfo};

/// Summary of one evaluation pass, rule names in evaluation order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Rules whose preconditions were evaluated
    pub evaluated: Vec<String>,
    /// Rules that fired
    pub fired: Vec<String>,
    /// Manual rules left armed and waiting for confirmation
    pub armed: Vec<String>,
    /// Rules disabled by a fault during this pass
    pub disabled: Vec<String>,
}

impl PassReport {
    /// Number of rules that fired
    pub fn fired_count(&self) -> usize {
        self.fired.len()
    }
}

/// Holds every rule, in registration order, and runs passes over them
///
/// Rules are added once at startup and never removed; disabling is the
/// soft delete.
#[derive(Debug)]
pub struct RuleEngine {
    rules: IndexMap<String, Rule>,
    actuators: Arc<ActuatorRegistry>,
    evaluator: Evaluator,
    config: EngineConfig,
}

impl RuleEngine {
    pub fn new(config: EngineConfig, actuators: Arc<ActuatorRegistry>) -> Self {
        Self {
            rules: IndexMap::new(),
            actuators,
            evaluator: Evaluator::new(config.max_expression_steps),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn actuators(&self) -> &Arc<ActuatorRegistry> {
        &self.actuators
    }

    /// Compile and register a rule
    #[instrument(skip(self, config), fields(rule = %config.name))]
    pub fn add_rule(&mut self, config: RuleConfig) -> RuleResult<()> {
        if self.rules.contains_key(&config.name) {
            return Err(RuleError::AlreadyExists(config.name));
        }

        let rule = Rule::from_config(config)?;
        info!(
            priority = rule.priority(),
            manual = rule.is_manual(),
            enabled = rule.is_enabled(),
            "Added rule"
        );
        self.rules.insert(rule.name().to_string(), rule);
        Ok(())
    }

    /// Re-enable a rule, clearing its last error
    pub fn enable_rule(&mut self, name: &str) -> RuleResult<()> {
        let rule = self.rule_mut(name)?;
        rule.enable();
        info!("Enabled rule: {}", name);
        Ok(())
    }

    pub fn disable_rule(&mut self, name: &str) -> RuleResult<()> {
        let rule = self.rule_mut(name)?;
        rule.disable();
        info!("Disabled rule: {}", name);
        Ok(())
    }

    /// Confirm a manual rule's arming
    ///
    /// Stores `fire_id` and returns whether it matches the rule's current
    /// `armed_id`. The rule fires on the next pass if it is still ready.
    pub fn fire_rule(&mut self, name: &str, fire_id: u64) -> RuleResult<bool> {
        let rule = self.rule_mut(name)?;
        let matched = rule.confirm(fire_id);
        debug!(
            rule = %name,
            fire_id,
            armed_id = rule.armed_id(),
            matched,
            "Fire requested"
        );
        Ok(matched)
    }

    pub fn get_rules(&self) -> Vec<RuleInfo> {
        self.rules.values().map(Rule::info).collect()
    }

    pub fn get_rule(&self, name: &str) -> Option<RuleInfo> {
        self.rules.get(name).map(Rule::info)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn rule_mut(&mut self, name: &str) -> RuleResult<&mut Rule> {
        self.rules
            .get_mut(name)
            .ok_or_else(|| RuleError::NotFound(name.to_string()))
    }

    /// Run one evaluation pass over every enabled rule
    ///
    /// Rules are evaluated in ascending priority, ties in registration order.
    /// A fault in one rule disables that rule and never stops the pass.
    #[instrument(skip_all)]
    pub fn check_rules(&mut self, queues: &mut QueueRegistry) -> PassReport {
        for rule in self.rules.values_mut() {
            rule.begin_pass();
        }

        let mut order: Vec<usize> = self
            .rules
            .values()
            .enumerate()
            .filter(|(_, rule)| rule.is_enabled())
            .map(|(index, _)| index)
            .collect();
        order.sort_by_key(|&index| self.rules[index].priority());

        let mut report = PassReport::default();
        for index in order {
            let Some((name, rule)) = self.rules.get_index_mut(index) else {
                continue;
            };
            report.evaluated.push(name.clone());

            let outcome = rule.evaluate(queues, &self.evaluator, &self.actuators);
            if outcome.fired {
                report.fired.push(name.clone());
            } else if outcome.armed {
                report.armed.push(name.clone());
            }
            if outcome.disabled {
                report.disabled.push(name.clone());
            }

            if outcome.fired && self.config.firing_policy == FiringPolicy::HighestPriority {
                break;
            }
        }

        debug!(
            evaluated = report.evaluated.len(),
            fired = report.fired.len(),
            armed = report.armed.len(),
            disabled = report.disabled.len(),
            "Rule pass complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleState;
    use serde_json::json;

    fn engine() -> RuleEngine {
        RuleEngine::new(EngineConfig::default(), Arc::new(ActuatorRegistry::new()))
    }

    fn timer_queue() -> QueueRegistry {
        let mut queues = QueueRegistry::new();
        queues.create("1Hz", 1).unwrap();
        queues
    }

    fn tick_rule(name: &str, priority: i64) -> RuleConfig {
        RuleConfig::new(name)
            .with_priority(priority)
            .bind("timer", "1Hz")
            .precondition("timer.max > timer.current")
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let mut engine = engine();
        engine.add_rule(RuleConfig::new("r1")).unwrap();
        assert!(matches!(
            engine.add_rule(RuleConfig::new("r1")),
            Err(RuleError::AlreadyExists(name)) if name == "r1"
        ));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_unknown_rule_operations() {
        let mut engine = engine();
        assert!(matches!(engine.enable_rule("x"), Err(RuleError::NotFound(_))));
        assert!(matches!(engine.disable_rule("x"), Err(RuleError::NotFound(_))));
        assert!(matches!(engine.fire_rule("x", 1), Err(RuleError::NotFound(_))));
    }

    #[test]
    fn test_timer_scenario_fires_once() {
        let mut engine = engine();
        let mut queues = timer_queue();
        engine
            .add_rule(tick_rule("tick", 0).update("timer.current++"))
            .unwrap();
        queues.add("1Hz", json!(true), None).unwrap();

        let report = engine.check_rules(&mut queues);
        assert_eq!(report.fired, vec!["tick"]);
        assert_eq!(queues.get("1Hz").unwrap().current(), 1);

        let report = engine.check_rules(&mut queues);
        assert_eq!(report.fired_count(), 0);
        assert_eq!(engine.get_rule("tick").unwrap().activated_count, 1);
    }

    #[test]
    fn test_priority_order_with_stable_ties() {
        let mut engine = engine();
        let mut queues = timer_queue();
        for (name, priority) in [("c", 2), ("a", 1), ("b", 2), ("z", 0)] {
            engine.add_rule(tick_rule(name, priority)).unwrap();
        }
        queues.add("1Hz", json!(true), None).unwrap();

        let report = engine.check_rules(&mut queues);
        assert_eq!(report.evaluated, vec!["z", "a", "c", "b"]);
        assert_eq!(report.fired, vec!["z", "a", "c", "b"]);
    }

    #[test]
    fn test_highest_priority_policy_stops_after_first_fire() {
        let config = EngineConfig {
            firing_policy: FiringPolicy::HighestPriority,
            ..EngineConfig::default()
        };
        let mut engine = RuleEngine::new(config, Arc::new(ActuatorRegistry::new()));
        let mut queues = timer_queue();
        engine.add_rule(tick_rule("second", 2)).unwrap();
        engine.add_rule(tick_rule("first", 1)).unwrap();
        queues.add("1Hz", json!(true), None).unwrap();

        let report = engine.check_rules(&mut queues);
        assert_eq!(report.fired, vec!["first"]);
        assert_eq!(report.evaluated, vec!["first"]);
    }

    #[test]
    fn test_throwing_precondition_disables_rule() {
        let mut engine = engine();
        let mut queues = timer_queue();
        engine
            .add_rule(tick_rule("broken", 0).precondition("timer.get(timer.max + 5).value"))
            .unwrap();
        engine.add_rule(tick_rule("healthy", 1)).unwrap();
        queues.add("1Hz", json!(true), None).unwrap();

        let report = engine.check_rules(&mut queues);
        assert_eq!(report.disabled, vec!["broken"]);
        assert_eq!(report.fired, vec!["healthy"]);

        let info = engine.get_rule("broken").unwrap();
        assert!(!info.enabled);
        assert_eq!(info.state, RuleState::Disabled);
        assert!(info.last_error.is_some());

        let report = engine.check_rules(&mut queues);
        assert_eq!(report.evaluated, vec!["healthy"]);
    }

    #[test]
    fn test_disabled_rule_skipped_until_enabled() {
        let mut engine = engine();
        let mut queues = timer_queue();
        engine.add_rule(tick_rule("r", 0)).unwrap();
        engine.disable_rule("r").unwrap();
        queues.add("1Hz", json!(true), None).unwrap();

        assert!(engine.check_rules(&mut queues).evaluated.is_empty());

        engine.enable_rule("r").unwrap();
        assert_eq!(engine.check_rules(&mut queues).fired, vec!["r"]);
    }

    #[test]
    fn test_rule_configured_disabled() {
        let mut engine = engine();
        let mut queues = timer_queue();
        let mut config = tick_rule("off", 0);
        config.enabled = false;
        engine.add_rule(config).unwrap();
        queues.add("1Hz", json!(true), None).unwrap();

        assert!(engine.check_rules(&mut queues).evaluated.is_empty());
        assert_eq!(engine.get_rules()[0].state, RuleState::Disabled);
    }

    #[test]
    fn test_update_fault_disables_rule() {
        let mut engine = engine();
        let mut queues = timer_queue();
        engine
            .add_rule(tick_rule("r", 0).update("timer.max = 0"))
            .unwrap();
        queues.add("1Hz", json!(true), None).unwrap();

        let report = engine.check_rules(&mut queues);
        assert_eq!(report.fired, vec!["r"]);
        assert_eq!(report.disabled, vec!["r"]);
        assert!(engine.get_rule("r").unwrap().last_error.unwrap().contains("read-only"));
    }

    #[test]
    fn test_empty_preconditions_always_fire() {
        let mut engine = engine();
        let mut queues = QueueRegistry::new();
        engine.add_rule(RuleConfig::new("always")).unwrap();

        assert_eq!(engine.check_rules(&mut queues).fired_count(), 1);
        assert_eq!(engine.check_rules(&mut queues).fired_count(), 1);
    }
}
