//! A compiled rule and its per-pass state machine

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use ruleq_expr::{EvalError, Evaluator, Expression};
use ruleq_queue::QueueRegistry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::actuator::{log_dispatch_error, ActuatorCall, ActuatorRegistry};
use crate::config::{ActionConfig, RuleConfig};
use crate::error::{RuleError, RuleResult};
use crate::scope::QueueScope;

/// Observable rule state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleState {
    /// Skipped by every pass until re-enabled
    Disabled,
    /// Enabled, waiting for its preconditions
    Idle,
    /// Manual rule whose preconditions hold, waiting for confirmation
    Armed,
}

/// Snapshot of a rule for listing and UIs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleInfo {
    pub name: String,
    pub enabled: bool,
    pub priority: i64,
    pub manual: bool,
    pub state: RuleState,
    pub armed: bool,
    pub armed_id: u64,
    pub fire_id: u64,
    pub activated_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fired: Option<DateTime<Utc>>,
    pub qs: IndexMap<String, String>,
    pub preconditions: Vec<String>,
    pub actions: Vec<ActionConfig>,
    pub updates: Vec<String>,
}

#[derive(Debug, Clone)]
struct Action {
    actuator: String,
    value: Expression,
}

/// What happened to a rule in one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Outcome {
    pub fired: bool,
    pub armed: bool,
    pub disabled: bool,
}

/// A rule with its expressions compiled
#[derive(Debug, Clone)]
pub struct Rule {
    config: RuleConfig,
    preconditions: Vec<Expression>,
    actions: Vec<Action>,
    updates: Vec<Expression>,
    /// Bindings used by any expression
    referenced: BTreeSet<String>,

    enabled: bool,
    armed: bool,
    was_armed: bool,
    armed_id: u64,
    fire_id: u64,
    activated_count: u64,
    last_error: Option<String>,
    last_fired: Option<DateTime<Utc>>,
}

impl Rule {
    /// Compile a rule from its configuration
    pub fn from_config(config: RuleConfig) -> RuleResult<Self> {
        if config.name.trim().is_empty() {
            return Err(RuleError::InvalidConfig("rule name is empty".to_string()));
        }

        let compile = |source: &str| {
            Expression::parse(source).map_err(|source_err| RuleError::InvalidExpression {
                rule: config.name.clone(),
                expression: source.to_string(),
                source: source_err,
            })
        };

        let preconditions = config
            .preconditions
            .iter()
            .map(|s| compile(s))
            .collect::<RuleResult<Vec<_>>>()?;
        let actions = config
            .actions
            .iter()
            .map(|a| -> RuleResult<Action> {
                Ok(Action {
                    actuator: a.actuator.clone(),
                    value: compile(&a.value)?,
                })
            })
            .collect::<RuleResult<Vec<_>>>()?;
        let updates = config
            .updates
            .iter()
            .map(|s| compile(s))
            .collect::<RuleResult<Vec<_>>>()?;

        let referenced = preconditions
            .iter()
            .chain(actions.iter().map(|a| &a.value))
            .chain(updates.iter())
            .flat_map(Expression::identifiers)
            .collect();

        Ok(Self {
            enabled: config.enabled,
            config,
            preconditions,
            actions,
            updates,
            referenced,
            armed: false,
            was_armed: false,
            armed_id: 0,
            fire_id: 0,
            activated_count: 0,
            last_error: None,
            last_fired: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn priority(&self) -> i64 {
        self.config.priority
    }

    pub fn is_manual(&self) -> bool {
        self.config.manual
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn armed_id(&self) -> u64 {
        self.armed_id
    }

    pub fn fire_id(&self) -> u64 {
        self.fire_id
    }

    pub fn activated_count(&self) -> u64 {
        self.activated_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn state(&self) -> RuleState {
        if !self.enabled {
            RuleState::Disabled
        } else if self.armed {
            RuleState::Armed
        } else {
            RuleState::Idle
        }
    }

    pub fn info(&self) -> RuleInfo {
        RuleInfo {
            name: self.config.name.clone(),
            enabled: self.enabled,
            priority: self.config.priority,
            manual: self.config.manual,
            state: self.state(),
            armed: self.armed,
            armed_id: self.armed_id,
            fire_id: self.fire_id,
            activated_count: self.activated_count,
            last_error: self.last_error.clone(),
            last_fired: self.last_fired,
            qs: self.config.qs.clone(),
            preconditions: self.config.preconditions.clone(),
            actions: self.config.actions.clone(),
            updates: self.config.updates.clone(),
        }
    }

    /// Re-enable and clear the last error
    pub(crate) fn enable(&mut self) {
        self.enabled = true;
        self.last_error = None;
    }

    pub(crate) fn disable(&mut self) {
        self.enabled = false;
        self.armed = false;
    }

    /// Record an external confirmation; true if it matches the open window
    pub(crate) fn confirm(&mut self, fire_id: u64) -> bool {
        self.fire_id = fire_id;
        self.fire_id == self.armed_id
    }

    /// Start of a pass: manual arming must be re-asserted every pass
    pub(crate) fn begin_pass(&mut self) {
        self.was_armed = self.armed;
        self.armed = false;
    }

    /// Evaluate the rule once: preconditions, then fire and update if ready
    pub(crate) fn evaluate(
        &mut self,
        queues: &mut QueueRegistry,
        evaluator: &Evaluator,
        actuators: &ActuatorRegistry,
    ) -> Outcome {
        let ready = self
            .check_bindings(queues)
            .and_then(|()| self.preconditions_hold(queues, evaluator));

        match ready {
            Ok(true) => {}
            Ok(false) => return Outcome::default(),
            Err(e) => {
                self.fault(e);
                return Outcome {
                    disabled: true,
                    ..Outcome::default()
                };
            }
        }

        if self.config.manual {
            self.armed = true;
            if !self.was_armed {
                self.armed_id += 1;
                info!(rule = %self.config.name, armed_id = self.armed_id, "Rule armed");
            }
            if self.fire_id != self.armed_id {
                return Outcome {
                    armed: true,
                    ..Outcome::default()
                };
            }
            self.armed_id += 1;
        }

        let disabled = self.fire(queues, evaluator, actuators);
        Outcome {
            fired: true,
            armed: self.armed,
            disabled,
        }
    }

    fn check_bindings(&self, queues: &QueueRegistry) -> RuleResult<()> {
        for binding in &self.referenced {
            if let Some(queue) = self.config.qs.get(binding) {
                if !queues.contains(queue) {
                    return Err(RuleError::Binding {
                        rule: self.config.name.clone(),
                        binding: binding.clone(),
                        queue: queue.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn preconditions_hold(
        &self,
        queues: &mut QueueRegistry,
        evaluator: &Evaluator,
    ) -> RuleResult<bool> {
        let mut scope = QueueScope::new(&self.config.qs, queues);
        for expression in &self.preconditions {
            let holds = evaluator
                .evaluate_bool(expression, &mut scope)
                .map_err(|e| self.expression_error(expression, e))?;
            if !holds {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Run actions then updates; returns whether the rule was disabled
    fn fire(
        &mut self,
        queues: &mut QueueRegistry,
        evaluator: &Evaluator,
        actuators: &ActuatorRegistry,
    ) -> bool {
        self.activated_count += 1;
        self.last_fired = Some(Utc::now());
        info!(
            rule = %self.config.name,
            activated_count = self.activated_count,
            "Rule fired"
        );

        let action_result = self.run_actions(queues, evaluator, actuators);
        let update_result = self.run_updates(queues, evaluator);

        let mut disabled = false;
        for err in [action_result.err(), update_result.err()].into_iter().flatten() {
            self.fault(err);
            disabled = true;
        }
        disabled
    }

    fn run_actions(
        &self,
        queues: &mut QueueRegistry,
        evaluator: &Evaluator,
        actuators: &ActuatorRegistry,
    ) -> RuleResult<()> {
        let mut scope = QueueScope::new(&self.config.qs, queues);
        for action in &self.actions {
            let value = evaluator
                .evaluate(&action.value, &mut scope)
                .and_then(|v| v.to_json())
                .map_err(|e| self.expression_error(&action.value, e))?;

            let call = ActuatorCall::new(&action.actuator, value, &self.config.name);
            if let Err(e) = actuators.dispatch(call) {
                log_dispatch_error(&self.config.name, &action.actuator, &e);
            }
        }
        Ok(())
    }

    fn run_updates(&self, queues: &mut QueueRegistry, evaluator: &Evaluator) -> RuleResult<()> {
        let mut touched: Vec<&str> = Vec::new();
        let result = {
            let mut scope = QueueScope::new(&self.config.qs, queues);
            self.updates.iter().try_for_each(|expression| {
                for binding in expression.identifiers() {
                    if let Some(queue) = self.config.qs.get(&binding) {
                        if !touched.contains(&queue.as_str()) {
                            touched.push(queue);
                        }
                    }
                }
                evaluator
                    .evaluate(expression, &mut scope)
                    .map(|_| ())
                    .map_err(|e| self.expression_error(expression, e))
            })
        };

        for queue in touched {
            if let Err(e) = queues.call_changed(queue) {
                debug!(rule = %self.config.name, error = %e, "Skipping change notification");
            }
        }
        result
    }

    fn expression_error(&self, expression: &Expression, source: EvalError) -> RuleError {
        RuleError::Expression {
            rule: self.config.name.clone(),
            expression: expression.source().to_string(),
            source,
        }
    }

    fn fault(&mut self, err: RuleError) {
        warn!(rule = %self.config.name, error = %err, "Error in rule, disabling rule");
        self.last_error = Some(err.to_string());
        self.disable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn timer_rule() -> RuleConfig {
        RuleConfig::new("tick")
            .bind("timer", "1Hz")
            .precondition("timer.max > timer.current")
            .update("timer.current++")
    }

    fn queues() -> QueueRegistry {
        let mut queues = QueueRegistry::new();
        queues.create("1Hz", 1).unwrap();
        queues
    }

    #[test]
    fn test_compile_rejects_syntax_errors() {
        let err = Rule::from_config(RuleConfig::new("bad").precondition("timer.max >")).unwrap_err();
        assert!(matches!(err, RuleError::InvalidExpression { ref expression, .. } if expression == "timer.max >"));
        assert!(matches!(
            Rule::from_config(RuleConfig::new("  ")),
            Err(RuleError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_referenced_bindings() {
        let rule = Rule::from_config(timer_rule().action("PLUG", "{data: light.max}")).unwrap();
        let referenced: Vec<_> = rule.referenced.iter().cloned().collect();
        assert_eq!(referenced, vec!["light", "timer"]);
    }

    #[test]
    fn test_idle_until_data_arrives() {
        let mut queues = queues();
        let actuators = ActuatorRegistry::new();
        let mut rule = Rule::from_config(timer_rule()).unwrap();

        rule.begin_pass();
        let outcome = rule.evaluate(&mut queues, &Evaluator::default(), &actuators);
        assert_eq!(outcome, Outcome::default());
        assert_eq!(rule.state(), RuleState::Idle);
    }

    #[test]
    fn test_fire_advances_cursor() {
        let mut queues = queues();
        queues.add("1Hz", json!(true), None).unwrap();
        let actuators = ActuatorRegistry::new();
        let mut rule = Rule::from_config(timer_rule()).unwrap();

        rule.begin_pass();
        let outcome = rule.evaluate(&mut queues, &Evaluator::default(), &actuators);
        assert!(outcome.fired);
        assert_eq!(rule.activated_count(), 1);
        assert_eq!(queues.get("1Hz").unwrap().current(), 1);
        assert!(rule.info().last_fired.is_some());
    }

    #[test]
    fn test_unknown_queue_is_binding_error() {
        let mut queues = QueueRegistry::new();
        let actuators = ActuatorRegistry::new();
        let mut rule = Rule::from_config(timer_rule()).unwrap();

        rule.begin_pass();
        let outcome = rule.evaluate(&mut queues, &Evaluator::default(), &actuators);
        assert!(outcome.disabled);
        assert_eq!(rule.state(), RuleState::Disabled);
        assert!(rule.last_error().unwrap().contains("unknown queue '1Hz'"));
    }

    #[test]
    fn test_enable_clears_last_error() {
        let mut queues = QueueRegistry::new();
        let actuators = ActuatorRegistry::new();
        let mut rule = Rule::from_config(timer_rule()).unwrap();
        rule.begin_pass();
        rule.evaluate(&mut queues, &Evaluator::default(), &actuators);
        assert!(rule.last_error().is_some());

        rule.enable();
        assert!(rule.is_enabled());
        assert!(rule.last_error().is_none());
    }

    #[test]
    fn test_info_snapshot() {
        let rule = Rule::from_config(timer_rule().with_priority(3).manual()).unwrap();
        let info = rule.info();
        assert_eq!(info.priority, 3);
        assert!(info.manual);
        assert_eq!(info.state, RuleState::Idle);
        assert_eq!(info.preconditions, vec!["timer.max > timer.current"]);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["state"], "idle");
        assert!(json.get("last_error").is_none());
    }
}
