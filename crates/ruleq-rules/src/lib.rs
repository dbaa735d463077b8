//! Rule Engine
//!
//! A rule binds local names to queues and reacts when its preconditions
//! hold over their current state:
//!
//! ```text
//! RULE = PRECONDITIONS → ACTIONS → UPDATES
//! ```
//!
//! - **Preconditions**: expressions over the bound queues, all must hold
//! - **Actions**: actuator commands whose values are expressions, dispatched
//!   without waiting for completion
//! - **Updates**: expressions run after firing, usually advancing a queue's
//!   `current` cursor so the same data is not consumed twice
//!
//! Manual rules add an arm/fire handshake: once their preconditions hold
//! they are armed and only fire after [`RuleEngine::fire_rule`] confirms the
//! current arming.
//!
//! # Key Types
//!
//! - [`RuleConfig`] - Declarative rule definition
//! - [`RuleEngine`] - Rule registry and evaluation passes
//! - [`ActuatorRegistry`] - Actuator handlers keyed by identifier
//! - [`QueueScope`] - Expression scope over a rule's queue bindings

pub mod actuator;
pub mod config;
pub mod engine;
pub mod error;
pub mod rule;
pub mod scope;

pub use actuator::{
    ActuatorCall, ActuatorError, ActuatorFuture, ActuatorHandler, ActuatorRegistry,
    ActuatorResult,
};
pub use config::{ActionConfig, EngineConfig, FiringPolicy, RuleConfig};
pub use engine::{PassReport, RuleEngine};
pub use error::{RuleError, RuleResult};
pub use rule::{Rule, RuleInfo, RuleState};
pub use scope::QueueScope;
