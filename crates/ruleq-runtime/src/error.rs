//! Runtime errors

use ruleq_queue::QueueError;
use ruleq_rules::RuleError;
use thiserror::Error;

/// Runtime errors
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The engine task has stopped
    #[error("engine runtime is not running")]
    Closed,

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("invalid timer {name}: {reason}")]
    InvalidTimer { name: String, reason: String },
}

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;
