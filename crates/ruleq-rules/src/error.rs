//! Rule engine errors

use ruleq_expr::{EvalError, ParseError};
use thiserror::Error;

/// Rule errors
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Rule not found: {0}")]
    NotFound(String),

    #[error("Rule already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid expression in rule {rule}: '{expression}': {source}")]
    InvalidExpression {
        rule: String,
        expression: String,
        source: ParseError,
    },

    #[error("Rule {rule} binds '{binding}' to unknown queue '{queue}'")]
    Binding {
        rule: String,
        binding: String,
        queue: String,
    },

    #[error("Error evaluating '{expression}' in rule {rule}: {source}")]
    Expression {
        rule: String,
        expression: String,
        source: EvalError,
    },

    #[error("Invalid rule configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for rule operations
pub type RuleResult<T> = Result<T, RuleError>;
