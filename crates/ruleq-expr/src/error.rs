//! Expression error types

use thiserror::Error;

/// Result type for parsing
pub type ParseResult<T> = Result<T, ParseError>;

/// Result type for evaluation
pub type EvalResult<T> = Result<T, EvalError>;

/// A syntax error, with the byte offset where it was detected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at offset {offset}: {message}")]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Errors raised while evaluating an expression
#[derive(Debug, Error)]
pub enum EvalError {
    /// Identifier is not bound in the scope
    #[error("undefined binding: {0}")]
    UndefinedBinding(String),

    /// Binding has no such attribute
    #[error("{binding} has no attribute '{attribute}'")]
    UnknownAttribute { binding: String, attribute: String },

    /// Binding has no such method
    #[error("{binding} has no method '{method}'")]
    UnknownMethod { binding: String, method: String },

    /// Attribute cannot be assigned
    #[error("{binding}.{attribute} is read-only")]
    ReadOnly { binding: String, attribute: String },

    /// Operand of the wrong type
    #[error("type error: {0}")]
    Type(String),

    /// Left-hand side cannot be assigned to
    #[error("invalid assignment target: {0}")]
    InvalidTarget(String),

    /// Call on something that is not a binding method
    #[error("not callable: {0}")]
    NotCallable(String),

    /// Method called with the wrong arguments
    #[error("invalid arguments to {method}: {message}")]
    InvalidArguments { method: String, message: String },

    #[error("division by zero")]
    DivisionByZero,

    /// Step budget exhausted
    #[error("evaluation exceeded {0} steps")]
    StepLimitExceeded(usize),

    /// Error raised by the scope (for example an out-of-range queue index)
    #[error(transparent)]
    Scope(Box<dyn std::error::Error + Send + Sync>),
}

impl EvalError {
    /// Wrap an error raised by a [`crate::Scope`] implementation
    pub fn scope(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        EvalError::Scope(Box::new(err))
    }
}
