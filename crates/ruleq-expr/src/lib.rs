//! Sandboxed expression language for ruleq
//!
//! Rule preconditions, action values and updates are configuration strings
//! such as:
//!
//! ```text
//! timer.max > timer.current
//! light.get(light.max).value[1] > 0
//! {data: 'off'}
//! timer.current++
//! ```
//!
//! Expressions are tokenized, parsed by a recursive-descent parser into a
//! restricted AST, and interpreted against a [`Scope`]. Nothing outside the
//! scope is reachable: identifiers only resolve to the bindings the scope
//! exposes, and the only side effects are attribute writes the scope allows.
//! Evaluation is bounded by a step budget.
//!
//! # Example
//!
//! ```ignore
//! use ruleq_expr::{Evaluator, Expression};
//!
//! let expr: Expression = "timer.max > timer.current".parse()?;
//! let ready = Evaluator::default().evaluate_bool(&expr, &mut scope)?;
//! ```

mod ast;
mod error;
mod eval;
mod lexer;
mod parser;
mod value;

pub use ast::{AssignOp, BinaryOp, Expr, Expression, LogicalOp, UnaryOp, UpdateOp};
pub use error::{EvalError, EvalResult, ParseError, ParseResult};
pub use eval::{Evaluator, Scope, DEFAULT_MAX_STEPS};
pub use value::Value;

/// Maximum syntax tree depth accepted by the parser
///
/// Every operator node, member or index access and call counts as a level,
/// so evaluation recursion is bounded as well.
pub const MAX_DEPTH: usize = 64;
