//! Expression syntax tree

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{ParseError, ParseResult};
use crate::parser;
use crate::value::Value;

/// A parsed expression together with its source text
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    /// Parse an expression
    pub fn parse(source: impl Into<String>) -> ParseResult<Self> {
        let source = source.into();
        let ast = parser::parse(&source)?;
        Ok(Self { source, ast })
    }

    /// Source text as written
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The syntax tree
    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Every identifier the expression references
    pub fn identifiers(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.ast.collect_identifiers(&mut names);
        names
    }
}

impl FromStr for Expression {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `null`, `true`, `1.5`, `'on'`
    Literal(Value),
    /// `[a, b]`
    Array(Vec<Expr>),
    /// `{key: value}`
    Object(Vec<(String, Expr)>),
    /// A name resolved through the scope
    Ident(String),
    /// `object.property`
    Member { object: Box<Expr>, property: String },
    /// `object[index]`
    Index { object: Box<Expr>, index: Box<Expr> },
    /// `callee(args)`
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Short-circuiting `&&` / `||`
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `test ? consequent : alternate`
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    /// `target = value`, `target += value`
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `++target`, `target--`
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
    },
}

impl Expr {
    fn collect_identifiers(&self, names: &mut BTreeSet<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Ident(name) => {
                names.insert(name.clone());
            }
            Expr::Array(items) => items.iter().for_each(|e| e.collect_identifiers(names)),
            Expr::Object(fields) => fields
                .iter()
                .for_each(|(_, e)| e.collect_identifiers(names)),
            Expr::Member { object, .. } => object.collect_identifiers(names),
            Expr::Index { object, index } => {
                object.collect_identifiers(names);
                index.collect_identifiers(names);
            }
            Expr::Call { callee, args } => {
                callee.collect_identifiers(names);
                args.iter().for_each(|e| e.collect_identifiers(names));
            }
            Expr::Unary { operand, .. } => operand.collect_identifiers(names),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                left.collect_identifiers(names);
                right.collect_identifiers(names);
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                test.collect_identifiers(names);
                consequent.collect_identifiers(names);
                alternate.collect_identifiers(names);
            }
            Expr::Assign { target, value, .. } => {
                target.collect_identifiers(names);
                value.collect_identifiers(names);
            }
            Expr::Update { target, .. } => target.collect_identifiers(names),
        }
    }

    /// Whether this node can appear on the left of an assignment
    pub(crate) fn is_assignable(&self) -> bool {
        matches!(
            self,
            Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_collected() {
        let expr = Expression::parse("plug.max == plug.empty || light.get(light.max).value[1] > 0")
            .unwrap();
        let names: Vec<_> = expr.identifiers().into_iter().collect();
        assert_eq!(names, vec!["light", "plug"]);
    }

    #[test]
    fn test_property_names_are_not_identifiers() {
        let expr = Expression::parse("{data: 'off'}").unwrap();
        assert!(expr.identifiers().is_empty());
    }

    #[test]
    fn test_display_is_source() {
        let expr: Expression = "timer.current ++".parse().unwrap();
        assert_eq!(expr.to_string(), "timer.current ++");
    }
}
