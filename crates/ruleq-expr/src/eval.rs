//! Step-bounded interpreter

use std::cmp::Ordering;

use indexmap::IndexMap;
use tracing::trace;

use crate::ast::{AssignOp, BinaryOp, Expr, Expression, LogicalOp, UnaryOp, UpdateOp};
use crate::error::{EvalError, EvalResult};
use crate::value::Value;

/// Default number of AST nodes one evaluation may visit
pub const DEFAULT_MAX_STEPS: usize = 10_000;

/// The bindings an expression can see
///
/// Identifiers resolve only through [`Scope::resolve`]; everything reachable
/// from a binding goes through the attribute and method hooks, so the scope
/// alone decides what an expression may read or change.
pub trait Scope {
    /// Whether `name` is bound
    fn resolve(&self, name: &str) -> bool;

    /// Read `binding.attribute`
    fn get_attribute(&self, binding: &str, attribute: &str) -> EvalResult<Value>;

    /// Write `binding.attribute`
    fn set_attribute(&mut self, binding: &str, attribute: &str, value: Value) -> EvalResult<()>;

    /// Call `binding.method(args)`
    fn call_method(&mut self, binding: &str, method: &str, args: Vec<Value>) -> EvalResult<Value>;
}

/// Evaluates parsed expressions against a [`Scope`]
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    max_steps: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STEPS)
    }
}

impl Evaluator {
    pub fn new(max_steps: usize) -> Self {
        Self { max_steps }
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Evaluate an expression to a value
    pub fn evaluate(&self, expression: &Expression, scope: &mut dyn Scope) -> EvalResult<Value> {
        let mut interpreter = Interpreter {
            scope,
            steps: 0,
            max_steps: self.max_steps,
        };
        let result = interpreter.eval(expression.ast());
        trace!(
            expression = %expression,
            steps = interpreter.steps,
            ok = result.is_ok(),
            "Evaluated expression"
        );
        result
    }

    /// Evaluate an expression and reduce it to its truthiness
    pub fn evaluate_bool(&self, expression: &Expression, scope: &mut dyn Scope) -> EvalResult<bool> {
        self.evaluate(expression, scope).map(|v| v.truthy())
    }
}

/// An assignable location: an attribute of a binding
struct Place {
    binding: String,
    attribute: String,
}

struct Interpreter<'a> {
    scope: &'a mut dyn Scope,
    steps: usize,
    max_steps: usize,
}

impl<'a> Interpreter<'a> {
    fn tick(&mut self) -> EvalResult<()> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(EvalError::StepLimitExceeded(self.max_steps));
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> EvalResult<Value> {
        self.tick()?;

        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::Array(values))
            }
            Expr::Object(fields) => {
                let mut map = IndexMap::with_capacity(fields.len());
                for (key, value) in fields {
                    let value = self.eval(value)?;
                    map.insert(key.clone(), value);
                }
                Ok(Value::Object(map))
            }
            Expr::Ident(name) => {
                if self.scope.resolve(name) {
                    Ok(Value::Binding(name.clone()))
                } else {
                    Err(EvalError::UndefinedBinding(name.clone()))
                }
            }
            Expr::Member { object, property } => {
                let object = self.eval(object)?;
                self.member(object, property)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                self.index(object, index)
            }
            Expr::Call { callee, args } => self.call(callee, args),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
                    UnaryOp::Neg => Ok(Value::Number(-numeric(&value, "-")?)),
                    UnaryOp::Plus => Ok(Value::Number(numeric(&value, "+")?)),
                }
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left)?;
                match (op, left.truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                    _ => self.eval(right),
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            Expr::Assign { op, target, value } => {
                let place = self.place(target)?;
                let value = self.eval(value)?;
                let new = match op {
                    AssignOp::Set => value,
                    AssignOp::Add => {
                        let old = self.scope.get_attribute(&place.binding, &place.attribute)?;
                        binary(BinaryOp::Add, &old, &value)?
                    }
                    AssignOp::Sub => {
                        let old = self.scope.get_attribute(&place.binding, &place.attribute)?;
                        binary(BinaryOp::Sub, &old, &value)?
                    }
                };
                self.scope
                    .set_attribute(&place.binding, &place.attribute, new.clone())?;
                Ok(new)
            }
            Expr::Update { op, prefix, target } => {
                let place = self.place(target)?;
                let old = self.scope.get_attribute(&place.binding, &place.attribute)?;
                let old = numeric(&old, "update")?;
                let new = match op {
                    UpdateOp::Increment => old + 1.0,
                    UpdateOp::Decrement => old - 1.0,
                };
                self.scope
                    .set_attribute(&place.binding, &place.attribute, Value::Number(new))?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
        }
    }

    fn member(&mut self, object: Value, property: &str) -> EvalResult<Value> {
        match object {
            Value::Binding(binding) => self.scope.get_attribute(&binding, property),
            Value::Object(mut map) => Ok(map.swap_remove(property).unwrap_or(Value::Null)),
            Value::Array(items) if property == "length" => Ok(Value::from(items.len() as u64)),
            Value::String(s) if property == "length" => {
                Ok(Value::from(s.chars().count() as u64))
            }
            Value::Null => Err(EvalError::Type(format!(
                "cannot read property '{}' of null",
                property
            ))),
            _ => Ok(Value::Null),
        }
    }

    fn index(&mut self, object: Value, index: Value) -> EvalResult<Value> {
        match object {
            Value::Array(mut items) => Ok(array_position(&index, items.len())
                .map(|i| items.swap_remove(i))
                .unwrap_or(Value::Null)),
            Value::String(s) => Ok(array_position(&index, s.chars().count())
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::String(c.to_string()))
                .unwrap_or(Value::Null)),
            Value::Object(_) | Value::Binding(_) => {
                let key = index.to_string();
                self.member(object, &key)
            }
            Value::Null => Err(EvalError::Type(format!(
                "cannot read index {} of null",
                index
            ))),
            _ => Ok(Value::Null),
        }
    }

    fn call(&mut self, callee: &Expr, args: &[Expr]) -> EvalResult<Value> {
        let Expr::Member { object, property } = callee else {
            return Err(EvalError::NotCallable(describe(callee)));
        };

        let object = self.eval(object)?;
        let Value::Binding(binding) = object else {
            return Err(EvalError::NotCallable(format!(
                "{} on {}",
                property,
                object.type_name()
            )));
        };

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?);
        }
        self.scope.call_method(&binding, property, values)
    }

    fn place(&mut self, target: &Expr) -> EvalResult<Place> {
        let (object, attribute) = match target {
            Expr::Member { object, property } => (object, property.clone()),
            Expr::Index { object, index } => {
                let key = self.eval(index)?.to_string();
                (object, key)
            }
            other => return Err(EvalError::InvalidTarget(describe(other))),
        };

        match self.eval(object)? {
            Value::Binding(binding) => Ok(Place { binding, attribute }),
            other => Err(EvalError::InvalidTarget(format!(
                "property '{}' of a {} value",
                attribute,
                other.type_name()
            ))),
        }
    }
}

fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::Member { property, .. } => property.clone(),
        Expr::Literal(value) => value.to_string(),
        _ => "expression".to_string(),
    }
}

fn array_position(index: &Value, len: usize) -> Option<usize> {
    let n = index.as_number();
    if n.fract() != 0.0 || n < 0.0 || n >= len as f64 {
        return None;
    }
    Some(n as usize)
}

fn numeric(value: &Value, op: &str) -> EvalResult<f64> {
    match value {
        Value::Array(_) | Value::Object(_) | Value::Binding(_) => Err(EvalError::Type(format!(
            "cannot apply '{}' to {}",
            op,
            value.type_name()
        ))),
        scalar => Ok(scalar.as_number()),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    let symbol = match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        BinaryOp::Eq => return Ok(Value::Bool(left.loose_eq(right))),
        BinaryOp::NotEq => return Ok(Value::Bool(!left.loose_eq(right))),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            return compare(op, left, right)
        }
    };

    if op == BinaryOp::Add
        && (matches!(left, Value::String(_)) || matches!(right, Value::String(_)))
    {
        if matches!(left, Value::Binding(_)) || matches!(right, Value::Binding(_)) {
            return Err(EvalError::Type("cannot concatenate a binding".to_string()));
        }
        return Ok(Value::String(format!("{}{}", left, right)));
    }

    let a = numeric(left, symbol)?;
    let b = numeric(right, symbol)?;
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Rem if b == 0.0 => return Err(EvalError::DivisionByZero),
        BinaryOp::Div => a / b,
        _ => a % b,
    };
    Ok(Value::Number(result))
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => {
            let a = numeric(left, "comparison")?;
            let b = numeric(right, "comparison")?;
            a.partial_cmp(&b)
        }
    };

    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    Ok(Value::Bool(match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::LtEq => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    }))
}
