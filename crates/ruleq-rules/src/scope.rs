//! Binds a rule's local names to queues for expression evaluation

use indexmap::IndexMap;
use ruleq_core::QueueItem;
use ruleq_expr::{EvalError, EvalResult, Scope, Value};
use ruleq_queue::{Queue, QueueError, QueueRegistry};

/// Expression scope over a rule's `qs` bindings
///
/// Each binding exposes the queue attributes `name`, `capacity`, `empty`,
/// `current`, `max` and `length`, of which only `current` is writable, and
/// the method `get(index)`.
pub struct QueueScope<'a> {
    bindings: &'a IndexMap<String, String>,
    queues: &'a mut QueueRegistry,
}

impl<'a> QueueScope<'a> {
    pub fn new(bindings: &'a IndexMap<String, String>, queues: &'a mut QueueRegistry) -> Self {
        Self { bindings, queues }
    }

    fn queue_name(&self, binding: &str) -> EvalResult<&'a str> {
        self.bindings
            .get(binding)
            .map(String::as_str)
            .ok_or_else(|| EvalError::UndefinedBinding(binding.to_string()))
    }

    fn queue(&self, binding: &str) -> EvalResult<&Queue> {
        let name = self.queue_name(binding)?;
        self.queues
            .get(name)
            .ok_or_else(|| EvalError::scope(QueueError::UnknownQueue(name.to_string())))
    }

    fn queue_mut(&mut self, binding: &str) -> EvalResult<&mut Queue> {
        let name = self.queue_name(binding)?;
        self.queues
            .get_mut(name)
            .ok_or_else(|| EvalError::scope(QueueError::UnknownQueue(name.to_string())))
    }
}

fn position(value: &Value, what: &str) -> EvalResult<u64> {
    let n = value.as_number();
    if !n.is_finite() || n < 0.0 || n.fract() != 0.0 {
        return Err(EvalError::Type(format!(
            "{} must be a non-negative integer, got {}",
            what, value
        )));
    }
    Ok(n as u64)
}

fn item_value(item: &QueueItem) -> Value {
    let mut fields = IndexMap::with_capacity(2);
    fields.insert("value".to_string(), Value::from(&item.value));
    fields.insert(
        "time".to_string(),
        item.time_millis()
            .map(|ms| Value::Number(ms as f64))
            .unwrap_or(Value::Null),
    );
    Value::Object(fields)
}

impl Scope for QueueScope<'_> {
    fn resolve(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    fn get_attribute(&self, binding: &str, attribute: &str) -> EvalResult<Value> {
        let queue = self.queue(binding)?;
        Ok(match attribute {
            "name" => Value::from(queue.name()),
            "capacity" => Value::from(queue.capacity() as u64),
            "empty" => Value::from(queue.empty()),
            "current" => Value::from(queue.current()),
            "max" => Value::from(queue.max()),
            "length" => Value::from(queue.len() as u64),
            _ => {
                return Err(EvalError::UnknownAttribute {
                    binding: binding.to_string(),
                    attribute: attribute.to_string(),
                })
            }
        })
    }

    fn set_attribute(&mut self, binding: &str, attribute: &str, value: Value) -> EvalResult<()> {
        match attribute {
            "current" => {
                let target = position(&value, "current")?;
                self.queue_mut(binding)?
                    .set_current(target)
                    .map_err(EvalError::scope)
            }
            "name" | "capacity" | "empty" | "max" | "length" => Err(EvalError::ReadOnly {
                binding: binding.to_string(),
                attribute: attribute.to_string(),
            }),
            _ => Err(EvalError::UnknownAttribute {
                binding: binding.to_string(),
                attribute: attribute.to_string(),
            }),
        }
    }

    fn call_method(&mut self, binding: &str, method: &str, args: Vec<Value>) -> EvalResult<Value> {
        match method {
            "get" => {
                let [index] = args.as_slice() else {
                    return Err(EvalError::InvalidArguments {
                        method: "get".to_string(),
                        message: format!("expected 1 argument, got {}", args.len()),
                    });
                };
                let index = position(index, "index")?;
                let item = self.queue(binding)?.get(index).map_err(EvalError::scope)?;
                Ok(item_value(item))
            }
            _ => Err(EvalError::UnknownMethod {
                binding: binding.to_string(),
                method: method.to_string(),
            }),
        }
    }
}
