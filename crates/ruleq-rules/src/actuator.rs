//! Actuator registry with async handlers
//!
//! Rules never wait for an actuator. [`ActuatorRegistry::dispatch`] runs the
//! handler on its own task and only logs how it went.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};
use ulid::Ulid;

/// Result type for actuations
pub type ActuatorResult<T = ()> = Result<T, ActuatorError>;

/// Future type for async actuator handlers
pub type ActuatorFuture = Pin<Box<dyn Future<Output = ActuatorResult> + Send>>;

/// Actuator handler function type
pub type ActuatorHandler = Arc<dyn Fn(ActuatorCall) -> ActuatorFuture + Send + Sync>;

/// Errors that can occur when actuating
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActuatorError {
    #[error("actuator not found: {0}")]
    NotFound(String),

    #[error("{0} is not an actuator")]
    NotActuator(String),

    #[error("actuation failed: {0}")]
    Failed(String),
}

/// A single actuation request
#[derive(Debug, Clone)]
pub struct ActuatorCall {
    /// Correlates dispatch and completion in the logs
    pub id: Ulid,
    pub actuator: String,
    pub value: serde_json::Value,
    /// Rule that issued the call
    pub rule: String,
}

impl ActuatorCall {
    pub fn new(
        actuator: impl Into<String>,
        value: serde_json::Value,
        rule: impl Into<String>,
    ) -> Self {
        Self {
            id: Ulid::new(),
            actuator: actuator.into(),
            value,
            rule: rule.into(),
        }
    }
}

enum Registered {
    Actuator(ActuatorHandler),
    /// Known identifier that cannot be actuated, such as a read-only data source
    ReadOnly,
}

/// Maps actuator identifiers to handlers
pub struct ActuatorRegistry {
    actuators: DashMap<String, Registered>,
}

impl ActuatorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            actuators: DashMap::new(),
        }
    }

    /// Register an actuator
    #[instrument(skip(self, id, handler))]
    pub fn register<F, Fut>(&self, id: impl Into<String>, handler: F)
    where
        F: Fn(ActuatorCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActuatorResult> + Send + 'static,
    {
        let id = id.into();
        debug!(actuator = %id, "Registering actuator");

        let handler: ActuatorHandler =
            Arc::new(move |call| Box::pin(handler(call)) as ActuatorFuture);
        self.actuators.insert(id, Registered::Actuator(handler));
    }

    /// Register an identifier that is known but cannot be actuated
    pub fn register_read_only(&self, id: impl Into<String>) {
        let id = id.into();
        debug!(source = %id, "Registering read-only source");
        self.actuators.insert(id, Registered::ReadOnly);
    }

    /// Whether the identifier is known at all
    pub fn contains(&self, id: &str) -> bool {
        self.actuators.contains_key(id)
    }

    /// Whether the identifier can be actuated
    pub fn is_actuator(&self, id: &str) -> bool {
        self.actuators
            .get(id)
            .map(|entry| matches!(entry.value(), Registered::Actuator(_)))
            .unwrap_or(false)
    }

    /// All registered identifiers, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.actuators.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.actuators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actuators.is_empty()
    }

    fn handler(&self, id: &str) -> ActuatorResult<ActuatorHandler> {
        let entry = self
            .actuators
            .get(id)
            .ok_or_else(|| ActuatorError::NotFound(id.to_string()))?;
        match entry.value() {
            Registered::Actuator(handler) => Ok(handler.clone()),
            Registered::ReadOnly => Err(ActuatorError::NotActuator(id.to_string())),
        }
    }

    /// Actuate and wait for the result
    pub async fn call(&self, call: ActuatorCall) -> ActuatorResult {
        let handler = self.handler(&call.actuator)?;
        handler(call).await
    }

    /// Start an actuation without waiting for it
    ///
    /// Lookup failures are returned immediately. Once the handler is
    /// running, its outcome is only logged.
    #[instrument(skip(self, call), fields(call_id = %call.id, actuator = %call.actuator, rule = %call.rule))]
    pub fn dispatch(&self, call: ActuatorCall) -> ActuatorResult<JoinHandle<()>> {
        let handler = self.handler(&call.actuator)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ActuatorError::Failed(e.to_string()))?;

        debug!(value = %call.value, "Dispatching actuation");

        let id = call.id;
        let actuator = call.actuator.clone();
        let rule = call.rule.clone();
        Ok(runtime.spawn(async move {
            match handler(call).await {
                Ok(()) => debug!(call_id = %id, actuator = %actuator, rule = %rule, "Actuation succeeded"),
                Err(e) => error!(call_id = %id, actuator = %actuator, rule = %rule, error = %e, "Actuation failed"),
            }
        }))
    }
}

impl Default for ActuatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ActuatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActuatorRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

/// Log a dispatch failure the way the engine reports it
pub(crate) fn log_dispatch_error(rule: &str, actuator: &str, err: &ActuatorError) {
    match err {
        ActuatorError::NotFound(_) => {
            warn!(rule = %rule, actuator = %actuator, "Cannot find actuator, skipping action")
        }
        other => error!(rule = %rule, actuator = %actuator, error = %other, "Cannot actuate"),
    }
}
