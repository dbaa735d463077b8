//! Rule Engine Runtime
//!
//! Runs queues and rules on a single tokio task:
//!
//! - [`RuntimeBuilder`] declares manual queues, timer queues and rules
//! - [`EngineHandle`] adds values, manages rules and queries state
//! - [`ChangeNotifier`] collapses each burst of queue changes into one pass
//!
//! Queue snapshots are re-published on a broadcast channel for observers
//! such as a UI push layer ([`EngineHandle::subscribe`]).

pub mod error;
pub mod handle;
pub mod notifier;
pub mod runtime;
pub mod source;

pub use error::{RuntimeError, RuntimeResult};
pub use handle::EngineHandle;
pub use notifier::ChangeNotifier;
pub use runtime::{RunningEngine, RuntimeBuilder, RuntimeStats};
pub use source::{QueueConfig, TimerConfig};
