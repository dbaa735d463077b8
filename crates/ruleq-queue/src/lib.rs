//! Bounded, position-indexed queues for ruleq
//!
//! A [`Queue`] buffers the most recent `capacity` values produced by a
//! source (a timer, a data source subscription, or manual input) and tracks
//! three positions over its history:
//!
//! ```text
//!   evicted        retained              not yet produced
//! ───────────┤ empty ... current ... max ├──────────────────▶
//! ```
//!
//! Rules read queues through these positions and advance `current` to
//! record what they have consumed. The [`QueueRegistry`] owns every queue
//! by unique name.

mod error;
mod queue;
mod registry;

pub use error::{QueueError, QueueResult};
pub use queue::{ChangeListener, Queue};
pub use registry::QueueRegistry;
