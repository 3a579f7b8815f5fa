//! Run execution core
//!
//! Run identifiers, the per-run event stream and its fan-out, and the
//! executor that drives workers, user-input handoffs, and artifact sync.

mod events;
mod executor;
mod registry;

pub use events::{RunEvent, RunEventType, INPUT_REQUIRED_PREFIX, NODE_READY_MESSAGE};
pub use executor::RunExecutor;
pub use registry::{RunRegistry, RUN_EVENT_BUFFER};
