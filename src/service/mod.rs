//! Service layer for the ranked queue
//!
//! The engine owns all queue state; the runner drives it from a single task
//! on a fixed tick and exposes a cloneable handle to the host.

pub mod engine;
pub mod runner;

pub use engine::{QueueEngine, QueueSnapshot, TickReport};
pub use runner::{QueueHandle, QueueService};
