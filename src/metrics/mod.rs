//! Metrics for the ranked queue
//!
//! Prometheus metrics for partitioning and handoff. The registry is exposed
//! so the host can serve it however it likes.

pub mod collector;

pub use collector::{HandoffMetrics, MetricsCollector, QueueMetrics};
