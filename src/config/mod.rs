//! Configuration management for the ranked queue service
//!
//! This module handles configuration loading from environment variables and
//! TOML files, validation, and default values.

pub mod app;
pub mod queue;

// Re-export commonly used types
pub use app::{validate_config, validate_queue_config, AppConfig, ServiceSettings};
pub use queue::QueueConfig;
