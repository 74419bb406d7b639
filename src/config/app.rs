//! Main application configuration
//!
//! This module defines the primary configuration structures for the ranked
//! queue service, including environment variable loading and validation.

use crate::config::queue::QueueConfig;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub queue: QueueConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
    /// Capacity of the command channel into the queue owner task
    pub command_buffer: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "ranked-queue".to_string(),
            log_level: "info".to_string(),
            shutdown_timeout_seconds: 30,
            command_buffer: 1024,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("Invalid {} value: {}", name, value))
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; environment variables still override it
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            self.service.shutdown_timeout_seconds =
                parse_env("SHUTDOWN_TIMEOUT_SECONDS", &timeout)?;
        }

        // Queue settings
        if let Ok(size) = env::var("QUEUE_MAX_GROUP_SIZE") {
            self.queue.max_group_size = parse_env("QUEUE_MAX_GROUP_SIZE", &size)?;
        }
        if let Ok(cycles) = env::var("QUEUE_ESCALATION_CYCLES") {
            self.queue.escalation_cycles = parse_env("QUEUE_ESCALATION_CYCLES", &cycles)?;
        }
        if let Ok(cycles) = env::var("QUEUE_TIMEOUT_CYCLES") {
            self.queue.timeout_cycles = parse_env("QUEUE_TIMEOUT_CYCLES", &cycles)?;
        }
        if let Ok(allow) = env::var("QUEUE_ALLOW_INCOMPLETE_GROUPS") {
            self.queue.allow_incomplete_groups =
                parse_env("QUEUE_ALLOW_INCOMPLETE_GROUPS", &allow)?;
        }
        if let Ok(team_size) = env::var("QUEUE_TEAM_SIZE") {
            self.queue.team_size = Some(parse_env("QUEUE_TEAM_SIZE", &team_size)?);
        }
        if let Ok(period) = env::var("QUEUE_TICK_PERIOD_MS") {
            self.queue.tick_period_ms = parse_env("QUEUE_TICK_PERIOD_MS", &period)?;
        }
        if let Ok(kind) = env::var("QUEUE_INSTANCE_KIND") {
            self.queue.instance_kind = kind;
        }
        if let Ok(cycles) = env::var("QUEUE_CONFIRMATION_TIMEOUT_CYCLES") {
            self.queue.confirmation_timeout_cycles =
                Some(parse_env("QUEUE_CONFIRMATION_TIMEOUT_CYCLES", &cycles)?);
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.service.command_buffer == 0 {
        return Err(anyhow!("Command buffer must be greater than 0"));
    }

    validate_queue_config(&config.queue)
}

/// Validate the queue section on its own
pub fn validate_queue_config(queue: &QueueConfig) -> Result<()> {
    if queue.max_group_size == 0 {
        return Err(anyhow!("Max group size must be greater than 0"));
    }
    if queue.tick_period_ms == 0 {
        return Err(anyhow!("Tick period must be greater than 0"));
    }
    if queue.escalation_cycles == 0 {
        return Err(anyhow!("Escalation cycles must be greater than 0"));
    }
    if queue.timeout_cycles == 0 {
        return Err(anyhow!("Timeout cycles must be greater than 0"));
    }
    if queue.rank_ratio_threshold.is_nan() || queue.rank_ratio_threshold <= 0.0 {
        return Err(anyhow!("Rank ratio threshold must be positive"));
    }
    if queue.absolute_rank_threshold.is_nan() || queue.absolute_rank_threshold < 0.0 {
        return Err(anyhow!("Absolute rank threshold cannot be negative"));
    }
    if queue.instance_kind.is_empty() {
        return Err(anyhow!("Instance kind cannot be empty"));
    }
    if let Some(team_size) = queue.team_size {
        if team_size == 0 || team_size > queue.max_group_size {
            return Err(anyhow!(
                "Team size must be between 1 and max group size ({}), got {}",
                queue.max_group_size,
                team_size
            ));
        }
    }
    if queue.confirmation_timeout_cycles == Some(0) {
        return Err(anyhow!("Confirmation timeout must be greater than 0 when set"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.service.log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.queue.max_group_size = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.queue.team_size = Some(5);
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.queue.rank_ratio_threshold = f64::NAN;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.queue.rank_ratio_threshold = 0.0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.queue.absolute_rank_threshold = -1.0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.queue.absolute_rank_threshold = f64::NAN;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.queue.absolute_rank_threshold = 0.0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [queue]
            max_group_size = 2
            allow_incomplete_groups = true
            team_size = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.queue.max_group_size, 2);
        assert!(config.queue.allow_incomplete_groups);
        assert_eq!(config.queue.escalation_cycles, 5);
        assert_eq!(config.service.name, "ranked-queue");
        assert!(validate_config(&config).is_ok());
    }
}
