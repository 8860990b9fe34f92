//! Configuration loading with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid limit_per_minute: {0}. Must be at least 1")]
    InvalidLimitPerMinute(u32),

    #[error("Invalid local rate: {0}. Must be positive")]
    InvalidLocalRate(f64),

    #[error("Invalid max_admission_attempts: {0}. Cannot be 0")]
    InvalidAdmissionAttempts(u32),

    #[error("Invalid max_attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    #[error("Invalid backoff_multiplier: {0}. Must be >= 1.0")]
    InvalidBackoffMultiplier(f64),

    #[error(
        "Invalid backoff configuration: initial_delay_ms ({0}) must be <= max_delay_ms ({1})"
    )]
    InvalidBackoff(u64, u64),
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.parallax/config.yaml` (project config, created by init)
    /// 3. `.parallax/local.yaml` (local overrides, optional)
    /// 4. Environment variables (`PARALLAX_*` prefix)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".parallax/config.yaml"))
            .merge(Yaml::file(".parallax/local.yaml"))
            .merge(Env::prefixed("PARALLAX_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.rate_limit.limit_per_minute == 0 {
            return Err(ConfigError::InvalidLimitPerMinute(
                config.rate_limit.limit_per_minute,
            ));
        }
        if config.rate_limit.local_requests_per_second <= 0.0 {
            return Err(ConfigError::InvalidLocalRate(
                config.rate_limit.local_requests_per_second,
            ));
        }
        if config.rate_limit.max_admission_attempts == 0 {
            return Err(ConfigError::InvalidAdmissionAttempts(
                config.rate_limit.max_admission_attempts,
            ));
        }

        if config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.retry.max_attempts));
        }
        if config.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidBackoffMultiplier(
                config.retry.backoff_multiplier,
            ));
        }
        if config.retry.initial_delay_ms > config.retry.max_delay_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_delay_ms,
                config.retry.max_delay_ms,
            ));
        }

        Ok(())
    }
}
