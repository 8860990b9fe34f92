//! Configuration model for the parallax orchestrator.

use serde::{Deserialize, Serialize};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Admission control for the quota-constrained provider
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Retry policy for outbound provider calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Provider endpoints
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Report finalization
    #[serde(default)]
    pub report: ReportConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to the `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".parallax/parallax.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Admission control configuration for the rate-limited provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    /// Calls admitted per rolling 60-second window, across processes
    #[serde(default = "default_limit_per_minute")]
    pub limit_per_minute: u32,

    /// In-process token bucket rate (requests per second), first-line guard
    #[serde(default = "default_local_rps")]
    pub local_requests_per_second: f64,

    /// Minimum wait between admission attempts, milliseconds
    #[serde(default = "default_min_wait_ms")]
    pub min_wait_ms: u64,

    /// Admission attempts before giving up
    #[serde(default = "default_max_admission_attempts")]
    pub max_admission_attempts: u32,
}

const fn default_limit_per_minute() -> u32 {
    10
}

const fn default_local_rps() -> f64 {
    2.0
}

const fn default_min_wait_ms() -> u64 {
    500
}

const fn default_max_admission_attempts() -> u32 {
    30
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit_per_minute: default_limit_per_minute(),
            local_requests_per_second: default_local_rps(),
            min_wait_ms: default_min_wait_ms(),
            max_admission_attempts: default_max_admission_attempts(),
        }
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Total attempts, numbered from 1
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt, milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Factor applied to the delay after each failed attempt
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound on any single inter-attempt delay, milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_delay_ms() -> u64 {
    1_000
}

const fn default_backoff_multiplier() -> f64 {
    2.0
}

const fn default_max_delay_ms() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Endpoint configuration for one research provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProviderConfig {
    /// Base URL of the provider API; empty selects the mock provider
    #[serde(default)]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Poll interval while awaiting run completion, milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on polls per run before the run counts as timed out
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

const fn default_poll_interval_ms() -> u64 {
    5_000
}

const fn default_max_polls() -> u32 {
    360
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key_env: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_polls: default_max_polls(),
        }
    }
}

/// The fixed provider pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProvidersConfig {
    /// Primary provider: runs the clarification loop and is quota-constrained
    #[serde(default)]
    pub primary: ProviderConfig,

    /// Secondary provider: execution only
    #[serde(default)]
    pub secondary: ProviderConfig,
}

/// Report finalization configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportConfig {
    /// Webhook URL receiving finalized reports; empty logs instead
    #[serde(default)]
    pub webhook_url: String,

    /// Email address recorded as the report recipient
    #[serde(default)]
    pub owner_email: String,
}
