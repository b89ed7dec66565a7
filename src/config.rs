//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `ENVIRONMENT` (optional): `staging` or `production`, defaults to production.
///   Published events are stamped with this value and only fan out to webhook
///   endpoints registered for the same environment.
/// - `WORKER_CONCURRENCY` (optional): max in-flight webhook deliveries, defaults to 4
/// - `WORKER_POLL_INTERVAL_MS` (optional): idle poll interval for the delivery
///   worker, defaults to 1000
/// - `DELIVERY_LEASE_SECONDS` (optional): how long a claimed delivery stays
///   invisible to other workers, defaults to 60
/// - `RETRY_BASE_DELAY_SECONDS` (optional): first retry delay, defaults to 60
/// - `RETRY_BACKOFF_MULTIPLIER` (optional): exponential growth factor, defaults to 2.0
/// - `RETRY_MAX_DELAY_SECONDS` (optional): retry delay ceiling, defaults to 3600
/// - `FAILURE_ALERT_THRESHOLD` (optional): failed deliveries per org per hour
///   before a warning is logged, defaults to 5
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,

    #[serde(default = "default_lease_seconds")]
    pub delivery_lease_seconds: i64,

    #[serde(default = "default_retry_base")]
    pub retry_base_delay_seconds: i64,

    #[serde(default = "default_retry_multiplier")]
    pub retry_backoff_multiplier: f64,

    #[serde(default = "default_retry_cap")]
    pub retry_max_delay_seconds: i64,

    #[serde(default = "default_failure_alert_threshold")]
    pub failure_alert_threshold: i64,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_lease_seconds() -> i64 {
    60
}

fn default_retry_base() -> i64 {
    60
}

fn default_retry_multiplier() -> f64 {
    2.0
}

fn default_retry_cap() -> i64 {
    3600
}

fn default_failure_alert_threshold() -> i64 {
    5
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    /// - `ENVIRONMENT` is set to something other than `staging` or `production`
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Parse environment variables into Config struct
        // Field names are automatically converted: database_url -> DATABASE_URL
        let config = envy::from_env::<Config>()?;

        if !matches!(config.environment.as_str(), "staging" | "production") {
            return Err(envy::Error::Custom(format!(
                "ENVIRONMENT must be 'staging' or 'production', got '{}'",
                config.environment
            )));
        }

        Ok(config)
    }
}
