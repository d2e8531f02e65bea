//! Centralized server configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__`
//! separating nested keys (`ENGINE__UTC_OFFSET_MINUTES=330`).

use chatflow_integration::messaging::DEFAULT_BASE_URL;
use serde::Deserialize;
use std::time::Duration;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Maximum database pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Engine tuning.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Messaging provider connection.
    #[serde(default)]
    pub messaging: MessagingConfig,
}

/// Engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Offset east of UTC of the zone that decides "first message of the
    /// day", in minutes.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,

    /// Default timeout of HTTP action nodes.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Largest HTTP action response body read.
    #[serde(default = "default_http_max_response_bytes")]
    pub http_max_response_bytes: usize,

    /// Days of slots offered by booking nodes that do not set their own.
    #[serde(default = "default_booking_days_ahead")]
    pub booking_days_ahead: u32,
}

/// Messaging provider configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagingConfig {
    #[serde(default = "default_messaging_base_url")]
    pub base_url: String,

    #[serde(default = "default_messaging_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_utc_offset_minutes() -> i32 {
    330
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

fn default_http_max_response_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_booking_days_ahead() -> u32 {
    7
}

fn default_messaging_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_messaging_timeout_ms() -> u64 {
    15_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: default_utc_offset_minutes(),
            http_timeout_ms: default_http_timeout_ms(),
            http_max_response_bytes: default_http_max_response_bytes(),
            booking_days_ahead: default_booking_days_ahead(),
        }
    }
}

impl EngineConfig {
    /// HTTP action timeout as a duration.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            base_url: default_messaging_base_url(),
            timeout_ms: default_messaging_timeout_ms(),
        }
    }
}

impl MessagingConfig {
    /// Send timeout as a duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_has_correct_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.utc_offset_minutes, 330);
        assert_eq!(config.http_timeout(), Duration::from_secs(10));
        assert_eq!(config.http_max_response_bytes, 5_242_880);
        assert_eq!(config.booking_days_ahead, 7);
    }

    #[test]
    fn nested_values_override_defaults() {
        let config: ServerConfig = config::Config::builder()
            .set_override("database_url", "postgres://localhost/chatflow")
            .and_then(|builder| builder.set_override("engine.utc_offset_minutes", -300))
            .and_then(|builder| builder.set_override("messaging.timeout_ms", 5000))
            .expect("overrides")
            .build()
            .expect("build")
            .try_deserialize()
            .expect("deserialize");

        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.engine.utc_offset_minutes, -300);
        assert_eq!(config.engine.booking_days_ahead, 7);
        assert_eq!(config.messaging.timeout(), Duration::from_secs(5));
        assert_eq!(config.messaging.base_url, DEFAULT_BASE_URL);
    }
}
