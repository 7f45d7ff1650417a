//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Base URL used when no explicit gateway address is configured.
pub const DEFAULT_API_BASE: &str = "http://localhost:8080";

/// Root configuration for the portal client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Gateway location.
    pub api: ApiConfig,

    /// Per-attempt deadline settings.
    pub timeouts: TimeoutConfig,

    /// Retry policy for the request dispatcher.
    pub retries: RetryConfig,

    /// Reconnection policy for push streams.
    pub stream: StreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ClientConfig {
    /// Build a configuration pointing at `base_url`, everything else defaulted.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            api: ApiConfig {
                base_url: base_url.into(),
            },
            ..Default::default()
        }
    }

    /// The base URL with trailing slashes removed.
    pub fn base_url(&self) -> &str {
        self.api.base_url.trim_end_matches('/')
    }

    /// Join `path` onto the base URL with exactly one slash in between.
    pub fn url_for(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{}", self.base_url(), path)
    }
}

/// Gateway location.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API base URL (e.g., "https://gateway.example.org/api").
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
        }
    }
}

/// Timeout configuration for outbound calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default per-attempt deadline in milliseconds. Zero disables the deadline.
    pub request_ms: u64,
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_ms: 15_000 }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries granted to a request that does not ask for a specific budget.
    pub default_budget: u32,

    /// Ceiling applied to every requested budget.
    pub max_budget: u32,

    /// Base delay of the linear backoff in milliseconds (delay = base * attempt).
    pub base_delay_ms: u64,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            default_budget: 1,
            max_budget: 5,
            base_delay_ms: 300,
        }
    }
}

/// Push stream reconnection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// First reconnection delay in milliseconds; doubles on each consecutive failure.
    pub reconnect_base_ms: u64,

    /// Upper bound for the reconnection delay in milliseconds.
    pub reconnect_max_ms: u64,

    /// Maximum total reconnections over the connection's lifetime before
    /// giving up. `None` retries forever.
    pub max_reconnects: Option<u32>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_base_ms: 3_000,
            reconnect_max_ms: 30_000,
            max_reconnects: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url(), DEFAULT_API_BASE);
        assert_eq!(config.timeouts.request(), Duration::from_secs(15));
        assert_eq!(config.retries.default_budget, 1);
        assert_eq!(config.retries.base_delay(), Duration::from_millis(300));
        assert!(config.stream.max_reconnects.is_none());
    }

    #[test]
    fn test_url_joining_tolerates_slashes() {
        let config = ClientConfig::with_base_url("http://gw.local/api//");
        assert_eq!(config.url_for("/auth/me"), "http://gw.local/api/auth/me");
        assert_eq!(config.url_for("auth/me"), "http://gw.local/api/auth/me");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [api]
            base_url = "https://portal.example.org/"

            [retries]
            default_budget = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.base_url(), "https://portal.example.org");
        assert_eq!(config.retries.default_budget, 2);
        assert_eq!(config.retries.max_budget, 5);
        assert_eq!(config.timeouts.request_ms, 15_000);
    }
}
