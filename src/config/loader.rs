//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::{ClientConfig, DEFAULT_API_BASE};
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable holding the gateway base URL.
pub const ENV_API_BASE: &str = "PORTAL_API_BASE";
/// Optional override of the default per-attempt deadline.
pub const ENV_REQUEST_TIMEOUT_MS: &str = "PORTAL_REQUEST_TIMEOUT_MS";
/// Optional override of the default retry budget.
pub const ENV_RETRY_BUDGET: &str = "PORTAL_RETRY_BUDGET";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("PORTAL_API_BASE is not set and no default base URL is acceptable")]
    MissingBaseUrl,

    #[error("{name} has invalid value '{value}'")]
    InvalidEnv { name: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("HTTP client setup failed: {0}")]
    HttpClient(#[from] reqwest::Error),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ClientConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

impl ClientConfig {
    /// Build configuration from the process environment, falling back to
    /// [`DEFAULT_API_BASE`] when `PORTAL_API_BASE` is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        from_lookup(|key| std::env::var(key).ok(), false)
    }

    /// Like [`ClientConfig::from_env`] but fails fast when `PORTAL_API_BASE` is unset.
    pub fn from_env_strict() -> Result<Self, ConfigError> {
        from_lookup(|key| std::env::var(key).ok(), true)
    }
}

/// Build configuration from an arbitrary key lookup.
pub fn from_lookup<F>(lookup: F, strict: bool) -> Result<ClientConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let base_url = match lookup(ENV_API_BASE).filter(|v| !v.trim().is_empty()) {
        Some(v) => v.trim().to_string(),
        None if strict => return Err(ConfigError::MissingBaseUrl),
        None => DEFAULT_API_BASE.to_string(),
    };

    let mut config = ClientConfig::with_base_url(base_url);

    if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_MS) {
        config.timeouts.request_ms = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            name: ENV_REQUEST_TIMEOUT_MS,
            value: raw.clone(),
        })?;
    }

    if let Some(raw) = lookup(ENV_RETRY_BUDGET) {
        config.retries.default_budget =
            raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: ENV_RETRY_BUDGET,
                value: raw.clone(),
            })?;
    }

    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::debug!(base_url = %config.base_url(), "Configuration loaded from environment");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_base_when_unset() {
        let config = from_lookup(env(&[]), false).unwrap();
        assert_eq!(config.base_url(), DEFAULT_API_BASE);
    }

    #[test]
    fn test_strict_fails_fast_when_unset() {
        let err = from_lookup(env(&[(ENV_API_BASE, "  ")]), true).unwrap_err();
        assert!(matches!(err, ConfigError::MissingBaseUrl));
    }

    #[test]
    fn test_trailing_slash_tolerated() {
        let config = from_lookup(env(&[(ENV_API_BASE, "https://gw.example.org/")]), true).unwrap();
        assert_eq!(config.base_url(), "https://gw.example.org");
    }

    #[test]
    fn test_overrides() {
        let config = from_lookup(
            env(&[
                (ENV_API_BASE, "http://10.0.0.5:9000"),
                (ENV_REQUEST_TIMEOUT_MS, "2500"),
                (ENV_RETRY_BUDGET, "3"),
            ]),
            false,
        )
        .unwrap();
        assert_eq!(config.timeouts.request_ms, 2500);
        assert_eq!(config.retries.default_budget, 3);
    }

    #[test]
    fn test_invalid_override() {
        let err = from_lookup(env(&[(ENV_RETRY_BUDGET, "many")]), false).unwrap_err();
        assert!(err.to_string().contains(ENV_RETRY_BUDGET));
    }

    #[test]
    fn test_load_config_from_file() {
        let path = std::env::temp_dir().join(format!("portal-client-{}.toml", uuid::Uuid::new_v4()));
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[api]\nbase_url = \"http://127.0.0.1:7000/\"\n[timeouts]\nrequest_ms = 500").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.base_url(), "http://127.0.0.1:7000");
        assert_eq!(config.timeouts.request_ms, 500);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_config_rejects_invalid() {
        let path = std::env::temp_dir().join(format!("portal-client-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, "[api]\nbase_url = \"gopher://x\"\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        fs::remove_file(&path).unwrap();
    }
}
