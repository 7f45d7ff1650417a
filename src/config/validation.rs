//! Configuration validation.
//!
//! Semantic checks only; serde handles syntax. Every problem is reported,
//! not just the first one.

use thiserror::Error;
use url::Url;

use crate::config::schema::ClientConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("api.base_url is empty")]
    EmptyBaseUrl,

    #[error("api.base_url '{url}' is not a valid URL: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("api.base_url '{url}' must use http or https, got '{scheme}'")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("retries.default_budget ({budget}) exceeds retries.max_budget ({ceiling})")]
    BudgetAboveCeiling { budget: u32, ceiling: u32 },

    #[error("stream.reconnect_base_ms must be greater than zero")]
    ZeroReconnectDelay,

    #[error("stream.reconnect_max_ms ({max}) is below stream.reconnect_base_ms ({base})")]
    ReconnectCapBelowBase { base: u64, max: u64 },
}

/// Validate a configuration, returning every error found.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let base = config.base_url();
    if base.is_empty() {
        errors.push(ValidationError::EmptyBaseUrl);
    } else {
        match Url::parse(base) {
            Ok(url) if url.scheme() != "http" && url.scheme() != "https" => {
                errors.push(ValidationError::UnsupportedScheme {
                    url: base.to_string(),
                    scheme: url.scheme().to_string(),
                });
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidBaseUrl {
                url: base.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    if config.retries.default_budget > config.retries.max_budget {
        errors.push(ValidationError::BudgetAboveCeiling {
            budget: config.retries.default_budget,
            ceiling: config.retries.max_budget,
        });
    }

    if config.stream.reconnect_base_ms == 0 {
        errors.push(ValidationError::ZeroReconnectDelay);
    } else if config.stream.reconnect_max_ms < config.stream.reconnect_base_ms {
        errors.push(ValidationError::ReconnectCapBelowBase {
            base: config.stream.reconnect_base_ms,
            max: config.stream.reconnect_max_ms,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ClientConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let config = ClientConfig::with_base_url("ftp://gateway.local");
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::UnsupportedScheme { .. }));
    }

    #[test]
    fn test_reports_all_errors() {
        let mut config = ClientConfig::with_base_url("not a url");
        config.retries.default_budget = 9;
        config.stream.reconnect_base_ms = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], ValidationError::InvalidBaseUrl { .. }));
        assert_eq!(
            errors[1],
            ValidationError::BudgetAboveCeiling { budget: 9, ceiling: 5 }
        );
        assert_eq!(errors[2], ValidationError::ZeroReconnectDelay);
    }

    #[test]
    fn test_empty_base_url() {
        let config = ClientConfig::with_base_url("///");
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::EmptyBaseUrl]
        );
    }
}
