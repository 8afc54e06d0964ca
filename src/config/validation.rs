//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, status codes, addresses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: OyakiConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::OyakiConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("origin host must not be empty")]
    MissingOriginHost,

    #[error("origin scheme '{0}' is not http or https")]
    UnsupportedScheme(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("unreachable status {0} is not a 4xx or 5xx code")]
    InvalidUnreachableStatus(u16),

    #[error("bind address '{0}' is not a socket address")]
    InvalidBindAddress(String),

    #[error("metrics address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),

    #[error("origin base URL '{url}' does not parse: {reason}")]
    InvalidOriginUrl { url: String, reason: String },

    #[error("{key}='{value}' is not a usable value")]
    InvalidEnv { key: &'static str, value: String },
}

/// Check a loaded configuration, collecting every error found.
pub fn validate_config(config: &OyakiConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.origin.host.trim().is_empty() {
        errors.push(ValidationError::MissingOriginHost);
    }
    let scheme_ok = matches!(config.origin.scheme.as_str(), "http" | "https");
    if !scheme_ok {
        errors.push(ValidationError::UnsupportedScheme(config.origin.scheme.clone()));
    }
    // Only meaningful once host and scheme are individually sane.
    if scheme_ok && !config.origin.host.trim().is_empty() {
        let url = config.origin.base_url();
        if let Err(e) = Url::parse(&url) {
            errors.push(ValidationError::InvalidOriginUrl {
                url,
                reason: e.to_string(),
            });
        }
    }
    if config.origin.timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "origin.timeout_secs" });
    }
    if !(400..=599).contains(&config.origin.unreachable_status) {
        errors.push(ValidationError::InvalidUnreachableStatus(
            config.origin.unreachable_status,
        ));
    }
    if config.conversion.webp.max_concurrency == 0 {
        errors.push(ValidationError::Zero { field: "conversion.webp.max_concurrency" });
    }
    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if let Some(addr) = &config.observability.metrics_address {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidMetricsAddress(addr.clone()));
        }
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

    fn valid() -> OyakiConfig {
        let mut config = OyakiConfig::default();
        config.origin.host = "origin.example.com".into();
        config
    }

    #[test]
    fn accepts_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn reports_every_error() {
        let mut config = valid();
        config.origin.host = String::new();
        config.origin.scheme = "ftp".into();
        config.origin.unreachable_status = 200;
        config.conversion.webp.max_concurrency = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::MissingOriginHost));
        assert!(errors.contains(&ValidationError::InvalidUnreachableStatus(200)));
    }

    #[test]
    fn rejects_bad_bind_address() {
        let mut config = valid();
        config.listener.bind_address = "not-an-address".into();
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::InvalidBindAddress("not-an-address".into())]
        );
    }

    #[test]
    fn rejects_origin_that_does_not_form_a_url() {
        let mut config = valid();
        config.origin.host = "bad host".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            ValidationError::InvalidOriginUrl { url, .. } if url == "https://bad host"
        ));
    }

    #[test]
    fn origin_with_port_is_a_valid_url() {
        let mut config = valid();
        config.origin.scheme = "http".into();
        config.origin.host = "127.0.0.1:8080".into();
        assert!(validate_config(&config).is_ok());
    }
}
