//! Configuration loading from disk and the environment.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::{normalize_log_level, LogFormat, OyakiConfig, Quality, WebpEncoderKind};
use crate::config::validation::{validate_config, ValidationError};

/// Why a configuration could not be produced.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not valid TOML: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {}", summarize(.0))]
    Invalid(Vec<ValidationError>),
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Load configuration: optional TOML file, then `OYAKI_*` environment
/// overrides, then validation. Unusable environment values are reported
/// together with validation errors; nothing is logged, since logging is not
/// set up yet.
pub fn load_config(path: Option<&Path>) -> Result<OyakiConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        }
        None => OyakiConfig::default(),
    };

    let mut errors = apply_env(&mut config, |key| std::env::var(key).ok());
    if let Err(invalid) = validate_config(&config) {
        errors.extend(invalid);
    }

    if errors.is_empty() {
        Ok(config)
    } else {
        Err(ConfigError::Invalid(errors))
    }
}

/// Overlay environment variables onto `config` and return the variables
/// whose values could not be used.
///
/// `lookup` returns the raw value of a variable; empty values count as unset.
/// An unknown `OYAKI_LOGLEVEL` falls back to info and an unparsable
/// `OYAKI_QUALITY` to 90; neither is an error.
pub fn apply_env<F>(config: &mut OyakiConfig, lookup: F) -> Vec<ValidationError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
    let mut rejected = Vec::new();
    let mut reject = |key: &'static str, value: String| {
        rejected.push(ValidationError::InvalidEnv { key, value });
    };

    if let Some(scheme) = get("OYAKI_ORIGIN_SCHEME") {
        config.origin.scheme = scheme;
    }
    if let Some(host) = get("OYAKI_ORIGIN_HOST") {
        config.origin.host = host;
    }
    if let Some(status) = get("OYAKI_UNREACHABLE_STATUS") {
        match status.trim().parse() {
            Ok(code) => config.origin.unreachable_status = code,
            Err(_) => reject("OYAKI_UNREACHABLE_STATUS", status),
        }
    }
    if let Some(quality) = get("OYAKI_QUALITY") {
        config.conversion.quality = Quality::parse_or_default(&quality);
    }
    if let Some(flag) = get("OYAKI_AUTO_ORIENT") {
        match parse_bool(&flag) {
            Some(on) => config.conversion.auto_orient = on,
            None => reject("OYAKI_AUTO_ORIENT", flag),
        }
    }
    if let Some(flag) = get("OYAKI_STRIP_METADATA") {
        match parse_bool(&flag) {
            Some(on) => config.conversion.strip_metadata = on,
            None => reject("OYAKI_STRIP_METADATA", flag),
        }
    }
    if let Some(kind) = get("OYAKI_WEBP_ENCODER") {
        match kind.parse::<WebpEncoderKind>() {
            Ok(kind) => config.conversion.webp.encoder = kind,
            Err(_) => reject("OYAKI_WEBP_ENCODER", kind),
        }
    }
    if let Some(path) = get("OYAKI_CWEBP_PATH") {
        config.conversion.webp.cwebp_path = path.into();
    }
    if let Some(limit) = get("OYAKI_WEBP_MAX_CONCURRENCY") {
        match limit.trim().parse() {
            Ok(limit) => config.conversion.webp.max_concurrency = limit,
            Err(_) => reject("OYAKI_WEBP_MAX_CONCURRENCY", limit),
        }
    }
    if let Some(level) = get("OYAKI_LOGLEVEL") {
        config.observability.log_level = normalize_log_level(&level).to_string();
    }
    if let Some(format) = get("OYAKI_LOG_FORMAT") {
        match format.trim().to_ascii_lowercase().as_str() {
            "json" => config.observability.log_format = LogFormat::Json,
            "pretty" => config.observability.log_format = LogFormat::Pretty,
            _ => reject("OYAKI_LOG_FORMAT", format),
        }
    }
    if let Some(addr) = get("OYAKI_LISTEN") {
        config.listener.bind_address = addr;
    }
    if let Some(addr) = get("OYAKI_METRICS_ADDR") {
        config.observability.metrics_address = Some(addr);
    }

    rejected
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
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
    fn env_overrides_origin_and_quality() {
        let mut config = OyakiConfig::default();
        apply_env(
            &mut config,
            env(&[
                ("OYAKI_ORIGIN_SCHEME", "http"),
                ("OYAKI_ORIGIN_HOST", "127.0.0.1:9000"),
                ("OYAKI_QUALITY", "65"),
            ]),
        );
        assert_eq!(config.origin.base_url(), "http://127.0.0.1:9000");
        assert_eq!(config.conversion.quality.get(), 65);
    }

    #[test]
    fn scheme_defaults_to_https_when_empty() {
        let mut config = OyakiConfig::default();
        apply_env(&mut config, env(&[("OYAKI_ORIGIN_SCHEME", ""), ("OYAKI_ORIGIN_HOST", "o")]));
        assert_eq!(config.origin.base_url(), "https://o");
    }

    #[test]
    fn unparsable_quality_falls_back_to_default() {
        let mut config = OyakiConfig::default();
        config.conversion.quality = Quality::new(40);
        apply_env(&mut config, env(&[("OYAKI_QUALITY", "high")]));
        assert_eq!(config.conversion.quality.get(), 90);
    }

    #[test]
    fn conversion_flags_and_encoder() {
        let mut config = OyakiConfig::default();
        apply_env(
            &mut config,
            env(&[
                ("OYAKI_AUTO_ORIENT", "false"),
                ("OYAKI_STRIP_METADATA", "0"),
                ("OYAKI_WEBP_ENCODER", "cwebp"),
                ("OYAKI_WEBP_MAX_CONCURRENCY", "2"),
                ("OYAKI_LOGLEVEL", "DEBUG"),
            ]),
        );
        assert!(!config.conversion.auto_orient);
        assert!(!config.conversion.strip_metadata);
        assert_eq!(config.conversion.webp.encoder, WebpEncoderKind::Cwebp);
        assert_eq!(config.conversion.webp.max_concurrency, 2);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn loads_file_and_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[origin]\nhost = \"\"\nscheme = \"gopher\"").unwrap();

        match load_config(Some(file.path())) {
            Err(ConfigError::Invalid(errors)) => {
                assert!(errors.contains(&ValidationError::UnsupportedScheme("gopher".into())));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = load_config(Some(Path::new("/nonexistent/oyaki.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/oyaki.toml"));
    }

    #[test]
    fn unusable_env_values_are_reported() {
        let mut config = OyakiConfig::default();
        let rejected = apply_env(
            &mut config,
            env(&[
                ("OYAKI_UNREACHABLE_STATUS", "gateway"),
                ("OYAKI_WEBP_ENCODER", "magick"),
                ("OYAKI_WEBP_MAX_CONCURRENCY", "many"),
                ("OYAKI_LOG_FORMAT", "xml"),
            ]),
        );
        let keys: Vec<_> = rejected
            .iter()
            .map(|e| match e {
                ValidationError::InvalidEnv { key, .. } => *key,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(
            keys,
            [
                "OYAKI_UNREACHABLE_STATUS",
                "OYAKI_WEBP_ENCODER",
                "OYAKI_WEBP_MAX_CONCURRENCY",
                "OYAKI_LOG_FORMAT",
            ]
        );
        // Rejected values leave the defaults in place.
        assert_eq!(config.origin.unreachable_status, 403);
        assert_eq!(config.conversion.webp.max_concurrency, 4);
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        let mut config = OyakiConfig::default();
        let rejected = apply_env(&mut config, env(&[("OYAKI_LOGLEVEL", "verbose")]));
        assert!(rejected.is_empty());
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn invalid_message_lists_every_problem() {
        let err = ConfigError::Invalid(vec![
            ValidationError::MissingOriginHost,
            ValidationError::InvalidEnv {
                key: "OYAKI_WEBP_MAX_CONCURRENCY",
                value: "many".into(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "invalid configuration: origin host must not be empty; \
             OYAKI_WEBP_MAX_CONCURRENCY='many' is not a usable value"
        );
    }
}
