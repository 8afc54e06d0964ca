//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for oyaki.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct OyakiConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Origin server and origin client settings.
    pub origin: OriginConfig,

    /// Transcoding settings.
    pub conversion: ConversionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Seconds to wait for in-flight connections on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            shutdown_grace_secs: 10,
        }
    }
}

/// Origin server the proxy fronts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// URL scheme of the origin ("http" or "https").
    pub scheme: String,

    /// Origin authority (host, optionally with port).
    pub host: String,

    /// Total request timeout for origin fetches in seconds.
    pub timeout_secs: u64,

    /// Idle connections kept per origin host.
    pub max_idle_per_host: usize,

    /// Idle connection lifetime in seconds.
    pub idle_timeout_secs: u64,

    /// Status written when the origin cannot be reached at all.
    ///
    /// Defaults to 403, which is what the service has always answered.
    pub unreachable_status: u16,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            host: String::new(),
            timeout_secs: 10,
            max_idle_per_host: 100,
            idle_timeout_secs: 90,
            unreachable_status: 403,
        }
    }
}

impl OriginConfig {
    /// Base URL of the origin, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }
}

/// Encoding quality, always within 1..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "i64", into = "u8")]
pub struct Quality(u8);

impl Quality {
    pub const DEFAULT: Quality = Quality(90);

    /// Clamp an arbitrary integer into the valid range.
    pub fn new(value: i64) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    /// Parse a textual quality, falling back to the default when unparsable.
    pub fn parse_or_default(raw: &str) -> Self {
        raw.trim()
            .parse::<i64>()
            .map(Self::new)
            .unwrap_or(Self::DEFAULT)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<i64> for Quality {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl From<Quality> for u8 {
    fn from(q: Quality) -> Self {
        q.0
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transcoding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Output quality for JPEG and WebP.
    pub quality: Quality,

    /// Rotate pixels according to the source EXIF orientation before encoding.
    pub auto_orient: bool,

    /// Drop EXIF/ICC metadata from the output.
    pub strip_metadata: bool,

    /// WebP encoder selection.
    pub webp: WebpConfig,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            quality: Quality::DEFAULT,
            auto_orient: true,
            strip_metadata: true,
            webp: WebpConfig::default(),
        }
    }
}

/// Which WebP encoder implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WebpEncoderKind {
    /// In-process libwebp.
    #[default]
    Libwebp,
    /// External `cwebp` binary, one subprocess per conversion.
    Cwebp,
}

impl std::str::FromStr for WebpEncoderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "libwebp" => Ok(Self::Libwebp),
            "cwebp" => Ok(Self::Cwebp),
            other => Err(format!("unknown webp encoder '{}'", other)),
        }
    }
}

/// WebP encoder configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebpConfig {
    pub encoder: WebpEncoderKind,

    /// Path or name of the `cwebp` binary.
    pub cwebp_path: PathBuf,

    /// Directory for temporary input files handed to `cwebp`.
    pub temp_dir: Option<PathBuf>,

    /// Maximum concurrent WebP encodes.
    pub max_concurrency: usize,
}

impl Default for WebpConfig {
    fn default() -> Self {
        Self {
            encoder: WebpEncoderKind::Libwebp,
            cwebp_path: PathBuf::from("cwebp"),
            temp_dir: None,
            max_concurrency: 4,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Prometheus exporter bind address. Disabled when unset.
    pub metrics_address: Option<String>,

    /// Wrap codec and encoder calls in tracing spans.
    pub trace_conversions: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_address: None,
            trace_conversions: false,
        }
    }
}

/// Levels accepted for `observability.log_level`.
pub const LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

/// The known level `raw` names, case-insensitively; anything else is info.
pub fn normalize_log_level(raw: &str) -> &'static str {
    let lowered = raw.trim().to_ascii_lowercase();
    LOG_LEVELS
        .iter()
        .copied()
        .find(|level| *level == lowered)
        .unwrap_or("info")
}
