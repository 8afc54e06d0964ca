//! Pooled HTTP client for the origin server.
//!
//! # Responsibilities
//! - Build origin URLs from the incoming request URI
//! - Issue GET requests with the forwarded header set
//! - Keep a bounded idle pool, shared by every request
//!
//! # Design Decisions
//! - One `reqwest::Client` for the process; it is internally synchronized
//! - A fixed total timeout per request; no retries
//! - Status codes are not interpreted here; the handler maps them

use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use futures_util::Stream;
use thiserror::Error;
use url::Url;

use crate::config::OriginConfig;

/// `User-Agent` sent on every origin request.
pub const USER_AGENT: &str = "oyaki";

/// Failures talking to the origin.
#[derive(Debug, Error)]
pub enum OriginError {
    /// The origin URL could not be built from the request.
    #[error("invalid origin URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The request path holds a `%` not followed by two hex digits.
    #[error("malformed percent-escape in {0}")]
    MalformedEscape(String),

    /// DNS, connect, TLS or timeout failure.
    #[error("origin unreachable: {0}")]
    Transport(#[source] reqwest::Error),

    /// The origin answered with a status the caller does not accept.
    #[error("origin returned {0}")]
    UpstreamStatus(StatusCode),
}

/// Response from the origin. Dropping it releases the connection.
#[derive(Debug)]
pub struct UpstreamResponse {
    inner: reqwest::Response,
}

impl UpstreamResponse {
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Buffer the whole body.
    pub async fn bytes(self) -> Result<Bytes, reqwest::Error> {
        self.inner.bytes().await
    }

    /// Stream the body as it arrives.
    pub fn bytes_stream(self) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static {
        self.inner.bytes_stream()
    }
}

/// Shared origin client.
#[derive(Debug, Clone)]
pub struct OriginClient {
    http: reqwest::Client,
    base_url: String,
}

impl OriginClient {
    pub fn new(config: &OriginConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url(),
        })
    }

    /// Origin URL for an incoming request URI (path plus optional query).
    pub fn url_for(&self, request_uri: &str) -> Result<Url, OriginError> {
        check_path_escapes(request_uri)?;
        Ok(Url::parse(&format!("{}{}", self.base_url, request_uri))?)
    }

    /// GET `url` with exactly `headers`.
    pub async fn get(&self, url: Url, headers: HeaderMap) -> Result<UpstreamResponse, OriginError> {
        tracing::debug!(url = %url, "Fetching from origin");

        let inner = self
            .http
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(OriginError::Transport)?;

        Ok(UpstreamResponse { inner })
    }
}

/// `Url::parse` passes bad escapes through untouched, so the path is checked
/// here. The query is left alone.
fn check_path_escapes(request_uri: &str) -> Result<(), OriginError> {
    let path = request_uri.split('?').next().unwrap_or_default().as_bytes();

    for (i, _) in path.iter().enumerate().filter(|(_, b)| **b == b'%') {
        let well_formed = path
            .get(i + 1..i + 3)
            .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
        if !well_formed {
            return Err(OriginError::MalformedEscape(request_uri.to_string()));
        }
    }
    Ok(())
}
