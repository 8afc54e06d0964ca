//! Response construction for the client.
//!
//! # Responsibilities
//! - Forward non-JPEG origin bodies as a stream
//! - Write converted images with exact Content-Length
//! - Synthesize Last-Modified when the origin omits it
//!
//! # Design Decisions
//! - Passthrough never buffers; headers go out before the body arrives
//! - A mid-stream origin failure is logged once here and tagged with
//!   `UpstreamBodyError` so the connection layer does not log it again

use std::error::Error as StdError;

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use thiserror::Error;

use crate::convert::ConversionResult;
use crate::origin::UpstreamResponse;

/// Body of the liveness response.
pub const LIVENESS_BODY: &str = "Oyaki lives!";

const JPEG_MIME: &str = "image/jpeg";

/// Origin body failed after the response head was already sent.
#[derive(Debug, Error)]
#[error("read origin body failed: {source}")]
pub struct UpstreamBodyError {
    #[source]
    pub source: Box<dyn StdError + Send + Sync>,
}

/// RFC 7231 IMF-fixdate.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Origin Last-Modified if present and non-empty, otherwise now.
pub fn last_modified(upstream: &HeaderMap) -> HeaderValue {
    upstream
        .get(LAST_MODIFIED)
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| {
            HeaderValue::from_str(&http_date(Utc::now()))
                .unwrap_or_else(|_| HeaderValue::from_static("Thu, 01 Jan 1970 00:00:00 GMT"))
        })
}

/// Whether an origin Content-Type names JPEG. Parameters and case are ignored.
pub fn is_jpeg(content_type: Option<&HeaderValue>) -> bool {
    content_type
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|essence| essence.trim().eq_ignore_ascii_case(JPEG_MIME))
        .unwrap_or(false)
}

pub fn liveness() -> Response {
    (StatusCode::OK, LIVENESS_BODY).into_response()
}

pub fn not_modified(last_modified: HeaderValue) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    response.headers_mut().insert(LAST_MODIFIED, last_modified);
    response
}

/// Stream the origin body to the client unchanged.
pub fn passthrough(upstream: UpstreamResponse, last_modified: HeaderValue, request_id: &str) -> Response {
    let mut headers = HeaderMap::new();
    if let Some(content_type) = upstream.headers().get(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, content_type.clone());
    }
    if let Some(length) = upstream.headers().get(CONTENT_LENGTH) {
        headers.insert(CONTENT_LENGTH, length.clone());
    }
    headers.insert(LAST_MODIFIED, last_modified);

    let request_id = request_id.to_string();
    let body = upstream.bytes_stream().map_err(move |e| {
        tracing::error!(request_id = %request_id, error = %e, "Read origin body failed");
        UpstreamBodyError { source: Box::new(e) }
    });

    let mut response = Response::new(Body::from_stream(body));
    *response.headers_mut() = headers;
    response
}

/// Converted image with exact length.
pub fn converted(result: ConversionResult, last_modified: HeaderValue) -> Response {
    let length = result.bytes.len();
    let mut response = Response::new(Body::from(result.bytes));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(result.content_type));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(LAST_MODIFIED, last_modified);
    response
}
