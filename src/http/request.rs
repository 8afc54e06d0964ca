//! Request inspection and upstream header derivation.
//!
//! # Responsibilities
//! - Extract the request URI and request ID
//! - Decide which client headers reach the origin
//!
//! # Design Decisions
//! - Only an allow-list is forwarded: User-Agent (fixed), If-Modified-Since,
//!   X-Forwarded-For
//! - Empty If-Modified-Since and one-byte X-Forwarded-For values are dropped

use axum::http::header::{IF_MODIFIED_SINCE, USER_AGENT};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Uri};

use crate::origin;

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Path plus query, as sent by the client.
pub fn request_uri(uri: &Uri) -> &str {
    uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
}

/// Request ID set by the request-id layer, or "unknown".
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Headers to send to the origin for this client request.
pub fn forwarded_headers(incoming: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(origin::USER_AGENT));

    if let Some(ims) = incoming.get(IF_MODIFIED_SINCE).filter(|v| !v.is_empty()) {
        headers.insert(IF_MODIFIED_SINCE, ims.clone());
    }

    if let Some(xff) = incoming.get(X_FORWARDED_FOR).filter(|v| v.len() > 1) {
        headers.insert(X_FORWARDED_FOR, xff.clone());
    }

    headers
}
