//! Proxy error taxonomy and its mapping to HTTP statuses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::convert::ConvertError;
use crate::origin::OriginError;

/// Every way a proxied request can end without a converted or forwarded body.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0}")]
    InvalidOriginUrl(#[source] OriginError),

    /// Transport failure reaching the origin. `status` is the configured
    /// answer, 403 unless overridden.
    #[error("origin unreachable: {source}")]
    UpstreamUnreachable {
        status: StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("origin returned 404 Not Found")]
    UpstreamNotFound,

    #[error("origin returned 403 Forbidden")]
    UpstreamForbidden,

    #[error("origin returned {0}")]
    UpstreamOther(StatusCode),

    #[error("reading origin body failed: {0}")]
    BodyRead(#[source] reqwest::Error),

    #[error("image conversion failed: {0}")]
    Convert(#[from] ConvertError),
}

impl ProxyError {
    /// Classify an origin failure.
    pub fn from_origin(err: OriginError, unreachable_status: StatusCode) -> Self {
        match err {
            e @ (OriginError::InvalidUrl(_) | OriginError::MalformedEscape(_)) => {
                ProxyError::InvalidOriginUrl(e)
            }
            OriginError::Transport(source) => ProxyError::UpstreamUnreachable {
                status: unreachable_status,
                source,
            },
            OriginError::UpstreamStatus(status) => Self::from_status(status),
        }
    }

    /// Classify an origin status other than 200/304.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::NOT_FOUND => ProxyError::UpstreamNotFound,
            StatusCode::FORBIDDEN => ProxyError::UpstreamForbidden,
            other => ProxyError::UpstreamOther(other),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidOriginUrl(_) => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamUnreachable { status, .. } => *status,
            ProxyError::UpstreamNotFound => StatusCode::NOT_FOUND,
            ProxyError::UpstreamForbidden => StatusCode::FORBIDDEN,
            ProxyError::UpstreamOther(_) => StatusCode::BAD_GATEWAY,
            ProxyError::BodyRead(_) | ProxyError::Convert(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::InvalidOriginUrl(_) => "invalid_origin_url",
            ProxyError::UpstreamUnreachable { .. } => "upstream_unreachable",
            ProxyError::UpstreamNotFound => "upstream_not_found",
            ProxyError::UpstreamForbidden => "upstream_forbidden",
            ProxyError::UpstreamOther(_) => "upstream_error",
            ProxyError::BodyRead(_) => "body_read",
            ProxyError::Convert(_) => "convert",
        }
    }

    /// Text written to the client.
    fn public_message(&self) -> &'static str {
        match self {
            ProxyError::InvalidOriginUrl(_) => "Invalid origin URL",
            ProxyError::UpstreamUnreachable { .. }
            | ProxyError::UpstreamNotFound
            | ProxyError::UpstreamForbidden
            | ProxyError::UpstreamOther(_) => "Get origin failed",
            ProxyError::BodyRead(_) => "Read origin body failed",
            ProxyError::Convert(_) => "Image convert failed",
        }
    }

    /// Emit the single log event for this failure.
    pub fn log(&self, request_id: &str, uri: &str) {
        match self {
            ProxyError::UpstreamNotFound | ProxyError::UpstreamForbidden => {
                tracing::warn!(
                    request_id = %request_id,
                    uri = %uri,
                    kind = self.kind(),
                    "Get origin failed: {}", self
                );
            }
            ProxyError::UpstreamOther(status) => {
                tracing::error!(
                    request_id = %request_id,
                    uri = %uri,
                    kind = self.kind(),
                    upstream_status = %status,
                    "Get origin failed"
                );
            }
            _ => {
                tracing::error!(
                    request_id = %request_id,
                    uri = %uri,
                    kind = self.kind(),
                    error = %self,
                    "{}", self.public_message()
                );
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.public_message()).into_response()
    }
}
