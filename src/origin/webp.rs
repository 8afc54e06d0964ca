//! `.webp` suffix resolution.
//!
//! `GET /photo.jpg.webp` means "fetch `/photo.jpg` from the origin and hand it
//! back as WebP". The resolver only fetches; conversion happens later.

use axum::http::{HeaderMap, StatusCode};
use url::Url;

use crate::origin::client::{OriginClient, OriginError, UpstreamResponse};

const WEBP_SUFFIX: &str = ".webp";

/// Whether a request path asks for WebP output.
pub fn has_webp_suffix(path: &str) -> bool {
    path.ends_with(WEBP_SUFFIX)
}

/// The origin URL of the real resource: `.webp` removed from the path, query
/// left untouched. `None` when the path has no such suffix.
pub fn strip_webp_suffix(url: &Url) -> Option<Url> {
    let real_path = url.path().strip_suffix(WEBP_SUFFIX)?.to_string();
    let mut real = url.clone();
    real.set_path(&real_path);
    Some(real)
}

/// Fetches the real resource behind a `.webp` request.
#[derive(Debug, Clone)]
pub struct WebpResolver {
    client: OriginClient,
}

impl WebpResolver {
    pub fn new(client: OriginClient) -> Self {
        Self { client }
    }

    /// Fetch the un-suffixed resource with the caller's forwarded headers.
    /// Only 200 and 304 are accepted.
    pub async fn resolve(&self, url: &Url, headers: HeaderMap) -> Result<UpstreamResponse, OriginError> {
        let real = strip_webp_suffix(url).unwrap_or_else(|| url.clone());
        let response = self.client.get(real, headers).await?;

        match response.status() {
            StatusCode::OK | StatusCode::NOT_MODIFIED => Ok(response),
            status => Err(OriginError::UpstreamStatus(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_suffix() {
        assert!(has_webp_suffix("/photo.jpg.webp"));
        assert!(has_webp_suffix("/dir/.webp"));
        assert!(!has_webp_suffix("/photo.jpg"));
        assert!(!has_webp_suffix("/webp"));
        assert!(!has_webp_suffix("/photo.WEBP"));
    }

    #[test]
    fn strips_suffix_and_keeps_query() {
        let url = Url::parse("https://origin/a/photo.jpg.webp?v=3&x=y").unwrap();
        let real = strip_webp_suffix(&url).unwrap();
        assert_eq!(real.as_str(), "https://origin/a/photo.jpg?v=3&x=y");
    }

    #[test]
    fn strips_suffix_without_query() {
        let url = Url::parse("http://origin:81/photo.jpg.webp").unwrap();
        assert_eq!(strip_webp_suffix(&url).unwrap().as_str(), "http://origin:81/photo.jpg");
    }

    #[test]
    fn no_suffix_is_none() {
        let url = Url::parse("http://origin/photo.jpg").unwrap();
        assert!(strip_webp_suffix(&url).is_none());
    }
}
