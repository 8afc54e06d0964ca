//! Oyaki: an image-transcoding reverse proxy.
//!
//! Fetches images from a single origin, recompresses JPEG and optionally
//! serves it as WebP for `.webp` requests, and forwards everything else.

pub mod config;
pub mod convert;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod origin;

pub use config::{load_config, OyakiConfig};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
