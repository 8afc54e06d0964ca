//! Origin access subsystem.
//!
//! # Data Flow
//! ```text
//! incoming request URI
//!     → client.rs (base URL + URI, forwarded headers, GET)
//!     → webp.rs (for `.webp` paths: strip suffix, GET, accept 200/304 only)
//!     → UpstreamResponse (status, headers, body stream)
//! ```

pub mod client;
pub mod webp;

pub use client::{OriginClient, OriginError, UpstreamResponse, USER_AGENT};
pub use webp::{has_webp_suffix, strip_webp_suffix, WebpResolver};
