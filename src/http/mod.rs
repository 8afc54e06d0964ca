//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept loop, Axum router, request ID, tracing)
//!     → request.rs (request URI, forwarded header allow-list)
//!     → [origin fetch, optional `.webp` resolution]
//!     → [conversion pipeline for JPEG]
//!     → response.rs (passthrough stream or converted body, Last-Modified)
//!     → error.rs (status mapping for every failure)
//!     → Send to client
//! ```

pub mod error;
pub mod request;
pub mod response;
pub mod server;

pub use error::ProxyError;
pub use request::{forwarded_headers, X_FORWARDED_FOR, X_REQUEST_ID};
pub use server::{AppState, HttpServer, ServerError};
