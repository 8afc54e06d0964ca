//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! handler / pipeline
//!     → logging.rs (structured log events, JSON or pretty)
//!     → metrics.rs (request and conversion counters, latency histograms)
//!     → tracing.rs (spans around codec and encoder calls)
//! ```
//!
//! # Design Decisions
//! - Request ID comes from the request-id layer and is a field on every
//!   request log event
//! - Metrics are no-ops until an exporter address is configured
//! - Conversion spans are opt-in

pub mod logging;
pub mod metrics;
pub mod tracing;

pub use self::logging::init_logging;
pub use self::metrics::init_metrics;
pub use self::tracing::{traced_codec, traced_encoder, Traced};
