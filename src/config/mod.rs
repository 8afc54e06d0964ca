//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! optional config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → OYAKI_* environment overlay
//!     → validation.rs (semantic checks)
//!     → OyakiConfig (validated, immutable)
//!     → shared via Arc to every request
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload path
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::ConversionConfig;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
pub use schema::OriginConfig;
pub use schema::OyakiConfig;
pub use schema::Quality;
pub use schema::WebpConfig;
pub use schema::WebpEncoderKind;
