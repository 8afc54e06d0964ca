//! Image conversion subsystem.
//!
//! # Data Flow
//! ```text
//! origin JPEG bytes
//!     → pipeline.rs (WebP wanted? try it, else / on failure JPEG)
//!         → webp.rs (libwebp or cwebp subprocess)
//!         → codec.rs (decode, orient, encode)
//!     → ConversionResult { bytes, content_type }
//! ```
//!
//! # Design Decisions
//! - Codec and WebP encoder are traits so implementations can be swapped
//! - CPU-bound work runs on the blocking pool, one task per request
//! - WebP encodes are bounded by a semaphore
//! - No conversion result is cached

pub mod codec;
pub mod pipeline;
pub mod webp;

pub use codec::{CodecError, CodecOptions, DecodedImage, ImageCodec, OutputFormat, RasterCodec};
pub use pipeline::{ConversionPipeline, ConversionResult, ConvertError};
pub use webp::{build_encoder, CwebpEncoder, EncodeError, LibWebpEncoder, WebpEncoder};
