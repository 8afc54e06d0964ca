//! Image codec capability.
//!
//! Decodes raw bytes into pixels and encodes pixels into an output format.
//! The pipeline only sees the [`ImageCodec`] trait; [`RasterCodec`] is the
//! default implementation on top of the `image` and `webp` crates.
//!
//! Neither crate keeps process-wide caches, so nothing here grows across
//! requests.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageDecoder, ImageEncoder, ImageReader};
use thiserror::Error;

use crate::config::{ConversionConfig, Quality};

/// Codec failures. Messages carry the underlying library error text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("decode failed: {0}")]
    Decode(String),

    #[error("encode failed: {0}")]
    Encode(String),
}

/// Output formats the codec can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
        }
    }
}

/// Orientation and metadata handling shared by every encode path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOptions {
    pub auto_orient: bool,
    pub strip_metadata: bool,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            auto_orient: true,
            strip_metadata: true,
        }
    }
}

impl From<&ConversionConfig> for CodecOptions {
    fn from(config: &ConversionConfig) -> Self {
        Self {
            auto_orient: config.auto_orient,
            strip_metadata: config.strip_metadata,
        }
    }
}

/// A decoded image plus the metadata worth carrying forward.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub pixels: DynamicImage,
    pub icc_profile: Option<Vec<u8>>,
}

impl DecodedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.pixels.width(), self.pixels.height())
    }
}

/// Decode/encode capability used by the conversion pipeline.
///
/// Implementations are CPU-bound and called from the blocking pool.
pub trait ImageCodec: Send + Sync + 'static {
    /// Decode `bytes`, applying the EXIF orientation when `auto_orient` is set.
    fn decode(&self, bytes: &[u8], auto_orient: bool) -> Result<DecodedImage, CodecError>;

    /// Encode `image` as `format`. With `strip_metadata` unset, the source
    /// ICC profile is embedded where the format supports it.
    fn encode(
        &self,
        image: &DecodedImage,
        format: OutputFormat,
        quality: Quality,
        strip_metadata: bool,
    ) -> Result<Vec<u8>, CodecError>;
}

/// Codec backed by the `image` crate, with libwebp for lossy WebP.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterCodec;

fn decode_err(e: impl std::fmt::Display) -> CodecError {
    CodecError::Decode(e.to_string())
}

fn encode_err(e: impl std::fmt::Display) -> CodecError {
    CodecError::Encode(e.to_string())
}

impl ImageCodec for RasterCodec {
    fn decode(&self, bytes: &[u8], auto_orient: bool) -> Result<DecodedImage, CodecError> {
        let mut decoder = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(decode_err)?
            .into_decoder()
            .map_err(decode_err)?;

        let orientation = decoder.orientation().map_err(decode_err)?;
        let icc_profile = decoder.icc_profile().map_err(decode_err)?;
        let mut pixels = DynamicImage::from_decoder(decoder).map_err(decode_err)?;

        if auto_orient {
            pixels.apply_orientation(orientation);
        }

        Ok(DecodedImage { pixels, icc_profile })
    }

    fn encode(
        &self,
        image: &DecodedImage,
        format: OutputFormat,
        quality: Quality,
        strip_metadata: bool,
    ) -> Result<Vec<u8>, CodecError> {
        let icc = if strip_metadata { None } else { image.icc_profile.clone() };

        match format {
            OutputFormat::Jpeg => {
                let rgb = image.pixels.to_rgb8();
                let mut out = Vec::new();
                let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.get());
                if let Some(icc) = icc {
                    if let Err(e) = encoder.set_icc_profile(icc) {
                        tracing::debug!(error = %e, "JPEG encoder rejected ICC profile");
                    }
                }
                encoder
                    .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
                    .map_err(encode_err)?;
                Ok(out)
            }
            OutputFormat::Png => {
                let mut out = Vec::new();
                let mut encoder = PngEncoder::new(&mut out);
                if let Some(icc) = icc {
                    if let Err(e) = encoder.set_icc_profile(icc) {
                        tracing::debug!(error = %e, "PNG encoder rejected ICC profile");
                    }
                }
                let rgba = image.pixels.to_rgba8();
                encoder
                    .write_image(rgba.as_raw(), rgba.width(), rgba.height(), ExtendedColorType::Rgba8)
                    .map_err(encode_err)?;
                Ok(out)
            }
            // libwebp encodes from raw pixels, so no metadata is ever written.
            OutputFormat::Webp => {
                let (width, height) = image.dimensions();
                let quality = quality.get() as f32;
                let encoded = if image.pixels.color().has_alpha() {
                    let rgba = image.pixels.to_rgba8();
                    let memory = webp::Encoder::from_rgba(rgba.as_raw(), width, height)
                        .encode_simple(false, quality);
                    memory.map(|m| m.to_vec())
                } else {
                    let rgb = image.pixels.to_rgb8();
                    let memory = webp::Encoder::from_rgb(rgb.as_raw(), width, height)
                        .encode_simple(false, quality);
                    memory.map(|m| m.to_vec())
                };
                encoded.map_err(|e| CodecError::Encode(format!("libwebp: {:?}", e)))
            }
        }
    }
}
