//! Conversion pipeline: decides between WebP and JPEG output.
//!
//! ```text
//! START → DECODE → WEBP_ENCODE ──ok──→ DONE(image/webp)
//!                      │
//!                      └─err─→ JPEG_ENCODE (re-decoded from the original bytes)
//! START → DECODE → JPEG_ENCODE ──ok──→ DONE(image/jpeg)
//!                      └─err─→ FAILED
//! ```
//!
//! The pipeline holds no per-request state; identical inputs give identical
//! output as long as the codec itself is deterministic.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use thiserror::Error;

use crate::config::{ConversionConfig, Quality};
use crate::convert::codec::{CodecError, CodecOptions, ImageCodec, OutputFormat, RasterCodec};
use crate::convert::webp::{build_encoder, WebpEncoder};
use crate::observability::metrics;

/// Converted body and the content type to send with it.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub bytes: Bytes,
    pub content_type: &'static str,
}

/// Terminal conversion failures.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("conversion task aborted: {0}")]
    Aborted(String),
}

/// Stateless transcoder shared by every request.
#[derive(Clone)]
pub struct ConversionPipeline {
    codec: Arc<dyn ImageCodec>,
    webp: Arc<dyn WebpEncoder>,
    options: CodecOptions,
}

impl ConversionPipeline {
    pub fn new(codec: Arc<dyn ImageCodec>, webp: Arc<dyn WebpEncoder>, options: CodecOptions) -> Self {
        Self { codec, webp, options }
    }

    /// Pipeline with the default codec and the configured WebP encoder.
    pub fn from_config(config: &ConversionConfig) -> Self {
        let codec: Arc<dyn ImageCodec> = Arc::new(RasterCodec);
        let webp = build_encoder(config, Arc::clone(&codec));
        Self::new(codec, webp, CodecOptions::from(config))
    }

    /// Swap the codec and encoder, e.g. for instrumented wrappers.
    pub fn map_collaborators<F, G>(self, codec: F, webp: G) -> Self
    where
        F: FnOnce(Arc<dyn ImageCodec>) -> Arc<dyn ImageCodec>,
        G: FnOnce(Arc<dyn WebpEncoder>) -> Arc<dyn WebpEncoder>,
    {
        Self {
            codec: codec(self.codec),
            webp: webp(self.webp),
            options: self.options,
        }
    }

    /// Transcode `source`. WebP failures fall back to JPEG silently; only a
    /// JPEG failure is returned.
    pub async fn convert(
        &self,
        source: Bytes,
        quality: Quality,
        want_webp: bool,
    ) -> Result<ConversionResult, ConvertError> {
        let start = Instant::now();

        if want_webp {
            match self.webp.encode(source.clone(), quality).await {
                Ok(encoded) => {
                    metrics::record_conversion(OutputFormat::Webp.content_type(), start);
                    return Ok(ConversionResult {
                        bytes: Bytes::from(encoded),
                        content_type: OutputFormat::Webp.content_type(),
                    });
                }
                Err(e) => {
                    tracing::debug!(error = %e, "WebP encode failed, falling back to JPEG");
                    metrics::record_webp_fallback();
                }
            }
        }

        let encoded = self.encode_jpeg(source, quality).await?;
        metrics::record_conversion(OutputFormat::Jpeg.content_type(), start);

        Ok(ConversionResult {
            bytes: Bytes::from(encoded),
            content_type: OutputFormat::Jpeg.content_type(),
        })
    }

    async fn encode_jpeg(&self, source: Bytes, quality: Quality) -> Result<Vec<u8>, ConvertError> {
        let codec = Arc::clone(&self.codec);
        let options = self.options;

        tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ConvertError> {
            let image = codec.decode(&source, options.auto_orient)?;
            Ok(codec.encode(&image, OutputFormat::Jpeg, quality, options.strip_metadata)?)
        })
        .await
        .map_err(|e| ConvertError::Aborted(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::codec::tests::{sample_jpeg, with_exif_orientation};
    use crate::convert::webp::{EncodeError, LibWebpEncoder};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Always fails, remembering the bytes it was handed.
    #[derive(Default)]
    struct FailingWebp {
        seen: Mutex<Vec<Bytes>>,
    }

    #[async_trait]
    impl WebpEncoder for FailingWebp {
        async fn encode(&self, source: Bytes, _quality: Quality) -> Result<Vec<u8>, EncodeError> {
            self.seen.lock().unwrap().push(source);
            Err(EncodeError::Aborted("simulated".into()))
        }
    }

    fn pipeline_with(webp: Arc<dyn WebpEncoder>) -> ConversionPipeline {
        ConversionPipeline::new(Arc::new(RasterCodec), webp, CodecOptions::default())
    }

    fn libwebp_pipeline() -> ConversionPipeline {
        let codec: Arc<dyn ImageCodec> = Arc::new(RasterCodec);
        let webp = Arc::new(LibWebpEncoder::new(Arc::clone(&codec), CodecOptions::default(), 2));
        ConversionPipeline::new(codec, webp, CodecOptions::default())
    }

    #[tokio::test]
    async fn jpeg_is_recompressed() {
        let source = Bytes::from(sample_jpeg(160, 120, 100));
        let result = pipeline_with(Arc::new(FailingWebp::default()))
            .convert(source.clone(), Quality::DEFAULT, false)
            .await
            .unwrap();

        assert_eq!(result.content_type, "image/jpeg");
        assert!(result.bytes.len() < source.len());
    }

    #[tokio::test]
    async fn webp_requested_and_encoded() {
        let result = libwebp_pipeline()
            .convert(Bytes::from(sample_jpeg(64, 64, 95)), Quality::DEFAULT, true)
            .await
            .unwrap();

        assert_eq!(result.content_type, "image/webp");
        assert_eq!(&result.bytes[8..12], b"WEBP");
    }

    #[tokio::test]
    async fn webp_failure_falls_back_to_jpeg_from_original_bytes() {
        let failing = Arc::new(FailingWebp::default());
        let pipeline = pipeline_with(failing.clone());
        let source = Bytes::from(sample_jpeg(80, 60, 100));

        let fallback = pipeline.convert(source.clone(), Quality::DEFAULT, true).await.unwrap();
        let direct = pipeline.convert(source.clone(), Quality::DEFAULT, false).await.unwrap();

        assert_eq!(fallback.content_type, "image/jpeg");
        assert_eq!(fallback.bytes, direct.bytes);
        assert_eq!(failing.seen.lock().unwrap().as_slice(), &[source]);
    }

    #[tokio::test]
    async fn fallback_failure_is_terminal() {
        let err = pipeline_with(Arc::new(FailingWebp::default()))
            .convert(Bytes::from_static(b"not a jpeg"), Quality::DEFAULT, true)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Codec(CodecError::Decode(_))));
    }

    #[tokio::test]
    async fn conversion_is_idempotent() {
        let source = Bytes::from(sample_jpeg(96, 72, 100));
        for want_webp in [false, true] {
            let pipeline = libwebp_pipeline();
            let first = pipeline.convert(source.clone(), Quality::new(80), want_webp).await.unwrap();
            let second = pipeline.convert(source.clone(), Quality::new(80), want_webp).await.unwrap();
            assert_eq!(first.bytes.len(), second.bytes.len());
            assert_eq!(first.bytes, second.bytes);
        }
    }

    #[tokio::test]
    async fn rotated_source_is_normalized() {
        let source = Bytes::from(with_exif_orientation(&sample_jpeg(40, 20, 95), 6));
        let result = pipeline_with(Arc::new(FailingWebp::default()))
            .convert(source, Quality::DEFAULT, false)
            .await
            .unwrap();

        let decoded = RasterCodec.decode(&result.bytes, true).unwrap();
        assert_eq!(decoded.dimensions(), (20, 40));
    }
}
