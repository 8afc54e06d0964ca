//! Span instrumentation for conversion collaborators.
//!
//! `Traced` wraps an `ImageCodec` or `WebpEncoder` and records a span with
//! timing fields around every call, leaving the wrapped implementation
//! untouched. Enabled with `observability.trace_conversions`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::Instrument;

use crate::config::Quality;
use crate::convert::{CodecError, DecodedImage, EncodeError, ImageCodec, OutputFormat, WebpEncoder};

/// Decorator that adds a span to each call on `inner`.
pub struct Traced<T: ?Sized> {
    inner: Arc<T>,
}

impl<T: ?Sized> Traced<T> {
    pub fn new(inner: Arc<T>) -> Self {
        Self { inner }
    }
}

pub fn traced_codec(inner: Arc<dyn ImageCodec>) -> Arc<dyn ImageCodec> {
    Arc::new(Traced::new(inner))
}

pub fn traced_encoder(inner: Arc<dyn WebpEncoder>) -> Arc<dyn WebpEncoder> {
    Arc::new(Traced::new(inner))
}

impl ImageCodec for Traced<dyn ImageCodec> {
    fn decode(&self, bytes: &[u8], auto_orient: bool) -> Result<DecodedImage, CodecError> {
        let _span = tracing::debug_span!("decode", bytes = bytes.len(), auto_orient).entered();
        let start = Instant::now();
        let result = self.inner.decode(bytes, auto_orient);
        match &result {
            Ok(image) => {
                let (width, height) = image.dimensions();
                tracing::debug!(width, height, elapsed_us = start.elapsed().as_micros() as u64, "decoded");
            }
            Err(e) => tracing::debug!(error = %e, "decode failed"),
        }
        result
    }

    fn encode(
        &self,
        image: &DecodedImage,
        format: OutputFormat,
        quality: Quality,
        strip_metadata: bool,
    ) -> Result<Vec<u8>, CodecError> {
        let _span = tracing::debug_span!(
            "encode",
            format = format.content_type(),
            quality = quality.get(),
            strip_metadata
        )
        .entered();
        let start = Instant::now();
        let result = self.inner.encode(image, format, quality, strip_metadata);
        match &result {
            Ok(encoded) => tracing::debug!(
                bytes = encoded.len(),
                elapsed_us = start.elapsed().as_micros() as u64,
                "encoded"
            ),
            Err(e) => tracing::debug!(error = %e, "encode failed"),
        }
        result
    }
}

#[async_trait]
impl WebpEncoder for Traced<dyn WebpEncoder> {
    async fn encode(&self, source: Bytes, quality: Quality) -> Result<Vec<u8>, EncodeError> {
        let span = tracing::debug_span!("webp_encode", bytes = source.len(), quality = quality.get());
        let start = Instant::now();
        let result = self.inner.encode(source, quality).instrument(span.clone()).await;
        span.in_scope(|| match &result {
            Ok(encoded) => tracing::debug!(
                bytes = encoded.len(),
                elapsed_us = start.elapsed().as_micros() as u64,
                "webp encoded"
            ),
            Err(e) => tracing::debug!(error = %e, "webp encode failed"),
        });
        result
    }
}
