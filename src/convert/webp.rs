//! WebP encoder capability.
//!
//! Two interchangeable implementations sit behind [`WebpEncoder`]:
//! - [`LibWebpEncoder`]: in-process libwebp through the image codec
//! - [`CwebpEncoder`]: one `cwebp` subprocess per conversion, fed through a
//!   temporary file
//!
//! Both bound the number of concurrent encodes with a semaphore and both
//! normalize orientation before encoding, so a viewer that also honors EXIF
//! orientation cannot rotate the result twice.

use std::borrow::Cow;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;

use crate::config::{ConversionConfig, Quality, WebpEncoderKind};
use crate::convert::codec::{CodecError, CodecOptions, ImageCodec, OutputFormat};

/// WebP encoding failures. Any of these sends the pipeline to its JPEG fallback.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("temporary file: {0}")]
    TempFile(#[source] std::io::Error),

    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cwebp exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("encoder task aborted: {0}")]
    Aborted(String),
}

/// Encodes source image bytes to WebP.
#[async_trait]
pub trait WebpEncoder: Send + Sync + 'static {
    async fn encode(&self, source: Bytes, quality: Quality) -> Result<Vec<u8>, EncodeError>;
}

/// Build the encoder selected by `config`.
pub fn build_encoder(config: &ConversionConfig, codec: Arc<dyn ImageCodec>) -> Arc<dyn WebpEncoder> {
    let options = CodecOptions::from(config);
    let limit = config.webp.max_concurrency.max(1);

    match config.webp.encoder {
        WebpEncoderKind::Libwebp => Arc::new(LibWebpEncoder::new(codec, options, limit)),
        WebpEncoderKind::Cwebp => Arc::new(
            CwebpEncoder::new(config.webp.cwebp_path.clone(), codec, options, limit)
                .with_temp_dir(config.webp.temp_dir.clone()),
        ),
    }
}

/// In-process encoder: decode, orient, encode with libwebp.
pub struct LibWebpEncoder {
    codec: Arc<dyn ImageCodec>,
    options: CodecOptions,
    permits: Arc<Semaphore>,
}

impl LibWebpEncoder {
    pub fn new(codec: Arc<dyn ImageCodec>, options: CodecOptions, max_concurrency: usize) -> Self {
        Self {
            codec,
            options,
            permits: Arc::new(Semaphore::new(max_concurrency)),
        }
    }
}

#[async_trait]
impl WebpEncoder for LibWebpEncoder {
    async fn encode(&self, source: Bytes, quality: Quality) -> Result<Vec<u8>, EncodeError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| EncodeError::Aborted(e.to_string()))?;

        let codec = Arc::clone(&self.codec);
        let options = self.options;

        tokio::task::spawn_blocking(move || -> Result<Vec<u8>, EncodeError> {
            let image = codec.decode(&source, options.auto_orient)?;
            Ok(codec.encode(&image, OutputFormat::Webp, quality, options.strip_metadata)?)
        })
        .await
        .map_err(|e| EncodeError::Aborted(e.to_string()))?
    }
}

/// Subprocess encoder around the `cwebp` command line tool.
pub struct CwebpEncoder {
    binary: PathBuf,
    temp_dir: Option<PathBuf>,
    codec: Arc<dyn ImageCodec>,
    options: CodecOptions,
    permits: Arc<Semaphore>,
}

impl CwebpEncoder {
    pub fn new(
        binary: PathBuf,
        codec: Arc<dyn ImageCodec>,
        options: CodecOptions,
        max_concurrency: usize,
    ) -> Self {
        Self {
            binary,
            temp_dir: None,
            codec,
            options,
            permits: Arc::new(Semaphore::new(max_concurrency)),
        }
    }

    /// Create temporary input files under `dir` instead of the system default.
    pub fn with_temp_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.temp_dir = dir;
        self
    }

    /// Write the encoder input to a temporary file. With auto-orientation on,
    /// the source is decoded, rotated and staged as lossless PNG.
    async fn stage_input(&self, source: Bytes, quality: Quality) -> Result<NamedTempFile, EncodeError> {
        let codec = Arc::clone(&self.codec);
        let options = self.options;
        let temp_dir = self.temp_dir.clone();

        tokio::task::spawn_blocking(move || -> Result<NamedTempFile, EncodeError> {
            let staged: Cow<'_, [u8]> = if options.auto_orient {
                let image = codec.decode(&source, true)?;
                Cow::Owned(codec.encode(&image, OutputFormat::Png, quality, options.strip_metadata)?)
            } else {
                Cow::Borrowed(&source[..])
            };

            let mut file = match temp_dir {
                Some(dir) => NamedTempFile::new_in(dir),
                None => NamedTempFile::new(),
            }
            .map_err(EncodeError::TempFile)?;

            file.write_all(&staged)
                .and_then(|_| file.flush())
                .map_err(EncodeError::TempFile)?;
            Ok(file)
        })
        .await
        .map_err(|e| EncodeError::Aborted(e.to_string()))?
    }
}

#[async_trait]
impl WebpEncoder for CwebpEncoder {
    async fn encode(&self, source: Bytes, quality: Quality) -> Result<Vec<u8>, EncodeError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| EncodeError::Aborted(e.to_string()))?;

        // Removed when dropped, on every path out of this function.
        let input = self.stage_input(source, quality).await?;

        let metadata = if self.options.strip_metadata { "none" } else { "all" };
        let output = Command::new(&self.binary)
            .args(["-quiet", "-mt", "-q"])
            .arg(quality.to_string())
            .args(["-metadata", metadata])
            .arg(input.path())
            .args(["-o", "-"])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| EncodeError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        drop(input);

        if !output.status.success() || output.stdout.is_empty() {
            return Err(EncodeError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}
