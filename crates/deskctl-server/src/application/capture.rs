//! Capture pipeline: grab a frame, compress it under budget, save it.
//!
//! ```text
//! DesktopCapability::capture_frame ──► AdaptiveCompressor ──► <dest>.jpg
//!                                                    │
//!                                   CaptureReport ◄──┘ (original width/height)
//! ```
//!
//! The whole pipeline runs on Tokio's blocking pool.  Encode passes are CPU
//! bound and a full search on a large frame takes long enough to stall every
//! other session sharing an executor thread.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use deskctl_core::{
    AdaptiveCompressor, CapabilityError, CompressionError, CompressionOutcome, DesktopCapability,
    JpegEncoder, QualityEncoder,
};
use thiserror::Error;
use tracing::info;

use crate::domain::config::CaptureConfig;

/// Errors from the capture pipeline.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error("failed to create capture directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The blocking task panicked or was cancelled.
    #[error("capture task failed: {0}")]
    Task(String),
}

/// What a successful capture reports back to the peer.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureReport {
    /// Local time of the capture, `YYYYmmdd_HHMMSS`.
    pub timestamp: String,
    pub path: PathBuf,
    /// Width of the captured frame, before any shrinking.
    pub width: u32,
    /// Height of the captured frame, before any shrinking.
    pub height: u32,
    pub outcome: CompressionOutcome,
}

/// Runs captures for one server; cheap to clone.
#[derive(Clone)]
pub struct CaptureService {
    desktop: Arc<dyn DesktopCapability>,
    compressor: Arc<AdaptiveCompressor<JpegEncoder>>,
    save_dir: PathBuf,
}

impl CaptureService {
    /// # Errors
    ///
    /// Returns [`CompressionError::InvalidSettings`] if the configured
    /// compression settings are unusable.
    pub fn new(
        desktop: Arc<dyn DesktopCapability>,
        config: &CaptureConfig,
    ) -> Result<Self, CompressionError> {
        Ok(Self {
            desktop,
            compressor: Arc::new(AdaptiveCompressor::jpeg(config.compression)?),
            save_dir: config.save_dir.clone(),
        })
    }

    /// Captures the screen to `save_path`, or to a timestamped file in the
    /// save directory when `None`.
    ///
    /// # Errors
    ///
    /// Any [`CaptureError`]; no file is left at the destination on failure.
    pub async fn capture(&self, save_path: Option<&str>) -> Result<CaptureReport, CaptureError> {
        let service = self.clone();
        let save_path = save_path.map(str::to_owned);
        tokio::task::spawn_blocking(move || service.capture_blocking(save_path.as_deref()))
            .await
            .map_err(|e| CaptureError::Task(e.to_string()))?
    }

    fn capture_blocking(&self, save_path: Option<&str>) -> Result<CaptureReport, CaptureError> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let dest = destination(
            &self.save_dir,
            save_path,
            &timestamp,
            self.compressor.encoder(),
        );

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CaptureError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let frame = self.desktop.capture_frame()?;
        let (width, height) = frame.dimensions();
        let outcome = self.compressor.compress_to_file(&frame, &dest)?;
        drop(frame);

        info!(
            path = %dest.display(),
            width,
            height,
            bytes = outcome.size_bytes,
            quality = outcome.quality,
            shrinks = outcome.shrinks,
            "capture saved"
        );
        Ok(CaptureReport {
            timestamp,
            path: dest,
            width,
            height,
            outcome,
        })
    }
}

/// Resolves where a capture is written.
///
/// A caller path whose extension is not one of the encoder's gets the
/// canonical extension appended (`shot.png` becomes `shot.png.jpg`).
pub fn destination(
    save_dir: &Path,
    save_path: Option<&str>,
    timestamp: &str,
    encoder: &impl QualityEncoder,
) -> PathBuf {
    let ext = encoder.extension();
    match save_path.filter(|p| !p.is_empty()) {
        None => save_dir.join(format!("screen_capture_{timestamp}.{ext}")),
        Some(path) => {
            let has_ext = Path::new(path)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| {
                    encoder
                        .extensions()
                        .iter()
                        .any(|known| e.eq_ignore_ascii_case(known))
                });
            if has_ext {
                PathBuf::from(path)
            } else {
                PathBuf::from(format!("{path}.{ext}"))
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
