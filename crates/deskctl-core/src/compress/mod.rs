//! Adaptive compression engine.
//!
//! Takes a captured bitmap and a byte budget and produces an encoding at or
//! under that budget, giving up as little fidelity as the search allows.
//!
//! # The search
//!
//! ```text
//!   quality = Qmax
//!   repeat up to max_iterations:
//!       encode at quality
//!       fits?            -> done
//!       quality == Qmin  -> stop searching
//!       high = quality - 1; quality = (Qmin + quality) / 2
//!   shrink width and height by shrink_factor, reset the window, start over
//! ```
//!
//! The first encoding that fits is accepted.  There is no upward refinement
//! towards the best quality that would still fit, so the engine finds "a
//! fitting quality" rather than "the highest fitting quality".
//!
//! With the defaults (20..=95, seven passes) the qualities tried are
//! 95, 57, 38, 29, 24, 22, 21.
//!
//! # Termination
//!
//! Each shrink replaces `n` with `floor(n * factor)`, and `factor < 1`, so
//! dimensions strictly decrease.  Reaching zero in either dimension is
//! reported as [`CompressionError::DegenerateImage`] instead of encoding.
//!
//! # Blocking
//!
//! Encoding is CPU bound.  Async callers should run [`AdaptiveCompressor`]
//! on a blocking thread.

pub mod encoder;

use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub use encoder::{JpegEncoder, QualityEncoder};

// ── Settings ─────────────────────────────────────────────────────────────────

/// Default byte budget for one capture (500 KiB).
pub const DEFAULT_TARGET_BYTES: u64 = 500 * 1024;
pub const DEFAULT_MIN_QUALITY: u8 = 20;
pub const DEFAULT_MAX_QUALITY: u8 = 95;
pub const DEFAULT_MAX_ITERATIONS: u32 = 7;
pub const DEFAULT_SHRINK_FACTOR: f64 = 0.9;

/// Tuning knobs for one [`AdaptiveCompressor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionSettings {
    /// Hard ceiling on the encoded size, in bytes.
    pub target_bytes: u64,
    /// Lowest quality the search may try.
    pub min_quality: u8,
    /// Quality of the first pass.
    pub max_quality: u8,
    /// Encode passes per image size before shrinking.
    pub max_iterations: u32,
    /// Multiplier applied to both dimensions on each shrink, in `(0, 1)`.
    pub shrink_factor: f64,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            target_bytes: DEFAULT_TARGET_BYTES,
            min_quality: DEFAULT_MIN_QUALITY,
            max_quality: DEFAULT_MAX_QUALITY,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            shrink_factor: DEFAULT_SHRINK_FACTOR,
        }
    }
}

impl CompressionSettings {
    /// Same defaults with a different byte budget.
    pub fn with_target_bytes(target_bytes: u64) -> Self {
        Self {
            target_bytes,
            ..Self::default()
        }
    }

    /// Checks that the settings describe a search that can run and end.
    ///
    /// # Errors
    ///
    /// Returns [`CompressionError::InvalidSettings`] naming the first bad
    /// field.
    pub fn validate(&self) -> Result<(), CompressionError> {
        let invalid = |msg: String| Err(CompressionError::InvalidSettings(msg));
        if self.target_bytes == 0 {
            return invalid("target_bytes must be greater than zero".to_string());
        }
        if self.min_quality == 0 || self.max_quality > 100 {
            return invalid(format!(
                "quality range {}..={} must lie within 1..=100",
                self.min_quality, self.max_quality
            ));
        }
        if self.min_quality > self.max_quality {
            return invalid(format!(
                "min_quality {} exceeds max_quality {}",
                self.min_quality, self.max_quality
            ));
        }
        if self.max_iterations == 0 {
            return invalid("max_iterations must be at least 1".to_string());
        }
        if !(self.shrink_factor > 0.0 && self.shrink_factor < 1.0) {
            return invalid(format!(
                "shrink_factor {} must lie strictly between 0 and 1",
                self.shrink_factor
            ));
        }
        Ok(())
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// Errors from the compression engine.
#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("invalid compression settings: {0}")]
    InvalidSettings(String),

    /// Shrinking reached a zero-area image before any encoding fit.
    #[error("cannot fit image within the byte budget: shrinking reached a degenerate {width}x{height} image")]
    DegenerateImage { width: u32, height: u32 },

    #[error("image encoding failed: {0}")]
    Encode(String),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

// ── Outcome ──────────────────────────────────────────────────────────────────

/// Summary of a successful compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionOutcome {
    /// Size of the accepted encoding in bytes.
    pub size_bytes: u64,
    /// Quality of the accepted pass.
    pub quality: u8,
    /// Width of the image that was actually encoded.
    pub encoded_width: u32,
    /// Height of the image that was actually encoded.
    pub encoded_height: u32,
    /// Encode passes across all sizes.
    pub passes: u32,
    /// Number of shrink steps taken.
    pub shrinks: u32,
}

/// An accepted encoding held in memory.
#[derive(Debug, Clone)]
pub struct Compressed {
    pub bytes: Vec<u8>,
    pub outcome: CompressionOutcome,
}

// ── Quality search window ────────────────────────────────────────────────────

/// Bisection window for one image size; rebuilt after every shrink.
#[derive(Debug, Clone, Copy)]
struct QualityWindow {
    quality: u8,
    low: u8,
    high: u8,
}

impl QualityWindow {
    fn new(low: u8, high: u8) -> Self {
        Self {
            quality: high,
            low,
            high,
        }
    }

    /// Moves to the next lower quality after a pass that did not fit.
    /// Returns `false` once the floor has already been tried.
    fn narrow(&mut self) -> bool {
        if self.quality <= self.low {
            return false;
        }
        self.high = self.quality - 1;
        self.quality = ((u16::from(self.low) + u16::from(self.quality)) / 2) as u8;
        debug_assert!(self.low <= self.quality && self.quality <= self.high);
        true
    }
}

fn shrunk_dimensions(width: u32, height: u32, factor: f64) -> (u32, u32) {
    let scale = |n: u32| (f64::from(n) * factor).floor() as u32;
    (scale(width), scale(height))
}

// ── Engine ───────────────────────────────────────────────────────────────────

/// Quality-bisection encoder with a downscaling fallback.
#[derive(Debug, Clone)]
pub struct AdaptiveCompressor<E> {
    encoder: E,
    settings: CompressionSettings,
}

impl AdaptiveCompressor<JpegEncoder> {
    /// JPEG compressor with the given settings.
    ///
    /// # Errors
    ///
    /// Returns [`CompressionError::InvalidSettings`] if `settings` fail
    /// validation.
    pub fn jpeg(settings: CompressionSettings) -> Result<Self, CompressionError> {
        Self::new(JpegEncoder, settings)
    }
}

impl<E: QualityEncoder> AdaptiveCompressor<E> {
    /// Builds a compressor around `encoder`.
    ///
    /// # Errors
    ///
    /// Returns [`CompressionError::InvalidSettings`] if `settings` fail
    /// validation.
    pub fn new(encoder: E, settings: CompressionSettings) -> Result<Self, CompressionError> {
        settings.validate()?;
        Ok(Self { encoder, settings })
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Finds an encoding of `image` that fits the byte budget.
    ///
    /// # Errors
    ///
    /// - [`CompressionError::DegenerateImage`] if the image has zero area,
    ///   either as given or after shrinking.
    /// - Any error returned by the encoder; the search stops at the first.
    pub fn compress(&self, image: &RgbImage) -> Result<Compressed, CompressionError> {
        let s = &self.settings;
        let mut working: Cow<'_, RgbImage> = Cow::Borrowed(image);
        let mut passes = 0u32;
        let mut shrinks = 0u32;

        loop {
            let (width, height) = working.dimensions();
            if width == 0 || height == 0 {
                return Err(CompressionError::DegenerateImage { width, height });
            }

            let mut window = QualityWindow::new(s.min_quality, s.max_quality);
            for _ in 0..s.max_iterations {
                let bytes = self.encoder.encode(&working, window.quality)?;
                passes += 1;
                let size = bytes.len() as u64;
                debug!(
                    width,
                    height,
                    quality = window.quality,
                    size,
                    target = s.target_bytes,
                    "encode pass"
                );

                if size <= s.target_bytes {
                    return Ok(Compressed {
                        bytes,
                        outcome: CompressionOutcome {
                            size_bytes: size,
                            quality: window.quality,
                            encoded_width: width,
                            encoded_height: height,
                            passes,
                            shrinks,
                        },
                    });
                }
                if !window.narrow() {
                    break;
                }
            }

            let (next_w, next_h) = shrunk_dimensions(width, height, s.shrink_factor);
            warn!(
                from = %format!("{width}x{height}"),
                to = %format!("{next_w}x{next_h}"),
                target = s.target_bytes,
                "budget not reached within quality range; shrinking"
            );
            if next_w == 0 || next_h == 0 {
                return Err(CompressionError::DegenerateImage {
                    width: next_w,
                    height: next_h,
                });
            }
            working = Cow::Owned(imageops::resize(
                &*working,
                next_w,
                next_h,
                FilterType::Nearest,
            ));
            shrinks += 1;
        }
    }

    /// Compresses `image` and writes the result to `dest`.
    ///
    /// The bytes go to a temporary sibling first and are renamed into place,
    /// so `dest` is either left untouched or holds a complete encoding.
    ///
    /// # Errors
    ///
    /// Everything [`compress`](Self::compress) returns, plus
    /// [`CompressionError::Write`] if the file cannot be written.
    pub fn compress_to_file(
        &self,
        image: &RgbImage,
        dest: &Path,
    ) -> Result<CompressionOutcome, CompressionError> {
        let Compressed { bytes, outcome } = self.compress(image)?;
        write_atomically(dest, &bytes)?;
        Ok(outcome)
    }
}

fn write_atomically(dest: &Path, bytes: &[u8]) -> Result<(), CompressionError> {
    let write_err = |source: io::Error| CompressionError::Write {
        path: dest.to_path_buf(),
        source,
    };

    let file_name = dest.file_name().ok_or_else(|| {
        write_err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "destination has no file name",
        ))
    })?;
    let tmp = dest.with_file_name(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        Uuid::new_v4().simple()
    ));

    if let Err(e) = fs::write(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(write_err(e));
    }
    if let Err(e) = fs::rename(&tmp, dest) {
        let _ = fs::remove_file(&tmp);
        return Err(write_err(e));
    }
    Ok(())
}
