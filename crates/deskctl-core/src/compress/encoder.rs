//! Quality-parameterised image encoders.
//!
//! The compression engine only needs one thing from a container format: turn
//! a bitmap into bytes at a given quality.  [`QualityEncoder`] is that seam.
//! Production uses [`JpegEncoder`]; tests plug in encoders that count passes
//! or fake their output size.

use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
use image::RgbImage;

use super::CompressionError;

/// Encodes an RGB bitmap at a quality between 1 and 100.
///
/// Implementations should produce output whose size does not grow as
/// `quality` falls, for a fixed image; the engine's search relies on it.
pub trait QualityEncoder {
    /// Encodes `image` at `quality`.
    ///
    /// # Errors
    ///
    /// Returns [`CompressionError::Encode`] if the codec rejects the image.
    fn encode(&self, image: &RgbImage, quality: u8) -> Result<Vec<u8>, CompressionError>;

    /// File extensions for this container, canonical one first, lowercase,
    /// without the leading dot.
    fn extensions(&self) -> &'static [&'static str];

    /// Returns the canonical file extension.
    fn extension(&self) -> &'static str {
        self.extensions().first().copied().unwrap_or("bin")
    }
}

/// Baseline JPEG via the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegEncoder;

impl QualityEncoder for JpegEncoder {
    fn encode(&self, image: &RgbImage, quality: u8) -> Result<Vec<u8>, CompressionError> {
        let mut buf = Vec::new();
        ImageJpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
            .encode_image(image)
            .map_err(|e| CompressionError::Encode(e.to_string()))?;
        Ok(buf)
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["jpg", "jpeg"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn test_jpeg_output_starts_with_soi_marker() {
        let bytes = JpegEncoder.encode(&gradient(16, 16), 80).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8], "JPEG must start with SOI");
    }

    #[test]
    fn test_jpeg_output_decodes_to_same_dimensions() {
        // Arrange
        let img = gradient(37, 21);

        // Act
        let bytes = JpegEncoder.encode(&img, 60).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();

        // Assert
        assert_eq!(decoded.width(), 37);
        assert_eq!(decoded.height(), 21);
    }

    #[test]
    fn test_lower_quality_is_smaller_on_a_detailed_image() {
        let img = gradient(64, 64);
        let high = JpegEncoder.encode(&img, 95).unwrap();
        let low = JpegEncoder.encode(&img, 20).unwrap();
        assert!(low.len() < high.len(), "q20 {} vs q95 {}", low.len(), high.len());
    }

    #[test]
    fn test_jpeg_extension_is_jpg() {
        assert_eq!(JpegEncoder.extension(), "jpg");
        assert!(JpegEncoder.extensions().contains(&"jpeg"));
    }
}
