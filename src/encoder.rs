//! JPEG output for thumbnails and regions.

use std::path::Path;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::error::OutputError;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// Whether quality is within 1-100.
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Encode an RGB image as JPEG.
///
/// Quality is clamped to 1-100.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Bytes, OutputError> {
    let quality = quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY);

    let mut output = Vec::new();
    JpegEncoder::new_with_quality(&mut output, quality)
        .encode_image(image)
        .map_err(|e| OutputError::Encode(e.to_string()))?;

    Ok(Bytes::from(output))
}

/// Encode an RGB image as JPEG and write it to `path`.
pub async fn save_jpeg(image: &RgbImage, path: &Path, quality: u8) -> Result<(), OutputError> {
    let encoded = encode_jpeg(image, quality)?;
    tokio::fs::write(path, &encoded)
        .await
        .map_err(|e| OutputError::Write {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}
