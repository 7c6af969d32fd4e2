//! Thumbnail generation: 300 px wide, aspect preserved, JPEG quality 85

use crate::error::Result;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::GenericImageView;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Target thumbnail width in pixels
pub const THUMBNAIL_WIDTH: u32 = 300;
/// JPEG quality for thumbnails
pub const THUMBNAIL_QUALITY: u8 = 85;

/// Load an image file and produce its thumbnail as JPEG bytes.
///
/// # Errors
/// Returns an error if the file cannot be decoded or re-encoded.
pub fn generate_thumbnail(path: &Path) -> Result<Vec<u8>> {
    let img = image::open(path)?;
    let (width, height) = img.dimensions();

    let thumb_height =
        ((f64::from(THUMBNAIL_WIDTH) * f64::from(height) / f64::from(width)).round() as u32).max(1);
    let thumbnail = img.resize_exact(THUMBNAIL_WIDTH, thumb_height, FilterType::Lanczos3);

    let mut buffer = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buffer, THUMBNAIL_QUALITY);
    thumbnail.write_with_encoder(encoder)?;

    debug!(
        source = %path.display(),
        width = THUMBNAIL_WIDTH,
        height = thumb_height,
        "thumbnail generated"
    );
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn write_test_jpeg(width: u32, height: u32) -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(width, height, |x, _| Rgb([(x % 256) as u8, 128, 64]));
        img.save(file.path()).unwrap();
        file
    }

    #[test]
    fn test_thumbnail_is_300_wide_preserving_aspect() {
        let file = write_test_jpeg(1200, 900);
        let bytes = generate_thumbnail(file.path()).expect("thumbnail");

        let thumb = image::load_from_memory(&bytes).expect("decode");
        assert_eq!(thumb.width(), 300);
        assert_eq!(thumb.height(), 225);
    }

    #[test]
    fn test_thumbnail_output_is_jpeg() {
        let file = write_test_jpeg(640, 480);
        let bytes = generate_thumbnail(file.path()).expect("thumbnail");
        assert_eq!(&bytes[..3], &[0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn test_extreme_aspect_ratio_keeps_nonzero_height() {
        let file = write_test_jpeg(3000, 2);
        let bytes = generate_thumbnail(file.path()).expect("thumbnail");
        let thumb = image::load_from_memory(&bytes).expect("decode");
        assert!(thumb.height() >= 1);
    }
}
