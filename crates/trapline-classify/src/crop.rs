//! Square crop extraction for classifier input
//!
//! The classifier expects square crops. The shorter side of the detection
//! box is widened by half the difference on each end, then the result is
//! clipped to the image bounds, so off-center subjects near an edge may end
//! up slightly non-square after clipping.

use image::DynamicImage;

/// Pixel rectangle of the square crop for a normalized bbox
/// `[x_min, y_min, width, height]` in an image of `width` x `height` pixels.
/// Returns `(x, y, w, h)` after clipping.
pub fn square_crop_rect(normalized: [f64; 4], width: u32, height: u32) -> (u32, u32, u32, u32) {
    let w = f64::from(width);
    let h = f64::from(height);

    let mut x_min = (normalized[0] * w).round() as i64;
    let mut y_min = (normalized[1] * h).round() as i64;
    let mut x_max = (normalized[2] * w).round() as i64 + x_min;
    let mut y_max = (normalized[3] * h).round() as i64 + y_min;

    let x_size = x_max - x_min;
    let y_size = y_max - y_min;
    if x_size > y_size {
        let pad = (x_size - y_size) / 2;
        y_min -= pad;
        y_max += pad;
    } else if y_size > x_size {
        let pad = (y_size - x_size) / 2;
        x_min -= pad;
        x_max += pad;
    }

    let x0 = x_min.max(0) as u32;
    let y0 = y_min.max(0) as u32;
    let x1 = (x_max.min(i64::from(width)) as u32).max(x0 + 1);
    let y1 = (y_max.min(i64::from(height)) as u32).max(y0 + 1);
    (x0, y0, (x1 - x0).min(width - x0), (y1 - y0).min(height - y0))
}

/// Extract the square crop as an owned image
pub fn square_crop(image: &DynamicImage, normalized: [f64; 4]) -> DynamicImage {
    let (x, y, w, h) = square_crop_rect(normalized, image.width(), image.height());
    image.crop_imm(x, y, w, h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_box_is_padded_vertically() {
        // A 400x100 box in a 1000x1000 image becomes 400x400, centered on
        // the original box.
        let (x, y, w, h) = square_crop_rect([0.3, 0.45, 0.4, 0.1], 1000, 1000);
        assert_eq!((x, y, w, h), (300, 300, 400, 400));
    }

    #[test]
    fn test_tall_box_is_padded_horizontally() {
        let (x, y, w, h) = square_crop_rect([0.45, 0.3, 0.1, 0.4], 1000, 1000);
        assert_eq!((x, y, w, h), (300, 300, 400, 400));
    }

    #[test]
    fn test_square_box_is_unchanged() {
        let (x, y, w, h) = square_crop_rect([0.1, 0.1, 0.2, 0.2], 1000, 1000);
        assert_eq!((x, y, w, h), (100, 100, 200, 200));
    }

    #[test]
    fn test_crop_is_clipped_at_image_edge() {
        // Subject in the top-left corner: padding would go negative and is
        // clipped away.
        let (x, y, w, h) = square_crop_rect([0.0, 0.0, 0.4, 0.1], 1000, 1000);
        assert_eq!((x, y), (0, 0));
        assert!(w <= 400 && h <= 250);
    }

    #[test]
    fn test_degenerate_box_yields_nonempty_crop() {
        let (_, _, w, h) = square_crop_rect([0.5, 0.5, 0.0, 0.0], 1000, 1000);
        assert!(w >= 1 && h >= 1);
    }

    #[test]
    fn test_crop_image_dimensions() {
        let image = DynamicImage::new_rgb8(1000, 800);
        let crop = square_crop(&image, [0.25, 0.25, 0.2, 0.1]);
        assert_eq!(crop.width(), crop.height());
    }
}
