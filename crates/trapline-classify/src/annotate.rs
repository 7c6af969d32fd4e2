//! Annotated-image rendering
//!
//! Draws a corner-bracket box per detection and a two-line label
//! (`{Category} {P%}` / `{Species Title} {P%}`), matching the dashboard's
//! download rendering so notification attachments and in-app downloads look
//! identical. All measurements scale with `s = image_width / 1000`:
//! bracket length 12s, corner radius 4s, stroke width 4s, label font 9s,
//! label background rounded 3s at 50% black. Stroke color is fixed red
//! (#EF4444). Labels are clamped to stay on-canvas.
//!
//! Privacy blur, when the project asks for it, must run before annotation so
//! brackets stay crisp.

use crate::species::display_name;
use crate::Result;
use fontdue::{Font, FontSettings};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, warn};
use trapline_core::model::{BoundingBox, DetectionCategory};

/// Stroke color for boxes (#EF4444)
const BOX_COLOR: [u8; 3] = [0xEF, 0x44, 0x44];
/// Label background: black at 50% opacity
const LABEL_BACKGROUND_ALPHA: u8 = 128;
/// JPEG quality of the rendered output
const OUTPUT_QUALITY: u8 = 90;

/// Font locations probed at startup, in order
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
];

/// One box-plus-label to draw
#[derive(Debug, Clone)]
pub struct Annotation {
    pub category: DetectionCategory,
    pub bbox: BoundingBox,
    pub species: String,
    /// Classification confidence, shown on both label lines
    pub confidence: f64,
}

/// Detection region to blur before annotation
#[derive(Debug, Clone)]
pub struct BlurRegion {
    pub bbox: BoundingBox,
}

/// Renderer with a rasterizer font loaded once per process
pub struct Annotator {
    font: Option<Font>,
}

impl Annotator {
    /// Probe the system font locations. Without a font the renderer still
    /// draws brackets; labels are skipped with a warning.
    pub fn from_system_fonts() -> Self {
        for candidate in FONT_CANDIDATES {
            if let Ok(bytes) = std::fs::read(candidate) {
                if let Ok(font) = Font::from_bytes(bytes, FontSettings::default()) {
                    debug!(font = candidate, "annotation font loaded");
                    return Self { font: Some(font) };
                }
            }
        }
        warn!("no annotation font found, labels will be omitted");
        Self { font: None }
    }

    /// Load a specific font file
    ///
    /// # Errors
    /// Returns an io error if the file cannot be read; a corrupt font falls
    /// back to label-less rendering.
    pub fn from_font_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        match Font::from_bytes(bytes, FontSettings::default()) {
            Ok(font) => Ok(Self { font: Some(font) }),
            Err(e) => {
                warn!(font = %path.display(), error = e, "unusable font, labels will be omitted");
                Ok(Self { font: None })
            }
        }
    }

    /// Render the annotated JPEG.
    ///
    /// # Errors
    /// Returns an error only if JPEG encoding fails.
    pub fn render(
        &self,
        source: &DynamicImage,
        blur_regions: &[BlurRegion],
        annotations: &[Annotation],
    ) -> Result<Vec<u8>> {
        let mut canvas = source.to_rgba8();

        for region in blur_regions {
            blur_region(&mut canvas, &region.bbox);
        }

        let scale = f64::from(canvas.width()) / 1000.0;
        for annotation in annotations {
            self.draw_annotation(&mut canvas, annotation, scale);
        }

        let mut buffer = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut buffer, OUTPUT_QUALITY);
        DynamicImage::ImageRgba8(canvas)
            .to_rgb8()
            .write_with_encoder(encoder)?;
        Ok(buffer.into_inner())
    }

    fn draw_annotation(&self, canvas: &mut RgbaImage, annotation: &Annotation, scale: f64) {
        let pad = px(8.0 * scale);
        let line_width = px(4.0 * scale).max(1);
        let bracket = px(12.0 * scale).max(2);
        let radius = px(4.0 * scale);

        let x = annotation.bbox.x - pad;
        let y = annotation.bbox.y - pad;
        let w = annotation.bbox.width + 2 * pad;
        let h = annotation.bbox.height + 2 * pad;

        draw_corner_brackets(canvas, x, y, w, h, bracket, radius, line_width);

        if let Some(font) = &self.font {
            let percent = (annotation.confidence * 100.0) as i32;
            let lines = [
                format!("{} {percent}%", annotation.category.as_str()),
                format!("{} {percent}%", display_name(&annotation.species)),
            ];
            draw_label(canvas, font, &lines, x, y, h, scale);
        }
    }
}

fn px(value: f64) -> i32 {
    value.round() as i32
}

/// Alpha-blend a stroke pixel
fn put_stroke(canvas: &mut RgbaImage, x: i32, y: i32) {
    if x < 0 || y < 0 || x >= canvas.width() as i32 || y >= canvas.height() as i32 {
        return;
    }
    canvas.put_pixel(x as u32, y as u32, Rgba([BOX_COLOR[0], BOX_COLOR[1], BOX_COLOR[2], 255]));
}

fn fill_rect(canvas: &mut RgbaImage, x: i32, y: i32, w: i32, h: i32) {
    for yy in y..y + h {
        for xx in x..x + w {
            put_stroke(canvas, xx, yy);
        }
    }
}

/// Quarter-circle stroke band. `quadrant` selects which 90 degrees to draw:
/// 0 = top-left, 1 = top-right, 2 = bottom-right, 3 = bottom-left.
fn draw_corner_arc(canvas: &mut RgbaImage, cx: i32, cy: i32, radius: i32, width: i32, quadrant: u8) {
    if radius <= 0 {
        return;
    }
    let r = f64::from(radius);
    let half_width = f64::from(width) / 2.0;
    for yy in cy - radius - width..=cy + radius + width {
        for xx in cx - radius - width..=cx + radius + width {
            let dx = f64::from(xx - cx);
            let dy = f64::from(yy - cy);
            let in_quadrant = match quadrant {
                0 => dx <= 0.0 && dy <= 0.0,
                1 => dx >= 0.0 && dy <= 0.0,
                2 => dx >= 0.0 && dy >= 0.0,
                _ => dx <= 0.0 && dy >= 0.0,
            };
            if in_quadrant && ((dx * dx + dy * dy).sqrt() - r).abs() <= half_width {
                put_stroke(canvas, xx, yy);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_corner_brackets(
    canvas: &mut RgbaImage,
    x: i32,
    y: i32,
    w: i32,
    h: i32,
    bracket: i32,
    radius: i32,
    line_width: i32,
) {
    let arm = (bracket - radius).max(1);

    // Top-left: vertical arm, corner arc, horizontal arm.
    fill_rect(canvas, x, y + radius, line_width, arm);
    draw_corner_arc(canvas, x + radius, y + radius, radius, line_width, 0);
    fill_rect(canvas, x + radius, y, arm, line_width);

    // Top-right.
    fill_rect(canvas, x + w - radius - arm, y, arm, line_width);
    draw_corner_arc(canvas, x + w - radius, y + radius, radius, line_width, 1);
    fill_rect(canvas, x + w - line_width, y + radius, line_width, arm);

    // Bottom-right.
    fill_rect(canvas, x + w - line_width, y + h - radius - arm, line_width, arm);
    draw_corner_arc(canvas, x + w - radius, y + h - radius, radius, line_width, 2);
    fill_rect(canvas, x + w - radius - arm, y + h - line_width, arm, line_width);

    // Bottom-left.
    fill_rect(canvas, x + radius, y + h - line_width, arm, line_width);
    draw_corner_arc(canvas, x + radius, y + h - radius, radius, line_width, 3);
    fill_rect(canvas, x, y + h - radius - arm, line_width, arm);
}

fn draw_label(
    canvas: &mut RgbaImage,
    font: &Font,
    lines: &[String],
    box_x: i32,
    box_y: i32,
    box_h: i32,
    scale: f64,
) {
    let font_size = (9.0 * scale).max(8.0) as f32;
    let line_height = px(12.0 * scale).max(10);
    let pad_x = px(4.0 * scale).max(2);
    let pad_y = px(3.0 * scale).max(1);
    let margin = px(4.0 * scale).max(2);
    let corner = px(3.0 * scale).max(1);

    let max_line_width = lines
        .iter()
        .map(|line| measure_text(font, line, font_size))
        .max()
        .unwrap_or(0);
    let label_w = max_line_width + 2 * pad_x;
    let label_h = lines.len() as i32 * line_height + 2 * pad_y;

    // Above the box if it fits, below otherwise; clamped on-canvas.
    let canvas_w = canvas.width() as i32;
    let canvas_h = canvas.height() as i32;
    let mut label_y = box_y - label_h - margin;
    if label_y < margin {
        label_y = (box_y + box_h + margin).min(canvas_h - label_h - margin).max(margin);
    }
    let label_x = box_x.min(canvas_w - label_w - margin).max(margin);

    fill_rounded_rect(canvas, label_x, label_y, label_w, label_h, corner);

    for (index, line) in lines.iter().enumerate() {
        let baseline_y = label_y + pad_y + index as i32 * line_height;
        draw_text(canvas, font, line, font_size, label_x + pad_x, baseline_y, line_height);
    }
}

fn measure_text(font: &Font, text: &str, size: f32) -> i32 {
    text.chars()
        .map(|c| font.metrics(c, size).advance_width)
        .sum::<f32>()
        .ceil() as i32
}

fn fill_rounded_rect(canvas: &mut RgbaImage, x: i32, y: i32, w: i32, h: i32, radius: i32) {
    let r = f64::from(radius);
    for yy in y..y + h {
        for xx in x..x + w {
            if xx < 0 || yy < 0 || xx >= canvas.width() as i32 || yy >= canvas.height() as i32 {
                continue;
            }
            // Distance check only matters inside the corner squares.
            let dx = (f64::from(x + radius - xx).max(f64::from(xx - (x + w - 1 - radius)))).max(0.0);
            let dy = (f64::from(y + radius - yy).max(f64::from(yy - (y + h - 1 - radius)))).max(0.0);
            if dx * dx + dy * dy > r * r {
                continue;
            }
            let existing = canvas.get_pixel(xx as u32, yy as u32).0;
            let alpha = f64::from(LABEL_BACKGROUND_ALPHA) / 255.0;
            let blended = [
                (f64::from(existing[0]) * (1.0 - alpha)) as u8,
                (f64::from(existing[1]) * (1.0 - alpha)) as u8,
                (f64::from(existing[2]) * (1.0 - alpha)) as u8,
                255,
            ];
            canvas.put_pixel(xx as u32, yy as u32, Rgba(blended));
        }
    }
}

fn draw_text(
    canvas: &mut RgbaImage,
    font: &Font,
    text: &str,
    size: f32,
    x: i32,
    y: i32,
    line_height: i32,
) {
    let mut cursor_x = x as f32;
    for character in text.chars() {
        let (metrics, bitmap) = font.rasterize(character, size);
        // Baseline sits near the bottom of the line box.
        let glyph_y = y + line_height - px(f64::from(size) * 0.25) - metrics.height as i32
            + metrics.ymin.min(0);
        for (row, chunk) in bitmap.chunks(metrics.width.max(1)).enumerate() {
            for (col, coverage) in chunk.iter().enumerate() {
                if *coverage == 0 {
                    continue;
                }
                let px_x = cursor_x as i32 + metrics.xmin + col as i32;
                let px_y = glyph_y + row as i32;
                if px_x < 0
                    || px_y < 0
                    || px_x >= canvas.width() as i32
                    || px_y >= canvas.height() as i32
                {
                    continue;
                }
                let alpha = f64::from(*coverage) / 255.0;
                let existing = canvas.get_pixel(px_x as u32, px_y as u32).0;
                let blended = [
                    (255.0 * alpha + f64::from(existing[0]) * (1.0 - alpha)) as u8,
                    (255.0 * alpha + f64::from(existing[1]) * (1.0 - alpha)) as u8,
                    (255.0 * alpha + f64::from(existing[2]) * (1.0 - alpha)) as u8,
                    255,
                ];
                canvas.put_pixel(px_x as u32, px_y as u32, Rgba(blended));
            }
        }
        cursor_x += metrics.advance_width;
    }
}

/// Gaussian-blur one detection region in place. The blur radius scales with
/// image size, clamped to 15..=25 px as the privacy requirement specifies.
pub fn blur_region(canvas: &mut RgbaImage, bbox: &BoundingBox) {
    let canvas_w = canvas.width() as i32;
    let canvas_h = canvas.height() as i32;
    let x0 = bbox.x.clamp(0, canvas_w);
    let y0 = bbox.y.clamp(0, canvas_h);
    let x1 = (bbox.x + bbox.width).clamp(0, canvas_w);
    let y1 = (bbox.y + bbox.height).clamp(0, canvas_h);
    if x1 <= x0 || y1 <= y0 {
        return;
    }

    let radius = (f64::from(canvas.width()) / 100.0).clamp(15.0, 25.0) as f32;
    let region = image::imageops::crop(canvas, x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
        .to_image();
    let blurred = image::imageops::blur(&region, radius / 2.0);
    image::imageops::replace(canvas, &blurred, i64::from(x0), i64::from(y0));
}

/// Blur radius used for a given image width (exposed for tests)
pub fn blur_radius_for_width(width: u32) -> f64 {
    (f64::from(width) / 100.0).clamp(15.0, 25.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: i32, y: i32, w: i32, h: i32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
            normalized: [0.0, 0.0, 0.0, 0.0],
        }
    }

    #[test]
    fn test_render_draws_red_strokes() {
        let source = DynamicImage::new_rgb8(400, 300);
        let annotator = Annotator { font: None };
        let bytes = annotator
            .render(
                &source,
                &[],
                &[Annotation {
                    category: DetectionCategory::Animal,
                    bbox: bbox(100, 100, 120, 80),
                    species: "fox".to_string(),
                    confidence: 0.87,
                }],
            )
            .expect("render");

        let rendered = image::load_from_memory(&bytes).expect("decode").to_rgb8();
        let red_pixels = rendered
            .pixels()
            .filter(|p| p[0] > 150 && p[1] < 120 && p[2] < 120)
            .count();
        assert!(red_pixels > 0, "expected red bracket pixels");
    }

    #[test]
    fn test_render_output_is_jpeg() {
        let source = DynamicImage::new_rgb8(100, 100);
        let annotator = Annotator { font: None };
        let bytes = annotator.render(&source, &[], &[]).expect("render");
        assert_eq!(&bytes[..3], &[0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn test_blur_changes_region_pixels() {
        // A checkerboard region blurs toward gray.
        let mut canvas = RgbaImage::from_fn(200, 200, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        });
        let before = *canvas.get_pixel(50, 50);
        blur_region(&mut canvas, &bbox(40, 40, 40, 40));
        let after = *canvas.get_pixel(50, 50);
        assert_ne!(before, after);

        // Pixels outside the region are untouched.
        let outside = *canvas.get_pixel(150, 150);
        assert!(outside == Rgba([255, 255, 255, 255]) || outside == Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_blur_radius_is_clamped() {
        assert_eq!(blur_radius_for_width(500), 15.0);
        assert_eq!(blur_radius_for_width(2000), 20.0);
        assert_eq!(blur_radius_for_width(10_000), 25.0);
    }

    #[test]
    fn test_blur_of_degenerate_region_is_a_noop() {
        let mut canvas = RgbaImage::new(10, 10);
        blur_region(&mut canvas, &bbox(20, 20, 5, 5));
    }

    #[test]
    fn test_annotations_near_edges_do_not_panic() {
        let source = DynamicImage::new_rgb8(200, 150);
        let annotator = Annotator { font: None };
        annotator
            .render(
                &source,
                &[],
                &[Annotation {
                    category: DetectionCategory::Person,
                    bbox: bbox(-10, -10, 60, 40),
                    species: "human".to_string(),
                    confidence: 0.99,
                }],
            )
            .expect("render");
    }
}
