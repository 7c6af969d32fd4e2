//! Detector model: download-and-cache plus ONNX inference
//!
//! The model file is fetched once into persistent local storage and loaded at
//! worker startup. The network is a YOLO-family detector exported to ONNX
//! with three classes {animal, person, vehicle}; rows decode as
//! `[cx, cy, w, h, objectness, c_animal, c_person, c_vehicle]` over a
//! letterboxed square input.

use crate::{DetectError, Result};
use futures::StreamExt;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::path::Path;
use tract_onnx::prelude::*;
use tracing::{debug, info};
use trapline_core::model::DetectionCategory;

/// Square input edge expected by the detector
pub const INPUT_SIZE: u32 = 640;
/// Candidates below this confidence are discarded before NMS
pub const CONFIDENCE_FLOOR: f64 = 0.1;
/// Overlap threshold for non-maximum suppression
const NMS_IOU: f64 = 0.45;

/// Class index order in the exported model
const CATEGORIES: [DetectionCategory; 3] = [
    DetectionCategory::Animal,
    DetectionCategory::Person,
    DetectionCategory::Vehicle,
];

/// One detector proposal in image-normalized coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub category: DetectionCategory,
    /// `[x_min, y_min, width, height]`, each in `[0, 1]`
    pub normalized: [f64; 4],
    pub confidence: f64,
}

/// Inference seam so the worker loop is testable without a model file
pub trait Detector: Send + Sync {
    /// Run the detector over a decoded image.
    ///
    /// # Errors
    /// Returns an error if inference fails.
    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>>;
}

type RunnableOnnx = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// tract-backed detector
pub struct OnnxDetector {
    model: RunnableOnnx,
}

impl OnnxDetector {
    /// Load the ONNX model from disk.
    ///
    /// # Errors
    /// Returns `DetectError::Inference` if the graph cannot be loaded or
    /// optimized.
    pub fn load(path: &Path) -> Result<Self> {
        info!(model_path = %path.display(), "loading detection model");
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|m| {
                m.with_input_fact(
                    0,
                    f32::fact([1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize]).into(),
                )
            })
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| DetectError::Inference(e.to_string()))?;
        info!("detection model loaded");
        Ok(Self { model })
    }
}

impl Detector for OnnxDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>> {
        let (tensor, letterbox) = preprocess(image);
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .map_err(|e| DetectError::Inference(e.to_string()))?;
        let output = outputs[0]
            .to_array_view::<f32>()
            .map_err(|e| DetectError::Inference(e.to_string()))?;

        let mut candidates = Vec::new();
        // Output shape [1, rows, 8]; iterate rows.
        for row in output.axis_iter(tract_ndarray::Axis(1)) {
            let row: Vec<f32> = row.iter().copied().collect();
            if row.len() < 4 + 1 + CATEGORIES.len() {
                continue;
            }
            let objectness = f64::from(row[4]);
            let (class_index, class_score) = row[5..5 + CATEGORIES.len()]
                .iter()
                .enumerate()
                .fold((0, 0.0f64), |best, (i, score)| {
                    let score = f64::from(*score);
                    if score > best.1 {
                        (i, score)
                    } else {
                        best
                    }
                });
            let confidence = objectness * class_score;
            if confidence < CONFIDENCE_FLOOR {
                continue;
            }
            let normalized = letterbox.to_image_normalized(
                f64::from(row[0]),
                f64::from(row[1]),
                f64::from(row[2]),
                f64::from(row[3]),
            );
            candidates.push(RawDetection {
                category: CATEGORIES[class_index],
                normalized,
                confidence,
            });
        }

        let kept = non_max_suppression(candidates);
        debug!(num_detections = kept.len(), "inference complete");
        Ok(kept)
    }
}

/// Letterbox geometry mapping model coordinates back to the source image
struct Letterbox {
    scale: f64,
    pad_x: f64,
    pad_y: f64,
    image_width: f64,
    image_height: f64,
}

impl Letterbox {
    /// Model-space center box to image-normalized `[x_min, y_min, w, h]`,
    /// clipped to the image bounds
    fn to_image_normalized(&self, cx: f64, cy: f64, w: f64, h: f64) -> [f64; 4] {
        let x_min = ((cx - w / 2.0) - self.pad_x) / self.scale;
        let y_min = ((cy - h / 2.0) - self.pad_y) / self.scale;
        let width = w / self.scale;
        let height = h / self.scale;

        let x = (x_min / self.image_width).clamp(0.0, 1.0);
        let y = (y_min / self.image_height).clamp(0.0, 1.0);
        let w = (width / self.image_width).clamp(0.0, 1.0 - x);
        let h = (height / self.image_height).clamp(0.0, 1.0 - y);
        [x, y, w, h]
    }
}

fn preprocess(image: &DynamicImage) -> (Tensor, Letterbox) {
    let (width, height) = image.dimensions();
    let scale = f64::from(INPUT_SIZE) / f64::from(width.max(height));
    let scaled_w = (f64::from(width) * scale).round() as u32;
    let scaled_h = (f64::from(height) * scale).round() as u32;
    let pad_x = f64::from((INPUT_SIZE - scaled_w) / 2);
    let pad_y = f64::from((INPUT_SIZE - scaled_h) / 2);

    let resized = image
        .resize_exact(scaled_w.max(1), scaled_h.max(1), FilterType::Triangle)
        .to_rgb8();

    let mut input =
        tract_ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let tx = x as usize + pad_x as usize;
        let ty = y as usize + pad_y as usize;
        for channel in 0..3 {
            input[[0, channel, ty, tx]] = f32::from(pixel[channel]) / 255.0;
        }
    }

    (
        input.into_tensor(),
        Letterbox {
            scale,
            pad_x,
            pad_y,
            image_width: f64::from(width),
            image_height: f64::from(height),
        },
    )
}

/// Greedy NMS per category, highest confidence first
fn non_max_suppression(mut candidates: Vec<RawDetection>) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut kept: Vec<RawDetection> = Vec::new();
    for candidate in candidates {
        let overlaps = kept.iter().any(|existing| {
            existing.category == candidate.category
                && iou(&existing.normalized, &candidate.normalized) > NMS_IOU
        });
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let ax2 = a[0] + a[2];
    let ay2 = a[1] + a[3];
    let bx2 = b[0] + b[2];
    let by2 = b[1] + b[3];

    let ix = (ax2.min(bx2) - a[0].max(b[0])).max(0.0);
    let iy = (ay2.min(by2) - a[1].max(b[1])).max(0.0);
    let intersection = ix * iy;
    let union = a[2] * a[3] + b[2] * b[3] - intersection;
    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Download the model file if the cache path does not exist yet. Partial
/// downloads are staged next to the target and renamed on completion.
///
/// # Errors
/// Returns `DetectError::Download` on any network or filesystem failure.
pub async fn ensure_model(path: &Path, url: &str) -> Result<()> {
    if path.exists() {
        info!(model_path = %path.display(), "model already cached");
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    info!(url, model_path = %path.display(), "downloading model to persistent storage");
    let response = reqwest::get(url)
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| DetectError::Download(e.to_string()))?;

    let staging = path.with_extension("download");
    let mut file = tokio::fs::File::create(&staging).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            // Drop the partial file so the next start re-downloads cleanly.
            let _ = std::fs::remove_file(&staging);
            DetectError::Download(e.to_string())
        })?;
        downloaded += chunk.len() as u64;
        tokio::io::AsyncWriteExt::write_all(&mut file, &chunk).await?;
    }
    drop(file);
    tokio::fs::rename(&staging, path).await?;

    info!(
        model_path = %path.display(),
        size_mb = downloaded / (1024 * 1024),
        "model downloaded"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_of_identical_boxes_is_one() {
        let b = [0.1, 0.1, 0.2, 0.2];
        assert!((iou(&b, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_iou_of_disjoint_boxes_is_zero() {
        let a = [0.0, 0.0, 0.1, 0.1];
        let b = [0.5, 0.5, 0.1, 0.1];
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_nms_keeps_highest_confidence_of_overlapping_pair() {
        let candidates = vec![
            RawDetection {
                category: DetectionCategory::Animal,
                normalized: [0.10, 0.10, 0.30, 0.30],
                confidence: 0.6,
            },
            RawDetection {
                category: DetectionCategory::Animal,
                normalized: [0.11, 0.11, 0.30, 0.30],
                confidence: 0.9,
            },
        ];
        let kept = non_max_suppression(candidates);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_nms_keeps_overlapping_boxes_of_different_categories() {
        let candidates = vec![
            RawDetection {
                category: DetectionCategory::Animal,
                normalized: [0.1, 0.1, 0.3, 0.3],
                confidence: 0.9,
            },
            RawDetection {
                category: DetectionCategory::Person,
                normalized: [0.1, 0.1, 0.3, 0.3],
                confidence: 0.8,
            },
        ];
        assert_eq!(non_max_suppression(candidates).len(), 2);
    }

    #[test]
    fn test_letterbox_round_trip_square_image() {
        // A square image fills the input exactly: no padding, pure scale.
        let letterbox = Letterbox {
            scale: f64::from(INPUT_SIZE) / 1000.0,
            pad_x: 0.0,
            pad_y: 0.0,
            image_width: 1000.0,
            image_height: 1000.0,
        };
        // A centered box covering the middle fifth of the input.
        let edge = f64::from(INPUT_SIZE);
        let normalized = letterbox.to_image_normalized(edge / 2.0, edge / 2.0, edge / 5.0, edge / 5.0);
        assert!((normalized[0] - 0.4).abs() < 1e-6);
        assert!((normalized[1] - 0.4).abs() < 1e-6);
        assert!((normalized[2] - 0.2).abs() < 1e-6);
        assert!((normalized[3] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_letterbox_output_is_clipped_to_unit_square() {
        let letterbox = Letterbox {
            scale: 0.5,
            pad_x: 0.0,
            pad_y: 70.0,
            image_width: 1280.0,
            image_height: 1000.0,
        };
        let normalized = letterbox.to_image_normalized(-50.0, -50.0, 5000.0, 5000.0);
        assert!(normalized[0] >= 0.0 && normalized[1] >= 0.0);
        assert!(normalized[0] + normalized[2] <= 1.0 + 1e-9);
        assert!(normalized[1] + normalized[3] <= 1.0 + 1e-9);
    }
}
