//! Classifier model: download-and-cache plus ONNX inference
//!
//! A ViT-style classifier exported to ONNX over 182x182 crops, normalized
//! with the ImageNet statistics the model was trained with. The softmax runs
//! here so stored vectors are probabilities, not logits.

use crate::species::SPECIES;
use crate::{ClassifyError, Result};
use futures::StreamExt;
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::Path;
use tract_onnx::prelude::*;
use tracing::info;

/// Square crop edge expected by the classifier
pub const INPUT_SIZE: u32 = 182;

const MEAN: [f32; 3] = [0.4850, 0.4560, 0.4060];
const STD: [f32; 3] = [0.2290, 0.2240, 0.2250];

/// Inference seam so the worker loop is testable without a model file
pub trait Classifier: Send + Sync {
    /// Class probabilities aligned with
    /// [`SPECIES`](crate::species::SPECIES), summing to 1.
    ///
    /// # Errors
    /// Returns an error if inference fails.
    fn classify(&self, crop: &DynamicImage) -> Result<Vec<f64>>;
}

type RunnableOnnx = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// tract-backed classifier
pub struct OnnxClassifier {
    model: RunnableOnnx,
}

impl OnnxClassifier {
    /// Load the ONNX model from disk.
    ///
    /// # Errors
    /// Returns `ClassifyError::Inference` if the graph cannot be loaded or
    /// optimized.
    pub fn load(path: &Path) -> Result<Self> {
        info!(model_path = %path.display(), "loading classification model");
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
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;
        info!(num_classes = SPECIES.len(), "classification model loaded");
        Ok(Self { model })
    }
}

impl Classifier for OnnxClassifier {
    fn classify(&self, crop: &DynamicImage) -> Result<Vec<f64>> {
        let tensor = preprocess(crop);
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;
        let logits = outputs[0]
            .to_array_view::<f32>()
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;

        let logits: Vec<f64> = logits.iter().map(|v| f64::from(*v)).collect();
        if logits.len() != SPECIES.len() {
            return Err(ClassifyError::Inference(format!(
                "model produced {} classes, vocabulary has {}",
                logits.len(),
                SPECIES.len()
            )));
        }
        Ok(softmax(&logits))
    }
}

fn preprocess(crop: &DynamicImage) -> Tensor {
    let resized = crop
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom)
        .to_rgb8();
    let mut input =
        tract_ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..3 {
            input[[0, channel, y as usize, x as usize]] =
                (f32::from(pixel[channel]) / 255.0 - MEAN[channel]) / STD[channel];
        }
    }
    input.into_tensor()
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

/// Download the model file if the cache path does not exist yet.
///
/// # Errors
/// Returns `ClassifyError::Download` on any network or filesystem failure.
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
        .map_err(|e| ClassifyError::Download(e.to_string()))?;

    let staging = path.with_extension("download");
    let mut file = tokio::fs::File::create(&staging).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            let _ = std::fs::remove_file(&staging);
            ClassifyError::Download(e.to_string())
        })?;
        tokio::io::AsyncWriteExt::write_all(&mut file, &chunk).await?;
    }
    drop(file);
    tokio::fs::rename(&staging, path).await?;

    info!(model_path = %path.display(), "model downloaded");
    Ok(())
}
