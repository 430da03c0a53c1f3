//! Seam to the pretrained growth-stage network.
//!
//! The network itself is opaque: anything that maps a decoded image to one
//! of the configured labels can sit behind [`StageClassifier`]. This module
//! also owns the input transform the model was trained with, so every
//! backend feeds it identically.

use image::{DynamicImage, RgbImage, imageops::FilterType};

use crate::config::ClassifierConfig;
use crate::error::{ClassificationError, ModelLoadError};

/// Label chosen by the model with its softmax probability.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    /// In [0,1].
    pub confidence: f32,
}

/// Synchronous, possibly slow, image classifier.
pub trait StageClassifier {
    fn classify(&self, image: &DynamicImage) -> Result<Prediction, ClassificationError>;
}

/// Resize-shorter-side, center-crop and normalize into a `1x3xCxC` NCHW
/// buffer, where `C` is `cfg.crop`.
pub fn preprocess(image: &DynamicImage, cfg: &ClassifierConfig) -> Vec<f32> {
    let rgb = image.to_rgb8();
    let resized = resize_shorter_side(&rgb, cfg.resize);
    let crop = cfg.crop.min(resized.width()).min(resized.height());
    let x = (resized.width() - crop) / 2;
    let y = (resized.height() - crop) / 2;
    let cropped = image::imageops::crop_imm(&resized, x, y, crop, crop).to_image();

    let plane = (crop * crop) as usize;
    let scale: [f32; 3] = std::array::from_fn(|c| 1.0 / (255.0 * cfg.std[c]));
    let shift: [f32; 3] = std::array::from_fn(|c| cfg.mean[c] / cfg.std[c]);
    let mut out = vec![0.0f32; 3 * plane];
    for (idx, pixel) in cropped.pixels().enumerate() {
        for (c, &value) in pixel.0.iter().enumerate() {
            out[c * plane + idx] = f32::from(value) * scale[c] - shift[c];
        }
    }
    out
}

fn resize_shorter_side(img: &RgbImage, target: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }
    let (nw, nh) = if w <= h {
        (target, (target as u64 * h as u64 / w as u64) as u32)
    } else {
        ((target as u64 * w as u64 / h as u64) as u32, target)
    };
    image::imageops::resize(img, nw.max(1), nh.max(1), FilterType::Triangle)
}

/// Arg-max over raw logits, mapped to a label. The confidence is the
/// softmax probability of the winner, `1 / Σ exp(x - max)`.
pub fn decide(logits: &[f32], labels: &[String]) -> Result<Prediction, ClassificationError> {
    let Some((best_idx, best)) = logits
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(&b.1))
    else {
        return Err(ClassificationError::InferenceFailed(
            "el modelo no devolvió logits".to_string(),
        ));
    };
    if !best.is_finite() {
        return Err(ClassificationError::InferenceFailed(format!(
            "logit no finito: {best}"
        )));
    }
    let label = labels
        .get(best_idx)
        .cloned()
        .ok_or(ClassificationError::UnknownIndex {
            index: best_idx,
            labels: labels.len(),
        })?;
    let partition: f32 = logits.iter().map(|&x| (x - best).exp()).sum();
    Ok(Prediction {
        label,
        confidence: 1.0 / partition,
    })
}

/// Load the configured model once at startup. Any error here is fatal for
/// the application.
pub fn load_classifier(cfg: &ClassifierConfig) -> Result<Box<dyn StageClassifier>, ModelLoadError> {
    if cfg.labels.is_empty() {
        return Err(ModelLoadError::NoLabels);
    }
    if !cfg.model_path.exists() {
        return Err(ModelLoadError::Missing(cfg.model_path.clone()));
    }
    #[cfg(feature = "ort")]
    {
        let model = crate::onnx::OnnxClassifier::new(cfg)?;
        tracing::info!("modelo cargado: {}", cfg.model_path.display());
        Ok(Box::new(model))
    }
    #[cfg(not(feature = "ort"))]
    {
        Err(ModelLoadError::BackendUnavailable)
    }
}
