//! ONNX Runtime backend for the exported GoogLeNet stage model.

use std::sync::Arc;

use image::DynamicImage;
use ndarray::{Array4, CowArray};
use once_cell::sync::Lazy;
use ort::{
    GraphOptimizationLevel, SessionBuilder, environment::Environment, session::Session,
    tensor::OrtOwnedTensor, value::Value,
};

use crate::classifier::{Prediction, StageClassifier, decide, preprocess};
use crate::config::ClassifierConfig;
use crate::error::{ClassificationError, ModelLoadError};

static ORT_ENV: Lazy<Option<Arc<Environment>>> = Lazy::new(|| {
    match Environment::builder().with_name("etapas-frijol").build() {
        Ok(env) => Some(env.into_arc()),
        Err(e) => {
            tracing::error!("no se pudo iniciar ONNX Runtime: {e}");
            None
        }
    }
});

pub struct OnnxClassifier {
    session: Session,
    config: ClassifierConfig,
}

impl OnnxClassifier {
    pub fn new(cfg: &ClassifierConfig) -> Result<Self, ModelLoadError> {
        let env = ORT_ENV
            .clone()
            .ok_or_else(|| ModelLoadError::Backend("ONNX Runtime no disponible".to_string()))?;
        let session = SessionBuilder::new(&env)
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level1))
            .and_then(|b| b.with_model_from_file(&cfg.model_path))
            .map_err(|e| ModelLoadError::Backend(e.to_string()))?;
        Ok(Self {
            session,
            config: cfg.clone(),
        })
    }

    fn logits(&self, image: &DynamicImage) -> anyhow::Result<Vec<f32>> {
        let side = self.config.crop as usize;
        let data = preprocess(image, &self.config);
        let tensor = Array4::from_shape_vec((1, 3, side, side), data)?.into_dyn();
        let cow = CowArray::from(tensor.view());
        let input = Value::from_array(self.session.allocator(), &cow)
            .map_err(|e| anyhow::anyhow!("no se pudo construir el tensor de entrada: {e}"))?;
        let outputs: Vec<Value> = self.session.run(vec![input])?;
        let first = outputs
            .first()
            .ok_or_else(|| anyhow::anyhow!("el modelo no devolvió salidas"))?;
        let logits: OrtOwnedTensor<f32, _> = first.try_extract()?;
        let view = logits.view();
        Ok(view.iter().cloned().collect())
    }
}

impl StageClassifier for OnnxClassifier {
    fn classify(&self, image: &DynamicImage) -> Result<Prediction, ClassificationError> {
        let logits = self.logits(image)?;
        decide(&logits, &self.config.labels)
    }
}
