use async_trait::async_trait;
use image::RgbImage;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

use crate::adapters::onnx::yolo_engine::OnnxYoloEngine;
use crate::application::ports::DetectorPort;
use crate::domain::{
    detection::Detection,
    errors::{DomainError, DomainResult},
    model::{ClassNames, ModelId, YoloParams},
};

/// `DetectorPort` over an ONNX Runtime session.
///
/// A model that fails to load leaves the detector in the "not loaded" state:
/// the server keeps running and every detection request reports it.
pub struct OnnxDetector {
    model: ModelId,
    engine: Arc<Mutex<Option<OnnxYoloEngine>>>,
    names: ClassNames,
}

impl OnnxDetector {
    pub fn load(model: ModelId, fallback_names: ClassNames) -> Self {
        let engine = match OnnxYoloEngine::load(&model.onnx_path, fallback_names.clone()) {
            Ok(engine) => {
                info!("Model {} loaded from {}", model.name, model.onnx_path);
                Some(engine)
            }
            Err(e) => {
                error!("Error loading model {}: {:?}", model.onnx_path, e);
                None
            }
        };
        let names = engine
            .as_ref()
            .map(|e| e.names().clone())
            .unwrap_or(fallback_names);

        Self { model, engine: Arc::new(Mutex::new(engine)), names }
    }
}

#[async_trait]
impl DetectorPort for OnnxDetector {
    fn is_loaded(&self) -> bool {
        self.engine.lock().map(|e| e.is_some()).unwrap_or(false)
    }

    fn model_name(&self) -> String {
        self.model.name.clone()
    }

    fn class_names(&self) -> ClassNames {
        self.names.clone()
    }

    async fn detect(&self, image: RgbImage, params: &YoloParams) -> DomainResult<Vec<Detection>> {
        let engine = self.engine.clone();
        let params = params.clone();
        let model_path = self.model.onnx_path.clone();

        tokio::task::spawn_blocking(move || {
            let mut lock = engine
                .lock()
                .map_err(|_| DomainError::OperationFailed("model lock poisoned".into()))?;
            let eng = lock
                .as_mut()
                .ok_or_else(|| DomainError::ModelUnavailable(format!("failed to load {model_path}")))?;
            eng.infer(&image, &params)
                .map_err(|e| DomainError::OperationFailed(format!("inference failed: {e}")))
        })
        .await
        .map_err(|e| DomainError::OperationFailed(format!("inference task failed: {e}")))?
    }
}
