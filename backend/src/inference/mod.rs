pub mod annotate;
pub mod postprocess;
#[cfg(feature = "torch")]
pub mod torch;

use image::RgbImage;
use shared::ModelKind;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::Settings;
use crate::error::PipelineError;
use crate::imaging::loader::CanonicalImage;

/// Detections scoring below this are discarded.
pub const CONFIDENCE_THRESHOLD: f32 = 0.25;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("model runtime error: {0}")]
    Runtime(String),
    #[error("unexpected model output: {0}")]
    Output(String),
    #[error("model lock poisoned by an earlier panic")]
    Poisoned,
}

impl From<InferenceError> for PipelineError {
    fn from(err: InferenceError) -> Self {
        PipelineError::Inference(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("model file not found: {0}")]
    Missing(String),
    #[error("failed to load {path}: {reason}")]
    Runtime { path: String, reason: String },
    #[error(transparent)]
    Font(#[from] annotate::FontError),
    #[error("this build has no inference runtime; enable the `torch` feature")]
    NoRuntime,
}

/// A loaded model that turns a canonical image into one annotated frame.
pub trait Segmenter: Send + Sync {
    fn segment(&self, image: &CanonicalImage, confidence: f32) -> Result<RgbImage, InferenceError>;
}

/// The two models, loaded once by `main` and shared with every request.
#[derive(Clone)]
pub struct ModelRegistry {
    soil: Arc<dyn Segmenter>,
    vegetation: Arc<dyn Segmenter>,
}

impl ModelRegistry {
    pub fn new(soil: Arc<dyn Segmenter>, vegetation: Arc<dyn Segmenter>) -> Self {
        Self { soil, vegetation }
    }

    #[cfg(feature = "torch")]
    pub fn load(settings: &Settings) -> Result<Self, ModelLoadError> {
        use postprocess::DecodeParams;

        let params = DecodeParams {
            input_width: crate::imaging::loader::CANONICAL_SIZE,
            input_height: crate::imaging::loader::CANONICAL_SIZE,
            confidence: CONFIDENCE_THRESHOLD,
            iou_threshold: settings.inference.iou_threshold,
            max_detections: settings.inference.max_detections,
            mask_threshold: settings.inference.mask_threshold,
        };

        let load = |kind: ModelKind| -> Result<Arc<dyn Segmenter>, ModelLoadError> {
            let spec = settings.models.spec(kind);
            let font = settings
                .inference
                .font_path
                .as_deref()
                .map(annotate::Annotator::load_font)
                .transpose()?;
            let annotator = annotate::Annotator::new(spec.labels.clone(), font);
            let model = torch::TorchSegmenter::load(&spec.path, params, annotator)?;
            log::info!("Loaded {} model from {}", kind, spec.path.display());
            Ok(Arc::new(model))
        };

        Ok(Self::new(load(ModelKind::Soil)?, load(ModelKind::Vegetation)?))
    }

    #[cfg(not(feature = "torch"))]
    pub fn load(_settings: &Settings) -> Result<Self, ModelLoadError> {
        Err(ModelLoadError::NoRuntime)
    }

    /// Exact-match lookup of a caller supplied selector.
    pub fn resolve(model_type: &str) -> Result<ModelKind, PipelineError> {
        ModelKind::from_str(model_type)
            .map_err(|_| PipelineError::InvalidModelType(model_type.to_string()))
    }

    pub fn get(&self, kind: ModelKind) -> Arc<dyn Segmenter> {
        match kind {
            ModelKind::Soil => self.soil.clone(),
            ModelKind::Vegetation => self.vegetation.clone(),
        }
    }
}
