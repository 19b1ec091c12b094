use actix_web::web;
use shared::{ModelKind, PredictionResponse};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::imaging::loader::{ImageLoader, ImageSource};
use crate::inference::{CONFIDENCE_THRESHOLD, ModelRegistry};
use crate::storage::artifact_store::{ArtifactStore, StoredArtifact};

/// Load, infer, encode. Failures never escape: they become error bodies.
#[derive(Clone)]
pub struct PredictionService {
    loader: ImageLoader,
    registry: ModelRegistry,
    store: Arc<ArtifactStore>,
}

impl PredictionService {
    pub fn new(
        loader: ImageLoader,
        registry: ModelRegistry,
        store: Arc<ArtifactStore>,
    ) -> Self {
        Self {
            loader,
            registry,
            store,
        }
    }

    pub async fn predict(&self, model_type: &str, source: ImageSource) -> PredictionResponse {
        let request_id = Uuid::new_v4();
        match self.run(model_type, source, request_id).await {
            Ok((kind, artifact)) => {
                log::info!("Request {} finished with the {} model", request_id, kind);
                PredictionResponse::Success {
                    model_used: kind,
                    output_image_path: artifact.path.display().to_string(),
                    output_image_base64: artifact.base64,
                }
            }
            Err(e) => {
                match &e {
                    PipelineError::Storage(_) | PipelineError::Inference(_) => {
                        log::error!("Request {} failed: {}", request_id, e)
                    }
                    _ => log::warn!("Request {} rejected: {}", request_id, e),
                }
                e.into()
            }
        }
    }

    async fn run(
        &self,
        model_type: &str,
        source: ImageSource,
        request_id: Uuid,
    ) -> Result<(ModelKind, StoredArtifact), PipelineError> {
        // Resolved before any fetch, model or disk access.
        let kind = ModelRegistry::resolve(model_type)?;

        let image = self.loader.load(source).await?;
        log::debug!("Request {} loaded a canonical image", request_id);

        let model = self.registry.get(kind);
        let store = self.store.clone();
        let artifact = web::block(move || -> Result<StoredArtifact, PipelineError> {
            let frame = model.segment(&image, CONFIDENCE_THRESHOLD)?;
            Ok(store.encode(&frame, kind, request_id)?)
        })
        .await
        .map_err(|e| PipelineError::Inference(e.to_string()))??;

        Ok((kind, artifact))
    }
}
