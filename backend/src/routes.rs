use actix_files::Files;
use actix_multipart::{Multipart, MultipartError};
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse, web};
use futures::TryStreamExt;
use log::{debug, info};
use serde::Deserialize;
use shared::{PredictionResponse, StatusMessage};
use std::path::PathBuf;

use crate::error::{InputError, PipelineError};
use crate::imaging::loader::ImageSource;
use crate::pipeline::PredictionService;

pub const LIVENESS_MESSAGE: &str = "Soil & Vegetation Detection API is running";

pub fn configure_routes(cfg: &mut web::ServiceConfig, frontend_dir: Option<PathBuf>) {
    cfg.service(web::resource("/").route(web::get().to(home)))
        .service(web::resource("/predict/{model_type}").route(web::post().to(predict)));

    if let Some(dir) = frontend_dir.filter(|dir| dir.is_dir()) {
        info!("Serving frontend from {}", dir.display());
        cfg.service(Files::new("/static", dir).index_file("index.html"));
    }
}

async fn home() -> HttpResponse {
    HttpResponse::Ok().json(StatusMessage {
        message: LIVENESS_MESSAGE.to_string(),
    })
}

/// Form fields accepted by the prediction endpoint.
#[derive(Debug, Default, Deserialize)]
struct PredictForm {
    #[serde(skip)]
    file: Option<Vec<u8>>,
    image_url: Option<String>,
}

impl PredictForm {
    /// A non-empty upload wins over a URL; blank values count as absent.
    fn into_source(self) -> Option<ImageSource> {
        if let Some(data) = self.file.filter(|data| !data.is_empty()) {
            return Some(ImageSource::Bytes(data));
        }
        self.image_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .map(ImageSource::Url)
    }
}

async fn predict(
    req: HttpRequest,
    path: web::Path<String>,
    payload: web::Payload,
    service: web::Data<PredictionService>,
) -> HttpResponse {
    let model_type = path.into_inner();

    let body: PredictionResponse = match read_form(&req, payload).await {
        Ok(form) => match form.into_source() {
            Some(source) => service.predict(&model_type, source).await,
            None => PipelineError::NoInputProvided.into(),
        },
        Err(e) => PipelineError::from(e).into(),
    };
    HttpResponse::Ok().json(body)
}

async fn read_form(req: &HttpRequest, payload: web::Payload) -> Result<PredictForm, InputError> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        read_multipart(Multipart::new(req.headers(), payload)).await
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let body = read_body(payload).await?;
        serde_urlencoded::from_bytes(&body).map_err(|e| InputError::Form(e.to_string()))
    } else {
        debug!("No form body (content type '{}')", content_type);
        Ok(PredictForm::default())
    }
}

async fn read_multipart(mut payload: Multipart) -> Result<PredictForm, InputError> {
    let mut form = PredictForm::default();
    let mut seen_field = false;

    loop {
        let mut field = match payload.try_next().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            // An empty FormData is sent as a lone closing boundary.
            Err(MultipartError::Incomplete) if !seen_field => {
                debug!("Multipart body carried no fields");
                break;
            }
            Err(e) => return Err(InputError::Form(e.to_string())),
        };
        seen_field = true;

        let name = field.name().unwrap_or_default().to_string();
        let mut data = Vec::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| InputError::Form(e.to_string()))?
        {
            data.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "file" => {
                debug!("Received upload of {} bytes", data.len());
                form.file = Some(data);
            }
            "image_url" => form.image_url = Some(String::from_utf8_lossy(&data).into_owned()),
            other => debug!("Ignoring form field '{}'", other),
        }
    }
    Ok(form)
}

async fn read_body(mut payload: web::Payload) -> Result<Vec<u8>, InputError> {
    let mut body = Vec::new();
    while let Some(chunk) = payload
        .try_next()
        .await
        .map_err(|e| InputError::Form(e.to_string()))?
    {
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}
