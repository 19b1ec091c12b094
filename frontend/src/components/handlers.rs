use super::super::Msg;
use super::super::{FileData, Model};
use super::utils::extract_image_files;
use gloo_file::{File as GlooFile, ObjectUrl};
use gloo_net::http::Request;
use shared::{ModelKind, PredictionResponse};
use wasm_bindgen_futures::spawn_local;
use web_sys::{ClipboardEvent, DragEvent, FileList};
use yew::prelude::*;

pub const CONNECTION_ERROR: &str = "Error connecting to backend!";

pub fn handle_file_selected(model: &mut Model, ctx: &Context<Model>, file: GlooFile) -> bool {
    model.error = None;
    model.prediction = None;
    model.file = Some(FileData {
        file: file.clone(),
        preview_url: None,
    });
    ctx.link().send_message(Msg::AddPreview(ObjectUrl::from(file)));
    true
}

pub fn handle_add_preview(model: &mut Model, url: ObjectUrl) -> bool {
    match model.file.as_mut() {
        Some(file_data) => {
            file_data.preview_url = Some(url);
            true
        }
        None => false,
    }
}

pub fn handle_clear_input(model: &mut Model) -> bool {
    // Dropping the ObjectUrl revokes it.
    model.file = None;
    model.image_url.clear();
    model.prediction = None;
    model.error = None;
    true
}

pub fn handle_predict(model: &mut Model, ctx: &Context<Model>) -> bool {
    if model.loading {
        return false;
    }

    let file = model.file.as_ref().map(|data| data.file.clone());
    let image_url = model.image_url.trim().to_string();
    if file.is_none() && image_url.is_empty() {
        model.error = Some("Please upload an image or enter an image URL.".into());
        return true;
    }

    model.loading = true;
    model.error = None;
    model.prediction = None;
    send_prediction_request(ctx, model.model_kind, file, image_url);
    true
}

pub fn handle_prediction_received(
    model: &mut Model,
    kind: ModelKind,
    response: PredictionResponse,
) -> bool {
    model.loading = false;
    match response {
        PredictionResponse::Success {
            output_image_base64,
            ..
        } => {
            model.prediction = Some((
                kind,
                format!("data:image/jpeg;base64,{}", output_image_base64),
            ));
        }
        PredictionResponse::Error { message, .. } => {
            model.error = Some(message);
        }
    }
    true
}

pub fn handle_drop(model: &mut Model, ctx: &Context<Model>, event: DragEvent) -> bool {
    event.prevent_default();
    model.is_dragging = false;

    if let Some(file_list) = event.data_transfer().and_then(|dt| dt.files()) {
        process_file_list(ctx, &file_list);
    }
    true
}

pub fn handle_paste(ctx: &Context<Model>, event: ClipboardEvent) -> bool {
    if let Some(file_list) = event.clipboard_data().and_then(|dt| dt.files()) {
        if file_list.length() > 0 {
            event.prevent_default();
            process_file_list(ctx, &file_list);
            return true;
        }
    }
    false
}

/// Only the first image is kept; one prediction runs per request.
pub fn process_file_list(ctx: &Context<Model>, file_list: &FileList) {
    match extract_image_files(file_list).into_iter().next() {
        Some(file) => ctx.link().send_message(Msg::FileSelected(file)),
        None => {
            log::warn!("Dropped or pasted content contained no image");
            ctx.link()
                .send_message(Msg::SetError(Some("No valid image file found.".into())));
        }
    }
}

fn build_form(file: Option<&GlooFile>, image_url: &str) -> Option<web_sys::FormData> {
    let form_data = web_sys::FormData::new().ok()?;
    match file {
        Some(file) => form_data
            .append_with_blob_and_filename("file", file.as_ref(), &file.name())
            .ok()?,
        None => form_data.append_with_str("image_url", image_url).ok()?,
    }
    Some(form_data)
}

pub fn send_prediction_request(
    ctx: &Context<Model>,
    kind: ModelKind,
    file: Option<GlooFile>,
    image_url: String,
) {
    let link = ctx.link().clone();

    spawn_local(async move {
        let Some(form_data) = build_form(file.as_ref(), &image_url) else {
            link.send_message(Msg::SetError(Some("Failed to build request.".into())));
            return;
        };

        let endpoint = format!("/predict/{}", kind);
        let request = match Request::post(&endpoint).body(form_data) {
            Ok(request) => request,
            Err(e) => {
                log::error!("Failed to build request: {}", e);
                link.send_message(Msg::SetError(Some(CONNECTION_ERROR.into())));
                return;
            }
        };

        match request.send().await {
            Ok(response) => match response.json::<PredictionResponse>().await {
                Ok(body) => link.send_message(Msg::PredictionReceived(kind, body)),
                Err(e) => {
                    log::error!("Unexpected response from {}: {}", endpoint, e);
                    link.send_message(Msg::SetError(Some(format!(
                        "Failed to parse response: {}",
                        e
                    ))));
                }
            },
            Err(e) => {
                log::error!("Request to {} failed: {}", endpoint, e);
                link.send_message(Msg::SetError(Some(CONNECTION_ERROR.into())));
            }
        }
    });
}
