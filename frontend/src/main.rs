mod components;

use components::handlers;
use components::header::render_header;
use components::results::render_results;
use components::upload_section::{render_controls, render_upload_section};
use components::utils::render_error_message;
use gloo_events::EventListener;
use gloo_file::{File as GlooFile, ObjectUrl};
use shared::{ModelKind, PredictionResponse};
use wasm_bindgen::JsCast;
use web_sys::{ClipboardEvent, DragEvent};
use yew::prelude::*;

// Models
pub struct FileData {
    pub file: GlooFile,
    pub preview_url: Option<ObjectUrl>,
}

// Yew msg components
pub enum Msg {
    // Input operations
    FileSelected(GlooFile),
    AddPreview(ObjectUrl),
    SetImageUrl(String),
    SetModelKind(ModelKind),
    ClearInput,

    // Prediction
    Predict,
    PredictionReceived(ModelKind, PredictionResponse),

    // UI states
    SetError(Option<String>),
    SetDragging(bool),

    // Input events
    HandleDrop(DragEvent),
    HandlePaste(ClipboardEvent),
}

// Main component
pub struct Model {
    pub file: Option<FileData>,
    pub image_url: String,
    pub model_kind: ModelKind,
    /// `data:` URL of the annotated result and the model that produced it.
    pub prediction: Option<(ModelKind, String)>,
    pub loading: bool,
    pub error: Option<String>,
    pub is_dragging: bool,
    _paste_listener: Option<EventListener>,
}

impl Component for Model {
    type Message = Msg;
    type Properties = ();

    fn create(ctx: &Context<Self>) -> Self {
        let mut model = Self {
            file: None,
            image_url: String::new(),
            model_kind: ModelKind::Soil,
            prediction: None,
            loading: false,
            error: None,
            is_dragging: false,
            _paste_listener: None,
        };

        let link = ctx.link().clone();
        if let Some(window) = web_sys::window() {
            let listener = EventListener::new(&window, "paste", move |event| {
                if let Some(clipboard_event) = event.dyn_ref::<ClipboardEvent>() {
                    link.send_message(Msg::HandlePaste(clipboard_event.clone()));
                }
            });
            model._paste_listener = Some(listener);
        }

        model
    }

    fn update(&mut self, ctx: &Context<Self>, msg: Self::Message) -> bool {
        match msg {
            Msg::FileSelected(file) => handlers::handle_file_selected(self, ctx, file),
            Msg::AddPreview(url) => handlers::handle_add_preview(self, url),
            Msg::SetImageUrl(url) => {
                self.image_url = url;
                true
            }
            Msg::SetModelKind(kind) => {
                self.model_kind = kind;
                true
            }
            Msg::ClearInput => handlers::handle_clear_input(self),

            Msg::Predict => handlers::handle_predict(self, ctx),
            Msg::PredictionReceived(kind, response) => {
                handlers::handle_prediction_received(self, kind, response)
            }

            Msg::SetError(error) => {
                self.error = error;
                self.loading = false;
                true
            }
            Msg::SetDragging(is_dragging) => {
                self.is_dragging = is_dragging;
                true
            }

            Msg::HandleDrop(event) => handlers::handle_drop(self, ctx, event),
            Msg::HandlePaste(event) => handlers::handle_paste(ctx, event),
        }
    }

    fn view(&self, ctx: &Context<Self>) -> Html {
        html! {
            <div class="container">
                { render_header() }

                <main class="main-content">
                { render_upload_section(self, ctx) }
                { render_controls(self, ctx) }
                { render_error_message(self) }
                { render_results(self) }
                </main>

                <footer class="app-footer">
                    <p>{"Soil & Vegetation Detection | Fullstack Rust WASM"}</p>
                </footer>
            </div>
        }
    }
}

fn main() {
    wasm_logger::init(wasm_logger::Config::default());
    log::info!("App starting...");
    yew::Renderer::<Model>::new().render();
}
