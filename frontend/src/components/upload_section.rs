use super::super::Model;
use super::super::Msg;
use super::utils::{debounce, extract_image_files};
use shared::ModelKind;
use std::str::FromStr;
use strum::IntoEnumIterator;
use wasm_bindgen::JsCast;
use web_sys::{DragEvent, HtmlInputElement, HtmlSelectElement};
use yew::prelude::*;

pub fn render_upload_section(model: &Model, ctx: &Context<Model>) -> Html {
    html! {
        <div class="upload-section">
            { render_file_input_area(model, ctx) }
            { render_url_input(model, ctx) }
        </div>
    }
}

fn render_file_input_area(model: &Model, ctx: &Context<Model>) -> Html {
    let link = ctx.link();
    let handle_change = link.callback(|e: Event| {
        let input: HtmlInputElement = e.target_unchecked_into();
        let selected = input
            .files()
            .as_ref()
            .map(extract_image_files)
            .and_then(|files| files.into_iter().next());
        input.set_value("");

        match selected {
            Some(file) => Msg::FileSelected(file),
            None => Msg::SetError(Some("No valid image file selected.".into())),
        }
    });

    let handle_drag_over = link.callback(|e: DragEvent| {
        e.prevent_default();
        Msg::SetDragging(true)
    });

    let handle_drag_leave = link.callback(|e: DragEvent| {
        e.prevent_default();
        Msg::SetDragging(false)
    });

    let handle_drop = link.callback(Msg::HandleDrop);
    let trigger_file_input = || {
        let input = web_sys::window()
            .and_then(|w| w.document())
            .and_then(|d| d.get_element_by_id("file-input"))
            .and_then(|el| el.dyn_into::<web_sys::HtmlElement>().ok());
        if let Some(input) = input {
            input.click();
        }
    };

    let placeholder = match model.file.as_ref() {
        Some(data) => html! {
            <div class="upload-placeholder">
                <i class="fa-solid fa-image"></i>
                <p>{ data.file.name() }</p>
            </div>
        },
        None => html! {
            <div class="upload-placeholder">
                <i class="fa-solid fa-cloud-arrow-up"></i>
                <p>{"Drag & drop an image here, paste, or click"}</p>
                <p class="file-types">{"Supported formats: JPG, PNG, WEBP, BMP, GIF"}</p>
            </div>
        },
    };

    html! {
        <>
            <input
                type="file"
                id="file-input"
                accept="image/*"
                style="display: none;"
                onchange={handle_change}
            />

            <div
                id="drop-zone"
                class={classes!("upload-area", model.is_dragging.then_some("drag-over"))}
                ondragover={handle_drag_over}
                ondragleave={handle_drag_leave}
                ondrop={handle_drop}
                onclick={debounce(300, trigger_file_input)}
            >
                { placeholder }
            </div>
        </>
    }
}

fn render_url_input(model: &Model, ctx: &Context<Model>) -> Html {
    let handle_input = ctx.link().callback(|e: InputEvent| {
        let input: HtmlInputElement = e.target_unchecked_into();
        Msg::SetImageUrl(input.value())
    });

    html! {
        <div class="url-input">
            <label for="image-url">{"Or enter an image URL"}</label>
            <input
                type="url"
                id="image-url"
                placeholder="https://example.com/field.jpg"
                value={model.image_url.clone()}
                oninput={handle_input}
            />
        </div>
    }
}

pub fn render_controls(model: &Model, ctx: &Context<Model>) -> Html {
    let link = ctx.link();
    let handle_model_change = link.batch_callback(|e: Event| {
        let select: HtmlSelectElement = e.target_unchecked_into();
        ModelKind::from_str(&select.value()).ok().map(Msg::SetModelKind)
    });

    let predict = {
        let link = link.clone();
        debounce(300, move || link.send_message(Msg::Predict))
    };
    let has_input = model.file.is_some() || !model.image_url.trim().is_empty();

    html! {
        <div class="controls">
            <select id="model-select" onchange={handle_model_change} disabled={model.loading}>
                { for ModelKind::iter().map(|kind| html! {
                    <option value={kind.to_string()} selected={kind == model.model_kind}>
                        { kind.display_name() }
                    </option>
                }) }
            </select>

            <button
                class="analyze-btn"
                onclick={predict}
                disabled={model.loading || !has_input}
            >
                if model.loading {
                    <><i class="fa-solid fa-spinner fa-spin"></i>{" Predicting..."}</>
                } else {
                    <><i class="fa-solid fa-magnifying-glass"></i>{" Predict"}</>
                }
            </button>

            <button
                class="clear-btn"
                onclick={link.callback(|_| Msg::ClearInput)}
                disabled={model.loading}
            >
                <i class="fa-solid fa-trash"></i> {" Clear"}
            </button>
        </div>
    }
}
