use yew::prelude::*;

/// Renders the application header
pub fn render_header() -> Html {
    html! {
        <header class="app-header">
            <h1><i class="fa-solid fa-earth-europe"></i> {" Soil & Vegetation Detection"}</h1>
            <p class="subtitle">{"Upload an image or paste its URL, pick a model, and predict"}</p>
        </header>
    }
}
