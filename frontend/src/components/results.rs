use super::super::Model;
use yew::prelude::*;

pub fn render_results(model: &Model) -> Html {
    let original = model
        .file
        .as_ref()
        .and_then(|data| data.preview_url.as_ref())
        .map(|url| url.to_string())
        .or_else(|| {
            let url = model.image_url.trim();
            (!url.is_empty()).then(|| url.to_string())
        });

    if original.is_none() && model.prediction.is_none() {
        return html! {};
    }

    html! {
        <div class="results-container">
            if let Some(src) = original {
                <div class="result-panel">
                    <h3>{"Original Image"}</h3>
                    <img class="preview-image" src={src} alt="Original input" />
                </div>
            }
            if let Some((kind, data_url)) = model.prediction.as_ref() {
                <div class="result-panel">
                    <h3>{ format!("{} Result", kind.display_name()) }</h3>
                    <img class="preview-image" src={data_url.clone()} alt="Predicted segmentation" />
                    <a
                        class="download-btn"
                        href={data_url.clone()}
                        download={format!("{}_prediction.jpg", kind)}
                    >
                        <i class="fa-solid fa-download"></i> {" Download"}
                    </a>
                </div>
            }
        </div>
    }
}
