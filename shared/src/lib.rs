use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Which of the two preloaded segmentation models a request targets.
///
/// Parsing is exact: `"Soil"`, `"soil "` or `"veg"` are all rejected.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModelKind {
    Soil,
    Vegetation,
}

impl ModelKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::Soil => "Soil Detection",
            ModelKind::Vegetation => "Vegetation Detection",
        }
    }
}

/// Closed set of failure causes reported in error bodies.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    InvalidModelType,
    NoInputProvided,
    Inference,
    Storage,
}

/// Body of `POST /predict/{model_type}`, always sent with HTTP 200.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PredictionResponse {
    Success {
        model_used: ModelKind,
        output_image_path: String,
        output_image_base64: String,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl PredictionResponse {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        PredictionResponse::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PredictionResponse::Success { .. })
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatusMessage {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn model_kind_parses_exact_names_only() {
        assert_eq!(ModelKind::from_str("soil").unwrap(), ModelKind::Soil);
        assert_eq!(ModelKind::from_str("vegetation").unwrap(), ModelKind::Vegetation);
        assert!(ModelKind::from_str("Soil").is_err());
        assert!(ModelKind::from_str("veg").is_err());
        assert!(ModelKind::from_str("soil ").is_err());
        assert_eq!(ModelKind::iter().count(), 2);
    }

    #[test]
    fn success_body_has_only_success_fields() {
        let body = PredictionResponse::Success {
            model_used: ModelKind::Vegetation,
            output_image_path: "predictions/vegetation_x.jpg".into(),
            output_image_base64: "AAAA".into(),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["model_used"], "vegetation");
        assert!(value.get("message").is_none());
        assert!(value.get("kind").is_none());
    }

    #[test]
    fn error_body_has_only_error_fields() {
        let body = PredictionResponse::error(ErrorKind::InvalidModelType, "nope");
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["kind"], "invalid_model_type");
        assert_eq!(value["message"], "nope");
        assert!(value.get("output_image_base64").is_none());

        let parsed: PredictionResponse = serde_json::from_value(value).unwrap();
        assert!(!parsed.is_success());
    }
}
