use shared::{ErrorKind, PredictionResponse};

/// Every way a prediction request can fail once it reached the handler.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Error loading image: {0}")]
    InvalidInput(#[from] InputError),
    #[error("Invalid model type '{0}'. Use 'soil' or 'vegetation'.")]
    InvalidModelType(String),
    #[error("No image provided (upload a file or provide image_url).")]
    NoInputProvided,
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Cause of an unusable image source. All variants share the `invalid_input` kind.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Invalid image input. Provide image bytes or a valid image URL.")]
    UnsupportedSource,
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("{url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("cannot identify image file: {0}")]
    Decode(String),
    #[error("malformed form data: {0}")]
    Form(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {reason}")]
    Write { path: String, reason: String },
    #[error("failed to read back {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidInput(_) => ErrorKind::InvalidInput,
            PipelineError::InvalidModelType(_) => ErrorKind::InvalidModelType,
            PipelineError::NoInputProvided => ErrorKind::NoInputProvided,
            PipelineError::Inference(_) => ErrorKind::Inference,
            PipelineError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<PipelineError> for PredictionResponse {
    fn from(err: PipelineError) -> Self {
        PredictionResponse::error(err.kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_failures_share_one_kind_but_keep_their_cause() {
        let status = PipelineError::from(InputError::HttpStatus {
            url: "https://example.com/x.png".into(),
            status: 404,
        });
        let decode = PipelineError::from(InputError::Decode("bad magic".into()));

        assert_eq!(status.kind(), ErrorKind::InvalidInput);
        assert_eq!(decode.kind(), ErrorKind::InvalidInput);
        assert_eq!(
            status.to_string(),
            "Error loading image: https://example.com/x.png returned HTTP 404"
        );
        assert!(decode.to_string().starts_with("Error loading image: "));
    }

    #[test]
    fn converts_into_error_body() {
        let body: PredictionResponse = PipelineError::InvalidModelType("unknown".into()).into();
        match body {
            PredictionResponse::Error { kind, message } => {
                assert_eq!(kind, ErrorKind::InvalidModelType);
                assert!(message.contains("Invalid model type"));
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }
}
