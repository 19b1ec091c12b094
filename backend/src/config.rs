use serde::{Deserialize, Serialize};
use shared::ModelKind;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/server.yaml";
pub const CONFIG_PATH_ENV: &str = "SEGMENTATION_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_address: String,
    pub port: u16,
    pub predictions_dir: PathBuf,
    pub frontend_dir: Option<PathBuf>,
    pub inference: InferenceSettings,
    pub models: ModelsSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub mask_threshold: f32,
    pub font_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsSettings {
    pub soil: ModelSpec,
    pub vegetation: ModelSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub path: PathBuf,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8000,
            predictions_dir: PathBuf::from("predictions"),
            frontend_dir: None,
            inference: InferenceSettings::default(),
            models: ModelsSettings::default(),
        }
    }
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            iou_threshold: 0.7,
            max_detections: 300,
            mask_threshold: 0.5,
            font_path: None,
        }
    }
}

impl Default for ModelsSettings {
    fn default() -> Self {
        Self {
            soil: ModelSpec {
                path: PathBuf::from("models/soil_seg.torchscript"),
                labels: Vec::new(),
            },
            vegetation: ModelSpec {
                path: PathBuf::from("models/vegetation_seg.torchscript"),
                labels: Vec::new(),
            },
        }
    }
}

impl ModelsSettings {
    pub fn spec(&self, kind: ModelKind) -> &ModelSpec {
        match kind {
            ModelKind::Soil => &self.soil,
            ModelKind::Vegetation => &self.vegetation,
        }
    }
}

impl Settings {
    /// Loads settings from `$SEGMENTATION_CONFIG`, falling back to
    /// `config/server.yaml` and then to built-in defaults when that file is absent.
    /// `PORT` overrides the configured port.
    pub fn load() -> Result<Self, SettingsError> {
        let mut settings = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            Err(_) => {
                log::warn!("No config file found, using built-in defaults");
                Self::default()
            }
        };

        if let Ok(port) = std::env::var("PORT") {
            settings.port = port.parse().map_err(|_| SettingsError::Invalid {
                field: "PORT",
                reason: format!("'{}' is not a port number", port),
            })?;
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&config_str).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(config_str)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let unit = |field: &'static str, value: f32| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(SettingsError::Invalid {
                    field,
                    reason: format!("{} is outside [0, 1]", value),
                })
            }
        };
        unit("inference.iou_threshold", self.inference.iou_threshold)?;
        unit("inference.mask_threshold", self.inference.mask_threshold)?;
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}
