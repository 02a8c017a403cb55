use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Settings for the whole recognition pipeline, normally read from `zooscan.toml`.
///
/// Every section and field has a default, so an empty file is a valid config.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub preprocess: PreprocessConfig,
    pub gate: GateConfig,
    pub engines: EnginesConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreprocessConfig {
    /// Contrast multiplier applied around the mean gray level.
    pub contrast_factor: f32,
    /// Median filter radius; 1 gives a 3×3 window.
    pub median_radius: u32,
    /// Down-scale images whose longer side exceeds this many pixels.
    pub max_dimension: Option<u32>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            contrast_factor: 2.5,
            median_radius: 1,
            max_dimension: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateConfig {
    /// Minimum trimmed character count for recognized text to be accepted.
    pub min_chars: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self { min_chars: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnginesConfig {
    pub detection: DetectionEngineConfig,
    pub reader: ReaderEngineConfig,
    pub tesseract: TesseractConfig,
}

/// ONNX text detection + recognition models for the primary-language engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectionEngineConfig {
    pub detection_model: Option<PathBuf>,
    pub recognition_model: Option<PathBuf>,
    pub dictionary: Option<PathBuf>,
}

/// Models for the general-purpose reader engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReaderEngineConfig {
    pub detection_model: Option<PathBuf>,
    pub recognition_model: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TesseractConfig {
    /// Directory containing `tessdata`; `None` uses the system default.
    pub data_path: Option<String>,
    pub lang: String,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            lang: "por".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let factor = self.preprocess.contrast_factor;
        if !factor.is_finite() || factor <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "preprocess.contrast_factor must be positive, got {factor}"
            )));
        }
        if self.gate.min_chars == 0 {
            return Err(ConfigError::Invalid("gate.min_chars must be at least 1".into()));
        }
        if self.preprocess.max_dimension == Some(0) {
            return Err(ConfigError::Invalid("preprocess.max_dimension must be non-zero".into()));
        }
        if self.engines.tesseract.lang.trim().is_empty() {
            return Err(ConfigError::Invalid("engines.tesseract.lang must not be empty".into()));
        }
        Ok(())
    }
}
