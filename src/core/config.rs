//! 分析配置 - JSON5 文件 + 默认值

use crate::core::engagement::{ClassifierConfig, EngagementError, PipelineConfig};
use crate::core::video::ExtractionConfig;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL_PATH: &str = "./model/engagement-model.onnx";

/// Everything one analysis run needs, loadable from a partial JSON5 file.
///
/// ```json5
/// {
///   model_path: "models/engagement.onnx",
///   extraction: { sampling: { mode: "time_interval", seconds: 5 }, resize_factor: 0.5 },
///   classifier: { threshold: 0.6 },
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub model_path: PathBuf,
    pub extraction: ExtractionConfig,
    pub classifier: ClassifierConfig,
    pub pipeline: PipelineConfig,
    /// Reports an analyzer keeps before evicting the oldest; unbounded when unset.
    pub max_stored_reports: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            extraction: ExtractionConfig::default(),
            classifier: ClassifierConfig::default(),
            pipeline: PipelineConfig::default(),
            max_stored_reports: None,
        }
    }
}

impl AnalysisConfig {
    /// Long recordings: sparse time-interval sampling, half-size frames and
    /// no per-frame rows.
    pub fn for_long_video() -> Self {
        Self {
            extraction: ExtractionConfig::for_long_video(),
            pipeline: PipelineConfig { keep_per_frame: false },
            ..Default::default()
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngagementError> {
        let path = path.as_ref();
        info!("📄 Loading config from {:?}", path);
        let text = fs::read_to_string(path)?;
        Self::from_json5_str(&text)
    }

    /// Parses JSON5 (plain JSON included) and validates the result.
    pub fn from_json5_str(text: &str) -> Result<Self, EngagementError> {
        let config: Self =
            json5::from_str(text).map_err(|e| EngagementError::Config(format!("cannot parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngagementError> {
        self.extraction.validate()?;
        self.classifier.validate()?;
        if self.max_stored_reports == Some(0) {
            return Err(EngagementError::Config("max_stored_reports must be at least 1".to_string()));
        }
        Ok(())
    }
}
