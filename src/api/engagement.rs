//! 参与度分析器 - 供上层服务调用
//!
//! ```no_run
//! use engagement_lib::api::EngagementAnalyzer;
//! use engagement_lib::core::AnalysisConfig;
//!
//! let analyzer = EngagementAnalyzer::create(AnalysisConfig::default())?;
//! analyzer.analyze_video("lecture.mp4", "uploads/lecture.mp4", None)?;
//! let report = analyzer.result("lecture.mp4");
//! # Ok::<(), engagement_lib::core::engagement::EngagementError>(())
//! ```

use crate::core::engagement::{
    AnalysisPipeline, AnalysisReport, EngagementError, EngagementModel, ReportStore,
};
use crate::core::AnalysisConfig;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Upload extensions the service accepts.
static VIDEO_EXTENSION: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?i)\.(mp4|avi|mov)$").ok());
/// Path-safe job ids: no separators, no leading dot.
static JOB_ID: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9._-]{0,127}$").ok());

type BoxedModel = Box<dyn EngagementModel + Send>;

/// Long-lived analyzer: the model is loaded once, runs are serialized and
/// every report is kept under its job id.
pub struct EngagementAnalyzer {
    pipeline: Mutex<AnalysisPipeline<BoxedModel>>,
    store: ReportStore,
    config: AnalysisConfig,
}

impl EngagementAnalyzer {
    /// Loads the ONNX model named by `config.model_path`.
    pub fn create(config: AnalysisConfig) -> Result<Self, EngagementError> {
        crate::init_logging();
        info!("🎯 EngagementAnalyzer: initializing with model {:?}", config.model_path);
        config.validate()?;

        #[cfg(feature = "onnx")]
        {
            let model = crate::core::engagement::OnnxEngagementModel::load(&config.model_path)?;
            Self::with_model(model, config)
        }

        #[cfg(not(feature = "onnx"))]
        {
            Err(EngagementError::ModelLoad(format!(
                "cannot load {:?}: built without the onnx feature",
                config.model_path
            )))
        }
    }

    /// Wraps an already loaded model.
    pub fn with_model<M>(model: M, config: AnalysisConfig) -> Result<Self, EngagementError>
    where
        M: EngagementModel + Send + 'static,
    {
        let boxed: BoxedModel = Box::new(model);
        let pipeline = AnalysisPipeline::from_config(boxed, &config)?;
        info!(
            "✅ EngagementAnalyzer ready ({} model, {} sampling)",
            pipeline.classifier().model_name(),
            config.extraction.sampling.name()
        );
        let store = match config.max_stored_reports {
            Some(capacity) => ReportStore::with_capacity(capacity),
            None => ReportStore::new(),
        };
        Ok(Self {
            pipeline: Mutex::new(pipeline),
            store,
            config,
        })
    }

    /// Shares `store` with other analyzers or request handlers.
    pub fn with_store(mut self, store: ReportStore) -> Self {
        self.store = store;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    /// Runs extraction and classification over an uploaded video and stores
    /// the report under `job_id`.
    pub fn analyze_video(
        &self,
        job_id: &str,
        video_path: impl AsRef<Path>,
        output_dir: Option<&Path>,
    ) -> Result<AnalysisReport, EngagementError> {
        validate_job_id(job_id)?;
        let video_path = video_path.as_ref();
        if !is_supported_video(video_path) {
            return Err(EngagementError::VideoOpen(format!(
                "{:?}: only .mp4, .avi and .mov are accepted",
                video_path
            )));
        }

        info!("🎬 job {}: analyzing {:?}", job_id, video_path);
        let report = self.lock_pipeline().analyze_video(video_path, output_dir)?;
        self.store.insert(job_id, report.clone());
        Ok(report)
    }

    /// Analyzes a directory of pre-extracted frames and stores the report
    /// under `job_id`.
    pub fn analyze_frames(&self, job_id: &str, frames_dir: impl AsRef<Path>) -> Result<AnalysisReport, EngagementError> {
        validate_job_id(job_id)?;
        let frames_dir = frames_dir.as_ref();
        info!("🖼️ job {}: analyzing frames in {:?}", job_id, frames_dir);
        let report = self.lock_pipeline().analyze_directory(frames_dir)?;
        self.store.insert(job_id, report.clone());
        Ok(report)
    }

    pub fn result(&self, job_id: &str) -> Option<AnalysisReport> {
        self.store.get(job_id)
    }

    /// Removes and returns the report, for one-shot retrieval.
    pub fn take_result(&self, job_id: &str) -> Option<AnalysisReport> {
        self.store.remove(job_id)
    }

    /// The stored report in its wire shape.
    pub fn result_json(&self, job_id: &str) -> Result<Option<String>, EngagementError> {
        match self.store.get(job_id) {
            Some(report) => Ok(Some(serde_json::to_string(&report)?)),
            None => Ok(None),
        }
    }

    fn lock_pipeline(&self) -> MutexGuard<'_, AnalysisPipeline<BoxedModel>> {
        self.pipeline.lock().unwrap_or_else(|e| {
            warn!("⚠️ previous analysis panicked, reusing pipeline");
            PoisonError::into_inner(e)
        })
    }
}

impl Drop for EngagementAnalyzer {
    fn drop(&mut self) {
        info!("🗑️ EngagementAnalyzer: released ({} stored reports)", self.store.len());
    }
}

/// Whether the file name carries one of the accepted video extensions.
pub fn is_supported_video(path: impl AsRef<Path>) -> bool {
    let name = path.as_ref().to_string_lossy();
    VIDEO_EXTENSION.as_ref().is_some_and(|re| re.is_match(&name))
}

fn validate_job_id(job_id: &str) -> Result<(), EngagementError> {
    match JOB_ID.as_ref() {
        Some(re) if re.is_match(job_id) => Ok(()),
        _ => Err(EngagementError::Config(format!("invalid job id {:?}", job_id))),
    }
}
