//! 分析流水线 - 抽帧 → 预处理 → 分类 → 聚合

use super::aggregator::{AnalysisReport, ResultAggregator};
use super::classifier::{EngagementClassifier, EngagementModel};
use super::error::EngagementError;
use super::prediction::EngagementPrediction;
use crate::core::config::AnalysisConfig;
use crate::core::video::{open_video, ExtractionConfig, FrameExtractor, FrameWriter, VideoError, VideoSource};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const FRAME_SUFFIX: &str = ".jpg";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Keep one row per frame in the report. Long videos can turn this off
    /// and rely on the observer for per-frame output.
    pub keep_per_frame: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { keep_per_frame: true }
    }
}

pub struct AnalysisPipeline<M> {
    classifier: EngagementClassifier<M>,
    extraction: ExtractionConfig,
    config: PipelineConfig,
}

impl<M: EngagementModel> AnalysisPipeline<M> {
    pub fn new(
        classifier: EngagementClassifier<M>,
        extraction: ExtractionConfig,
        config: PipelineConfig,
    ) -> Result<Self, EngagementError> {
        extraction.validate()?;
        Ok(Self {
            classifier,
            extraction,
            config,
        })
    }

    /// Builds the classifier and pipeline around an already loaded model.
    pub fn from_config(model: M, config: &AnalysisConfig) -> Result<Self, EngagementError> {
        config.validate()?;
        let classifier = EngagementClassifier::new(model, config.classifier)?;
        Self::new(classifier, config.extraction.clone(), config.pipeline.clone())
    }

    pub fn classifier(&self) -> &EngagementClassifier<M> {
        &self.classifier
    }

    pub fn extraction_config(&self) -> &ExtractionConfig {
        &self.extraction
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Analyzes a directory of pre-extracted `.jpg` frames.
    pub fn analyze_directory(&mut self, dir: impl AsRef<Path>) -> Result<AnalysisReport, EngagementError> {
        self.analyze_directory_with(dir, |_| {})
    }

    /// Like [`analyze_directory`](Self::analyze_directory), calling
    /// `on_prediction` for each frame as soon as it is classified.
    ///
    /// Files are visited in lexicographic name order. Unreadable or
    /// undecodable files are skipped with a warning.
    pub fn analyze_directory_with<F>(
        &mut self,
        dir: impl AsRef<Path>,
        on_prediction: F,
    ) -> Result<AnalysisReport, EngagementError>
    where
        F: FnMut(&EngagementPrediction),
    {
        let dir = dir.as_ref();
        info!("🎬 analyzing frames in {:?}", dir);

        let names = list_frames(dir)?;
        if names.is_empty() {
            warn!("⚠️ no {} frames found in {:?}", FRAME_SUFFIX, dir);
        }

        let preprocessor = *self.classifier.preprocessor();
        let mut aggregator =
            ResultAggregator::with_per_frame(self.config.keep_per_frame).with_observer(on_prediction);

        for name in names {
            let bytes = match fs::read(dir.join(&name)) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("⚠️ skipping {}: {}", name, e);
                    aggregator.skip();
                    continue;
                }
            };
            let result = preprocessor
                .preprocess_bytes(&bytes)
                .and_then(|tensor| self.classifier.classify(&name, &tensor));
            absorb(&mut aggregator, &name, result)?;
        }

        Ok(finish(aggregator))
    }

    /// Extracts frames from a video file and analyzes them in one pass.
    ///
    /// With `output_dir` set, every retained frame is also written there as a
    /// JPEG under the same identifier the report uses.
    pub fn analyze_video(
        &mut self,
        path: impl AsRef<Path>,
        output_dir: Option<&Path>,
    ) -> Result<AnalysisReport, EngagementError> {
        let path = path.as_ref();
        info!("🎬 analyzing video {:?}", path);
        let mut source = open_video(path)?;
        self.analyze_source(source.as_mut(), output_dir)
    }

    pub fn analyze_source(
        &mut self,
        source: &mut dyn VideoSource,
        output_dir: Option<&Path>,
    ) -> Result<AnalysisReport, EngagementError> {
        self.analyze_source_with(source, output_dir, |_| {})
    }

    pub fn analyze_source_with<F>(
        &mut self,
        source: &mut dyn VideoSource,
        output_dir: Option<&Path>,
        on_prediction: F,
    ) -> Result<AnalysisReport, EngagementError>
    where
        F: FnMut(&EngagementPrediction),
    {
        let mut extractor = FrameExtractor::with_config(self.extraction.clone())?;
        let writer = match output_dir {
            Some(dir) => Some(FrameWriter::create(dir, self.extraction.jpeg_quality)?),
            None => None,
        };

        let classifier = &mut self.classifier;
        let mut aggregator =
            ResultAggregator::with_per_frame(self.config.keep_per_frame).with_observer(on_prediction);
        let mut aborted: Option<EngagementError> = None;

        let result = extractor.run(source, |frame| {
            if let Some(writer) = &writer {
                if let Err(e) = writer.write(&frame) {
                    if !e.is_frame_local() {
                        return Err(e);
                    }
                    warn!("⚠️ skipping {}: {}", frame.id, e);
                    aggregator.skip();
                    return Ok(());
                }
            }
            let prediction = classifier.classify_frame(&frame);
            match absorb(&mut aggregator, &frame.id, prediction) {
                Ok(()) => Ok(()),
                Err(e) => {
                    let reason = e.to_string();
                    aborted = Some(e);
                    Err(VideoError::Backend(format!("analysis aborted: {}", reason)))
                }
            }
        });

        if let Some(e) = aborted {
            return Err(e);
        }
        result?;

        // frames the extractor could not decode never reached the classifier
        let stats = extractor.stats();
        aggregator.skip_many(stats.skipped_frames);
        debug!(
            "extraction stats: {} decoded, {} retained, {} skipped",
            stats.decoded_frames, stats.retained_frames, stats.skipped_frames
        );
        Ok(finish(aggregator))
    }
}

/// Sorted names of the `.jpg` files in `dir`, following symlinks.
fn list_frames(dir: &Path) -> Result<Vec<String>, EngagementError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("⚠️ unreadable entry in {:?}: {}", dir, e);
                continue;
            }
        };
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                warn!("⚠️ ignoring non UTF-8 file name {:?}", raw);
                continue;
            }
        };
        if !name.ends_with(FRAME_SUFFIX) {
            continue;
        }
        match fs::metadata(entry.path()) {
            Ok(meta) if meta.is_file() => names.push(name),
            Ok(_) => debug!("ignoring {}: not a regular file", name),
            Err(e) => warn!("⚠️ ignoring {}: {}", name, e),
        }
    }
    names.sort();
    Ok(names)
}

/// Feeds one classification result into the aggregator. Frame-local
/// failures become skips; anything else ends the run.
fn absorb(
    aggregator: &mut ResultAggregator<'_>,
    frame_id: &str,
    result: Result<EngagementPrediction, EngagementError>,
) -> Result<(), EngagementError> {
    match result {
        Ok(prediction) => {
            debug!("{}: {} ({:.3})", frame_id, prediction.label, prediction.probability);
            aggregator.push(prediction);
            Ok(())
        }
        Err(e) if e.is_frame_local() => {
            warn!("⚠️ skipping {}: {}", frame_id, e);
            aggregator.skip();
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn finish(aggregator: ResultAggregator<'_>) -> AnalysisReport {
    let report = aggregator.finish();
    if report.skipped_frames > 0 {
        warn!("⚠️ {} frames skipped", report.skipped_frames);
    }
    info!(
        "✅ analysis complete: {}/{} engaged ({:.2}%)",
        report.engaged_frames, report.total_frames, report.engagement_percentage
    );
    report
}
