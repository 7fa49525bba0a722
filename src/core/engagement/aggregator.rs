//! 结果聚合 - 逐帧预测折叠为汇总报告

use super::prediction::{EngagementLabel, EngagementPrediction};
use serde::{Deserialize, Serialize};

/// Per-frame row of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameResult {
    pub frame_id: String,
    pub status: EngagementLabel,
}

/// Summary of one analysis run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub total_frames: u64,
    pub engaged_frames: u64,
    pub engagement_percentage: f64,
    pub per_frame: Vec<FrameResult>,
    /// Frames that could not be decoded or classified; not part of `total_frames`.
    #[serde(skip)]
    pub skipped_frames: u64,
}

impl AnalysisReport {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn distracted_frames(&self) -> u64 {
        self.total_frames - self.engaged_frames
    }

    pub fn is_empty(&self) -> bool {
        self.total_frames == 0
    }

    /// Console summary printed after a run.
    pub fn summary(&self) -> String {
        if self.total_frames == 0 {
            return "No valid frames were analyzed.".to_string();
        }
        format!(
            "Total Frames Analyzed: {}\nEngaged Frames: {}\nEngagement Percentage: {:.2}%",
            self.total_frames, self.engaged_frames, self.engagement_percentage
        )
    }
}

/// `100 * engaged / total` rounded to two decimals, 0 for an empty run.
pub fn engagement_percentage(engaged: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = 100.0 * engaged as f64 / total as f64;
    (pct * 100.0).round() / 100.0
}

type Observer<'a> = Box<dyn FnMut(&EngagementPrediction) + 'a>;

/// Streaming reducer over per-frame predictions.
///
/// Counts are updated as predictions arrive, so long runs can drop the
/// per-frame rows (`keep_per_frame = false`) and still get exact totals.
pub struct ResultAggregator<'a> {
    total: u64,
    engaged: u64,
    skipped: u64,
    keep_per_frame: bool,
    per_frame: Vec<FrameResult>,
    observer: Option<Observer<'a>>,
}

impl<'a> ResultAggregator<'a> {
    pub fn new() -> Self {
        Self::with_per_frame(true)
    }

    pub fn with_per_frame(keep_per_frame: bool) -> Self {
        Self {
            total: 0,
            engaged: 0,
            skipped: 0,
            keep_per_frame,
            per_frame: Vec::new(),
            observer: None,
        }
    }

    /// Calls `observer` for every prediction as soon as it is pushed.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: FnMut(&EngagementPrediction) + 'a,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn push(&mut self, prediction: EngagementPrediction) {
        if let Some(observer) = self.observer.as_mut() {
            observer(&prediction);
        }
        self.total += 1;
        if prediction.is_engaged() {
            self.engaged += 1;
        }
        if self.keep_per_frame {
            self.per_frame.push(FrameResult {
                frame_id: prediction.frame_id,
                status: prediction.label,
            });
        }
    }

    /// Records a frame that was dropped before classification.
    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    pub fn skip_many(&mut self, count: u64) {
        self.skipped += count;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn engaged(&self) -> u64 {
        self.engaged
    }

    pub fn finish(self) -> AnalysisReport {
        AnalysisReport {
            total_frames: self.total,
            engaged_frames: self.engaged,
            engagement_percentage: engagement_percentage(self.engaged, self.total),
            per_frame: self.per_frame,
            skipped_frames: self.skipped,
        }
    }
}

impl Default for ResultAggregator<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Batch fold of a complete prediction sequence.
pub fn aggregate<I>(predictions: I) -> AnalysisReport
where
    I: IntoIterator<Item = EngagementPrediction>,
{
    let mut aggregator = ResultAggregator::new();
    for prediction in predictions {
        aggregator.push(prediction);
    }
    aggregator.finish()
}
