pub mod aggregator;
pub mod classifier;
pub mod error;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod pipeline;
pub mod prediction;
pub mod preprocess;
pub mod store;

pub use aggregator::{aggregate, engagement_percentage, AnalysisReport, FrameResult, ResultAggregator};
pub use classifier::{ClassifierConfig, EngagementClassifier, EngagementModel, MockEngagementModel};
pub use error::EngagementError;
#[cfg(feature = "onnx")]
pub use onnx::OnnxEngagementModel;
pub use pipeline::{AnalysisPipeline, PipelineConfig};
pub use prediction::{EngagementLabel, EngagementPrediction};
pub use preprocess::{FramePreprocessor, FrameTensor, TensorLayout};
pub use store::ReportStore;
