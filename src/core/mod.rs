pub mod config;
pub mod engagement;
pub mod video;

pub use config::AnalysisConfig;
