pub mod engagement;

pub use engagement::{is_supported_video, EngagementAnalyzer};
