use crate::core::video::VideoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngagementError {
    #[error("cannot open video: {0}")]
    VideoOpen(String),
    #[error("frame decode failed: {0}")]
    FrameDecode(String),
    #[error("model load failed: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("video error: {0}")]
    Video(VideoError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngagementError {
    /// Per-frame failures are skipped; everything else aborts the run.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            EngagementError::FrameDecode(_) | EngagementError::Inference(_)
        )
    }
}

impl From<VideoError> for EngagementError {
    fn from(err: VideoError) -> Self {
        match err {
            VideoError::Open { .. } => EngagementError::VideoOpen(err.to_string()),
            VideoError::Decode(msg) => EngagementError::FrameDecode(msg),
            VideoError::Image(e) => EngagementError::FrameDecode(e.to_string()),
            VideoError::InvalidConfig(msg) => EngagementError::Config(msg),
            other => EngagementError::Video(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_open_maps_to_video_open() {
        let err: EngagementError = VideoError::open("/tmp/x.mp4", "no such file").into();
        assert!(matches!(err, EngagementError::VideoOpen(_)));
        assert!(!err.is_frame_local());
    }

    #[test]
    fn test_decode_is_frame_local() {
        let err: EngagementError = VideoError::Decode("truncated".to_string()).into();
        assert!(matches!(err, EngagementError::FrameDecode(_)));
        assert!(err.is_frame_local());
        assert!(EngagementError::Inference("nan".to_string()).is_frame_local());
    }

    #[test]
    fn test_frame_rate_stays_run_level() {
        let err: EngagementError = VideoError::InvalidFrameRate(0.0).into();
        assert!(matches!(err, EngagementError::Video(VideoError::InvalidFrameRate(_))));
        assert!(!err.is_frame_local());
    }
}
