use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("cannot open video {path:?}: {reason}")]
    Open { path: PathBuf, reason: String },
    #[error("invalid frame rate {0} for time-interval sampling")]
    InvalidFrameRate(f64),
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("video backend failed: {0}")]
    Backend(String),
    #[error("invalid extraction config: {0}")]
    InvalidConfig(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl VideoError {
    /// A failure confined to one frame; the stream itself is still readable.
    pub fn is_frame_local(&self) -> bool {
        matches!(self, VideoError::Decode(_) | VideoError::Image(_))
    }

    pub fn open(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        VideoError::Open {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
