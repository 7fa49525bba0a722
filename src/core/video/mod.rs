pub mod error;
pub mod extractor;
pub mod ffmpeg;
pub mod frame;
#[cfg(feature = "opencv")]
pub mod opencv_source;
pub mod sampling;
pub mod source;
pub mod writer;

pub use error::VideoError;
pub use extractor::{ExtractionConfig, ExtractionStats, FrameExtractor};
pub use ffmpeg::{FfmpegSource, FfmpegTools};
pub use frame::{frame_file_name, Frame, FrameInfo};
#[cfg(feature = "opencv")]
pub use opencv_source::OpenCvSource;
pub use sampling::SamplingPolicy;
pub use source::{MemorySource, SequentialSource, VideoMetadata, VideoSource};
pub use writer::FrameWriter;

use std::path::Path;

/// Opens a video file with the decode backend compiled into this build.
pub fn open_video(path: impl AsRef<Path>) -> Result<Box<dyn VideoSource>, VideoError> {
    #[cfg(feature = "opencv")]
    {
        Ok(Box::new(OpenCvSource::open(path)?))
    }

    #[cfg(not(feature = "opencv"))]
    {
        Ok(Box::new(FfmpegSource::open(path)?))
    }
}
