//! OpenCV `VideoCapture` 解码后端（`opencv` feature）

use super::error::VideoError;
use super::source::{VideoMetadata, VideoSource};
use image::RgbImage;
use log::{debug, info, warn};
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::path::{Path, PathBuf};

fn cv_err(e: opencv::Error) -> VideoError {
    VideoError::Backend(e.to_string())
}

fn frame_err(e: opencv::Error) -> VideoError {
    VideoError::Decode(e.to_string())
}

pub struct OpenCvSource {
    path: PathBuf,
    capture: VideoCapture,
    metadata: VideoMetadata,
    cursor: u64,
}

impl OpenCvSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VideoError> {
        let path = path.as_ref().to_path_buf();
        let path_str = path
            .to_str()
            .ok_or_else(|| VideoError::open(&path, "path is not valid UTF-8"))?;

        let capture = VideoCapture::from_file(path_str, videoio::CAP_ANY)
            .map_err(|e| VideoError::open(&path, e.to_string()))?;
        let opened = capture
            .is_opened()
            .map_err(|e| VideoError::open(&path, e.to_string()))?;
        if !opened {
            return Err(VideoError::open(&path, "VideoCapture could not open the file"));
        }

        let fps = capture.get(videoio::CAP_PROP_FPS).map_err(cv_err)?;
        let count = capture.get(videoio::CAP_PROP_FRAME_COUNT).map_err(cv_err)?;
        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH).map_err(cv_err)? as u32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT).map_err(cv_err)? as u32;

        let metadata = VideoMetadata {
            fps: if fps.is_finite() && fps > 0.0 { fps } else { 0.0 },
            frame_count: (count.is_finite() && count > 0.0).then(|| count as u64),
            width,
            height,
        };

        info!(
            "🎬 OpenCvSource: opened {:?} ({}x{}, {:.2} fps, {:?} frames)",
            path, width, height, metadata.fps, metadata.frame_count
        );

        Ok(Self {
            path,
            capture,
            metadata,
            cursor: 0,
        })
    }
}

impl VideoSource for OpenCvSource {
    fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>, VideoError> {
        let mut frame = Mat::default();
        let ok = self.capture.read(&mut frame).map_err(cv_err)?;
        if !ok || frame.empty() {
            debug!("VideoCapture ended at frame {}", self.cursor);
            return Ok(None);
        }
        self.cursor += 1;

        let mut rgb = Mat::default();
        imgproc::cvt_color(&frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0).map_err(frame_err)?;
        let width = rgb.cols() as u32;
        let height = rgb.rows() as u32;
        let bytes = rgb.data_bytes().map_err(frame_err)?.to_vec();

        RgbImage::from_raw(width, height, bytes)
            .map(Some)
            .ok_or_else(|| VideoError::Decode("Mat buffer size mismatch".to_string()))
    }

    fn seek(&mut self, frame_index: u64) -> Result<(), VideoError> {
        let ok = self
            .capture
            .set(videoio::CAP_PROP_POS_FRAMES, frame_index as f64)
            .map_err(cv_err)?;
        if !ok {
            return Err(VideoError::Backend(format!(
                "backend refused to seek to frame {}",
                frame_index
            )));
        }
        self.cursor = frame_index;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.cursor
    }
}

impl Drop for OpenCvSource {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            warn!("VideoCapture release failed: {}", e);
        }
        info!("🗑️ OpenCvSource: released {:?}", self.path);
    }
}
