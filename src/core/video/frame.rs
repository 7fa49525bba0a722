use super::error::VideoError;
use image::{imageops, RgbImage};

/// Retained frame file name, e.g. `frame_0007.jpg`.
///
/// Padding keeps lexicographic order equal to capture order as long as the
/// index fits in `width` digits.
pub fn frame_file_name(index: u64, width: usize) -> String {
    format!("frame_{:0width$}.jpg", index, width = width)
}

/// 帧数据结构
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGB24 格式
    /// Position of the frame in the decoded stream.
    pub frame_number: u64,
    /// Sequence index among retained frames.
    pub index: u64,
    pub id: String,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>, frame_number: u64) -> Self {
        Self {
            width,
            height,
            data,
            frame_number,
            index: frame_number,
            id: frame_file_name(frame_number, 4),
        }
    }

    pub fn from_image(image: RgbImage, frame_number: u64) -> Self {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw(), frame_number)
    }

    /// Assigns the retained-frame index and the identifier derived from it.
    pub fn with_index(mut self, index: u64, width: usize) -> Self {
        self.index = index;
        self.id = frame_file_name(index, width);
        self
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Copies the pixels into an image, failing when the buffer does not match
    /// the advertised dimensions.
    pub fn to_image(&self) -> Result<RgbImage, VideoError> {
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            VideoError::Decode(format!(
                "{}: buffer of {} bytes does not hold {}x{} RGB pixels",
                self.id,
                self.data.len(),
                self.width,
                self.height
            ))
        })
    }

    /// Uniform downscale by `factor` in (0, 1]. A factor of 1 returns the frame as is.
    pub fn scaled(self, factor: f32) -> Result<Frame, VideoError> {
        if !(factor > 0.0 && factor <= 1.0) {
            return Err(VideoError::InvalidConfig(format!(
                "resize factor {} outside (0, 1]",
                factor
            )));
        }
        if factor == 1.0 {
            return Ok(self);
        }

        let img = self.to_image()?;
        let target_width = ((self.width as f32 * factor).round() as u32).max(1);
        let target_height = ((self.height as f32 * factor).round() as u32).max(1);
        let resized = imageops::resize(
            &img,
            target_width,
            target_height,
            imageops::FilterType::Triangle,
        );

        Ok(Frame {
            width: target_width,
            height: target_height,
            data: resized.into_raw(),
            ..self
        })
    }
}

/// 帧元数据（轻量级，用于传递信息）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub frame_number: u64,
    pub index: u64,
}

impl FrameInfo {
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            frame_number: frame.frame_number,
            index: frame.index,
        }
    }
}
