//! 帧预处理 - 灰度化、缩放到 48x48、归一化到 [0, 1]

use super::error::EngagementError;
use crate::core::video::Frame;
use image::{imageops, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

pub const INPUT_SIZE: u32 = 48;

/// Dimension order the model expects for its single-channel input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, 48, 48]`
    Nhw,
    /// `[1, 48, 48, 1]`, the usual Keras export.
    #[default]
    Nhwc,
    /// `[1, 1, 48, 48]`
    Nchw,
}

impl TensorLayout {
    pub fn shape(&self, size: usize) -> Vec<usize> {
        match self {
            TensorLayout::Nhw => vec![1, size, size],
            TensorLayout::Nhwc => vec![1, size, size, 1],
            TensorLayout::Nchw => vec![1, 1, size, size],
        }
    }
}

/// Batch-of-one normalized luminance tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl FrameTensor {
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f32>() / self.data.len() as f32
    }
}

/// Pure frame-to-tensor conversion.
#[derive(Debug, Clone, Copy)]
pub struct FramePreprocessor {
    size: u32,
    layout: TensorLayout,
}

impl FramePreprocessor {
    pub fn new(layout: TensorLayout) -> Self {
        Self {
            size: INPUT_SIZE,
            layout,
        }
    }

    pub fn layout(&self) -> TensorLayout {
        self.layout
    }

    pub fn preprocess(&self, frame: &Frame) -> Result<FrameTensor, EngagementError> {
        let img = frame
            .to_image()
            .map_err(|e| EngagementError::FrameDecode(e.to_string()))?;
        Ok(self.preprocess_image(&img))
    }

    /// Decodes an encoded image (JPEG, PNG, BMP) before preprocessing.
    pub fn preprocess_bytes(&self, bytes: &[u8]) -> Result<FrameTensor, EngagementError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| EngagementError::FrameDecode(e.to_string()))?
            .to_rgb8();
        Ok(self.preprocess_image(&img))
    }

    pub fn preprocess_image(&self, img: &RgbImage) -> FrameTensor {
        let gray = to_luminance(img);
        let resized = imageops::resize(&gray, self.size, self.size, imageops::FilterType::Triangle);
        let data = resized.as_raw().iter().map(|&v| v as f32 / 255.0).collect();

        FrameTensor {
            shape: self.layout.shape(self.size as usize),
            data,
        }
    }
}

impl Default for FramePreprocessor {
    fn default() -> Self {
        Self::new(TensorLayout::default())
    }
}

/// BT.601 luma with integer weights, matching the usual BGR→GRAY conversion.
pub fn to_luminance(img: &RgbImage) -> GrayImage {
    let (width, height) = img.dimensions();
    let gray: Vec<u8> = img
        .as_raw()
        .chunks_exact(3)
        .map(|rgb| {
            ((rgb[0] as u32 * 299 + rgb[1] as u32 * 587 + rgb[2] as u32 * 114) / 1000) as u8
        })
        .collect();
    // pixel count is preserved, so the buffer always fits
    GrayImage::from_raw(width, height, gray).unwrap_or_else(|| GrayImage::new(width, height))
}
