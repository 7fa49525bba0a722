use super::error::VideoError;
use super::frame::Frame;
use image::ImageOutputFormat;
use log::debug;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Persists retained frames as JPEG files named by their identifier.
///
/// Each file is encoded in memory, written under a `.tmp` name and renamed
/// into place, so a reader listing `*.jpg` never sees a partial file.
pub struct FrameWriter {
    dir: PathBuf,
    quality: u8,
}

impl FrameWriter {
    /// Creates the output directory if it does not exist yet.
    pub fn create(dir: impl AsRef<Path>, quality: u8) -> Result<Self, VideoError> {
        let dir = dir.as_ref().to_path_buf();
        if !(1..=100).contains(&quality) {
            return Err(VideoError::InvalidConfig(format!(
                "jpeg quality {} outside 1..=100",
                quality
            )));
        }
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, quality })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, frame: &Frame) -> Result<PathBuf, VideoError> {
        let jpeg = encode_jpeg(frame, self.quality)?;

        let final_path = self.dir.join(&frame.id);
        let tmp_path = self.dir.join(format!("{}.tmp", frame.id));
        fs::write(&tmp_path, &jpeg)?;
        if let Err(e) = fs::rename(&tmp_path, &final_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        debug!("💾 wrote {} ({} bytes)", final_path.display(), jpeg.len());
        Ok(final_path)
    }
}

pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, VideoError> {
    let img = frame.to_image()?;
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageOutputFormat::Jpeg(quality))?;
    Ok(buffer.into_inner())
}
