//! 视频源抽象 - 解码后端与抽帧逻辑之间的接缝

use super::error::VideoError;
use image::RgbImage;

/// Stream properties reported when a source is opened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMetadata {
    pub fps: f64,
    /// `None` when the container does not report a usable frame count.
    pub frame_count: Option<u64>,
    pub width: u32,
    pub height: u32,
}

/// An opened video stream with a decode cursor.
///
/// Implementations release their decoder handle on drop, so a source that goes
/// out of scope mid-run (early return, `?`, panic unwinding) is still closed.
pub trait VideoSource {
    fn metadata(&self) -> VideoMetadata;

    /// Decodes the frame at the cursor and advances it. `Ok(None)` marks the end
    /// of the stream. A frame that fails to decode still advances the cursor,
    /// so the caller can skip it and keep reading.
    fn read_frame(&mut self) -> Result<Option<RgbImage>, VideoError>;

    /// Moves the cursor so the next `read_frame` returns frame `frame_index`.
    fn seek(&mut self, frame_index: u64) -> Result<(), VideoError>;

    /// Index of the frame the next `read_frame` will return.
    fn position(&self) -> u64;

    /// Whether `seek` is cheaper than decoding forward.
    fn is_seekable(&self) -> bool {
        true
    }
}

/// Frames pushed from memory, e.g. a camera callback or a native decode layer.
pub struct MemorySource {
    frames: Vec<RgbImage>,
    fps: f64,
    cursor: u64,
}

impl MemorySource {
    pub fn new(frames: Vec<RgbImage>, fps: f64) -> Self {
        Self {
            frames,
            fps,
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl VideoSource for MemorySource {
    fn metadata(&self) -> VideoMetadata {
        let (width, height) = self
            .frames
            .first()
            .map(|f| f.dimensions())
            .unwrap_or((0, 0));
        VideoMetadata {
            fps: self.fps,
            frame_count: Some(self.frames.len() as u64),
            width,
            height,
        }
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>, VideoError> {
        let frame = self.frames.get(self.cursor as usize).cloned();
        if frame.is_some() {
            self.cursor += 1;
        }
        Ok(frame)
    }

    fn seek(&mut self, frame_index: u64) -> Result<(), VideoError> {
        self.cursor = frame_index;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.cursor
    }
}

/// In-memory source whose frames at `corrupt` positions fail to decode.
#[cfg(test)]
pub(crate) struct CorruptingSource {
    inner: MemorySource,
    corrupt: Vec<u64>,
}

#[cfg(test)]
impl CorruptingSource {
    pub(crate) fn new(frames: Vec<RgbImage>, fps: f64, corrupt: Vec<u64>) -> Self {
        Self {
            inner: MemorySource::new(frames, fps),
            corrupt,
        }
    }
}

#[cfg(test)]
impl VideoSource for CorruptingSource {
    fn metadata(&self) -> VideoMetadata {
        self.inner.metadata()
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>, VideoError> {
        let position = self.inner.position();
        if self.corrupt.contains(&position) && (position as usize) < self.inner.len() {
            self.inner.seek(position + 1)?;
            return Err(VideoError::Decode("corrupt packet".to_string()));
        }
        self.inner.read_frame()
    }

    fn seek(&mut self, frame_index: u64) -> Result<(), VideoError> {
        self.inner.seek(frame_index)
    }

    fn position(&self) -> u64 {
        self.inner.position()
    }
}

/// Forward-only source: frames can be read once, in order. Seeking backwards
/// fails and seeking forwards decodes and discards the frames in between.
pub struct SequentialSource<I> {
    frames: I,
    metadata: VideoMetadata,
    cursor: u64,
}

impl<I> SequentialSource<I>
where
    I: Iterator<Item = RgbImage>,
{
    pub fn new(frames: I, metadata: VideoMetadata) -> Self {
        Self {
            frames,
            metadata,
            cursor: 0,
        }
    }
}

impl<I> VideoSource for SequentialSource<I>
where
    I: Iterator<Item = RgbImage>,
{
    fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>, VideoError> {
        let frame = self.frames.next();
        if frame.is_some() {
            self.cursor += 1;
        }
        Ok(frame)
    }

    fn seek(&mut self, frame_index: u64) -> Result<(), VideoError> {
        if frame_index < self.cursor {
            return Err(VideoError::Backend(format!(
                "cannot seek back to frame {} from {} on a sequential source",
                frame_index, self.cursor
            )));
        }
        while self.cursor < frame_index {
            if self.read_frame()?.is_none() {
                break;
            }
        }
        Ok(())
    }

    fn position(&self) -> u64 {
        self.cursor
    }

    fn is_seekable(&self) -> bool {
        false
    }
}
