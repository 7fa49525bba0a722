use super::error::VideoError;
use super::frame::Frame;
use super::sampling::{interval_positions, interval_step, SamplingPolicy};
use super::source::VideoSource;
use super::writer::{FrameWriter, DEFAULT_JPEG_QUALITY};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_INDEX_WIDTH: usize = 4;
/// Undecodable frames in a row after which the stream is treated as broken.
pub const MAX_CONSECUTIVE_DECODE_FAILURES: u32 = 25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub sampling: SamplingPolicy,
    /// Uniform downscale applied to each retained frame, in (0, 1].
    pub resize_factor: f32,
    pub jpeg_quality: u8,
    /// Digits in the zero-padded frame index of persisted file names.
    pub index_width: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingPolicy::default(),
            resize_factor: 1.0,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            index_width: DEFAULT_INDEX_WIDTH,
        }
    }
}

impl ExtractionConfig {
    /// Sparse sampling for long recordings: one half-size frame every 5 seconds.
    pub fn for_long_video() -> Self {
        Self {
            sampling: SamplingPolicy::every_secs(5.0),
            resize_factor: 0.5,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), VideoError> {
        self.sampling.validate()?;
        if !(self.resize_factor > 0.0 && self.resize_factor <= 1.0) {
            return Err(VideoError::InvalidConfig(format!(
                "resize factor {} outside (0, 1]",
                self.resize_factor
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(VideoError::InvalidConfig(format!(
                "jpeg quality {} outside 1..=100",
                self.jpeg_quality
            )));
        }
        if self.index_width == 0 {
            return Err(VideoError::InvalidConfig(
                "index width must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// 提取统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub decoded_frames: u64,
    pub retained_frames: u64,
    /// Frames at retained positions that could not be decoded or resized.
    pub skipped_frames: u64,
}

/// Pulls frames out of a [`VideoSource`] according to the sampling policy.
pub struct FrameExtractor {
    config: ExtractionConfig,
    stats: ExtractionStats,
}

impl FrameExtractor {
    pub fn new() -> Self {
        Self {
            config: ExtractionConfig::default(),
            stats: ExtractionStats::default(),
        }
    }

    pub fn with_config(config: ExtractionConfig) -> Result<Self, VideoError> {
        config.validate()?;
        Ok(Self {
            config,
            stats: ExtractionStats::default(),
        })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn stats(&self) -> ExtractionStats {
        self.stats
    }

    /// Streams every retained frame to `on_frame` in capture order.
    ///
    /// Frames are numbered by a retained-frame counter starting at 0. A frame
    /// that fails to decode is logged, counted in `skipped_frames` and does
    /// not consume an index. The callback may fail, which stops the run.
    /// Returns the number of frames handed over; zero frames is a valid outcome.
    pub fn run<F>(&mut self, source: &mut dyn VideoSource, mut on_frame: F) -> Result<u64, VideoError>
    where
        F: FnMut(Frame) -> Result<(), VideoError>,
    {
        self.stats = ExtractionStats::default();
        let meta = source.metadata();
        info!(
            "🎞️ extracting with {} sampling ({:.2} fps, {:?} frames)",
            self.config.sampling.name(),
            meta.fps,
            meta.frame_count
        );

        match self.config.sampling {
            SamplingPolicy::FixedStep { step } => self.run_fixed_step(source, step, &mut on_frame)?,
            SamplingPolicy::TimeInterval { seconds } => {
                let step = interval_step(seconds, meta.fps)?;
                if !source.is_seekable() {
                    warn!("⚠️ time-interval sampling on a forward-only source decodes every frame");
                }
                debug!("time-interval step: {} frames", step);
                self.run_time_interval(source, step, meta.frame_count, &mut on_frame)?
            }
        }

        if self.stats.retained_frames == 0 {
            warn!(
                "⚠️ no frames extracted ({} decoded, {} skipped)",
                self.stats.decoded_frames, self.stats.skipped_frames
            );
        } else {
            info!(
                "✅ extraction complete: {} of {} decoded frames retained, {} skipped",
                self.stats.retained_frames, self.stats.decoded_frames, self.stats.skipped_frames
            );
        }
        Ok(self.stats.retained_frames)
    }

    /// Collects the retained frames in memory.
    pub fn extract(&mut self, source: &mut dyn VideoSource) -> Result<Vec<Frame>, VideoError> {
        let mut frames = Vec::new();
        self.run(source, |frame| {
            frames.push(frame);
            Ok(())
        })?;
        Ok(frames)
    }

    /// Writes the retained frames to `output_dir` as JPEG files and returns
    /// their paths in capture order.
    pub fn extract_to_dir(
        &mut self,
        source: &mut dyn VideoSource,
        output_dir: impl AsRef<Path>,
    ) -> Result<Vec<PathBuf>, VideoError> {
        let writer = FrameWriter::create(output_dir, self.config.jpeg_quality)?;
        let mut paths = Vec::new();
        self.run(source, |frame| {
            paths.push(writer.write(&frame)?);
            Ok(())
        })?;
        info!("💾 {} frames saved to {:?}", paths.len(), writer.dir());
        Ok(paths)
    }

    fn run_fixed_step<F>(
        &mut self,
        source: &mut dyn VideoSource,
        step: u64,
        on_frame: &mut F,
    ) -> Result<(), VideoError>
    where
        F: FnMut(Frame) -> Result<(), VideoError>,
    {
        let policy = SamplingPolicy::FixedStep { step };
        let mut frame_number = 0u64;
        let mut failures = 0u32;
        loop {
            let retained = policy.retains(frame_number);
            match source.read_frame() {
                Ok(Some(image)) => {
                    failures = 0;
                    self.stats.decoded_frames += 1;
                    if retained {
                        self.emit(Frame::from_image(image, frame_number), on_frame)?;
                    }
                }
                Ok(None) => break,
                Err(e) if e.is_frame_local() => {
                    self.record_failure(&mut failures, frame_number, retained, e)?
                }
                Err(e) => return Err(e),
            }
            frame_number += 1;
        }
        Ok(())
    }

    fn run_time_interval<F>(
        &mut self,
        source: &mut dyn VideoSource,
        step: u64,
        frame_count: Option<u64>,
        on_frame: &mut F,
    ) -> Result<(), VideoError>
    where
        F: FnMut(Frame) -> Result<(), VideoError>,
    {
        let positions: Box<dyn Iterator<Item = u64>> = match frame_count {
            Some(count) => Box::new(interval_positions(step, count)),
            None => Box::new((0u64..).step_by(step as usize)),
        };

        let mut failures = 0u32;
        for position in positions {
            source.seek(position)?;
            match source.read_frame() {
                Ok(Some(image)) => {
                    failures = 0;
                    self.stats.decoded_frames += 1;
                    self.emit(Frame::from_image(image, position), on_frame)?;
                }
                Ok(None) => {
                    debug!("no frame at position {}, stopping", position);
                    break;
                }
                Err(e) if e.is_frame_local() => self.record_failure(&mut failures, position, true, e)?,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Skips an undecodable frame, giving up once too many fail in a row.
    fn record_failure(
        &mut self,
        failures: &mut u32,
        frame_number: u64,
        retained: bool,
        error: VideoError,
    ) -> Result<(), VideoError> {
        *failures += 1;
        if *failures >= MAX_CONSECUTIVE_DECODE_FAILURES {
            return Err(VideoError::Backend(format!(
                "{} consecutive frames failed to decode, last at {}: {}",
                failures, frame_number, error
            )));
        }
        if retained {
            warn!("⚠️ skipping frame {}: {}", frame_number, error);
            self.stats.skipped_frames += 1;
        } else {
            debug!("undecodable frame {} is not sampled: {}", frame_number, error);
        }
        Ok(())
    }

    fn emit<F>(&mut self, frame: Frame, on_frame: &mut F) -> Result<(), VideoError>
    where
        F: FnMut(Frame) -> Result<(), VideoError>,
    {
        let index = self.stats.retained_frames;
        if index == 10u64.saturating_pow(self.config.index_width as u32) {
            warn!(
                "frame index {} exceeds {} digits, file names no longer sort in capture order",
                index, self.config.index_width
            );
        }
        let frame_number = frame.frame_number;
        let frame = match frame
            .with_index(index, self.config.index_width)
            .scaled(self.config.resize_factor)
        {
            Ok(frame) => frame,
            Err(e) if e.is_frame_local() => {
                warn!("⚠️ skipping frame {}: {}", frame_number, e);
                self.stats.skipped_frames += 1;
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        on_frame(frame)?;
        self.stats.retained_frames += 1;
        Ok(())
    }
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::source::{CorruptingSource, MemorySource, SequentialSource, VideoMetadata};
    use image::{Rgb, RgbImage};
    use std::fs;

    /// Frame `n` is filled with gray level `n` so retained positions can be read back.
    fn numbered_frames(count: u8) -> Vec<RgbImage> {
        (0..count)
            .map(|n| RgbImage::from_pixel(8, 6, Rgb([n, n, n])))
            .collect()
    }

    #[test]
    fn test_fixed_step_keeps_every_second_frame() {
        let mut source = MemorySource::new(numbered_frames(10), 30.0);
        let mut extractor = FrameExtractor::new();

        let frames = extractor.extract(&mut source).unwrap();
        let numbers: Vec<u64> = frames.iter().map(|f| f.frame_number).collect();
        assert_eq!(numbers, vec![0, 2, 4, 6, 8]);

        let ids: Vec<&str> = frames.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "frame_0000.jpg",
                "frame_0001.jpg",
                "frame_0002.jpg",
                "frame_0003.jpg",
                "frame_0004.jpg"
            ]
        );
        assert_eq!(frames[3].data[0], 6);

        let stats = extractor.stats();
        assert_eq!(stats.decoded_frames, 10);
        assert_eq!(stats.retained_frames, 5);
    }

    #[test]
    fn test_fixed_step_on_unseekable_source() {
        let meta = VideoMetadata {
            fps: 0.0,
            frame_count: None,
            width: 8,
            height: 6,
        };
        let mut source = SequentialSource::new(numbered_frames(7).into_iter(), meta);
        let config = ExtractionConfig {
            sampling: SamplingPolicy::every_nth(3),
            ..Default::default()
        };
        let mut extractor = FrameExtractor::with_config(config).unwrap();

        let frames = extractor.extract(&mut source).unwrap();
        let numbers: Vec<u64> = frames.iter().map(|f| f.frame_number).collect();
        assert_eq!(numbers, vec![0, 3, 6]);
    }

    #[test]
    fn test_time_interval_seeks_by_step() {
        let frames: Vec<RgbImage> = (0..400u32)
            .map(|n| RgbImage::from_pixel(4, 4, Rgb([(n % 256) as u8, 0, 0])))
            .collect();
        let mut source = MemorySource::new(frames, 30.0);
        let config = ExtractionConfig {
            sampling: SamplingPolicy::every_secs(5.0),
            ..Default::default()
        };
        let mut extractor = FrameExtractor::with_config(config).unwrap();

        let frames = extractor.extract(&mut source).unwrap();
        let numbers: Vec<u64> = frames.iter().map(|f| f.frame_number).collect();
        assert_eq!(numbers, vec![0, 150, 300]);
        assert_eq!(frames[1].data[0], 150);
        assert_eq!(frames[2].id, "frame_0002.jpg");
        assert_eq!(extractor.stats().decoded_frames, 3);
    }

    #[test]
    fn test_time_interval_unknown_length_stops_at_end() {
        let meta = VideoMetadata {
            fps: 2.0,
            frame_count: None,
            width: 8,
            height: 6,
        };
        let mut source = SequentialSource::new(numbered_frames(9).into_iter(), meta);
        let config = ExtractionConfig {
            sampling: SamplingPolicy::every_secs(2.0),
            ..Default::default()
        };
        let mut extractor = FrameExtractor::with_config(config).unwrap();

        let frames = extractor.extract(&mut source).unwrap();
        let numbers: Vec<u64> = frames.iter().map(|f| f.frame_number).collect();
        assert_eq!(numbers, vec![0, 4, 8]);
    }

    #[test]
    fn test_time_interval_without_fps_fails() {
        let mut source = MemorySource::new(numbered_frames(3), 0.0);
        let config = ExtractionConfig {
            sampling: SamplingPolicy::every_secs(1.0),
            ..Default::default()
        };
        let mut extractor = FrameExtractor::with_config(config).unwrap();
        assert!(matches!(
            extractor.extract(&mut source),
            Err(VideoError::InvalidFrameRate(_))
        ));
    }

    #[test]
    fn test_empty_source_is_not_an_error() {
        let mut source = MemorySource::new(Vec::new(), 30.0);
        let mut extractor = FrameExtractor::new();
        let frames = extractor.extract(&mut source).unwrap();
        assert!(frames.is_empty());
        assert_eq!(extractor.stats(), ExtractionStats::default());
    }

    #[test]
    fn test_resize_factor_applied() {
        let mut source = MemorySource::new(numbered_frames(2), 30.0);
        let config = ExtractionConfig {
            resize_factor: 0.5,
            ..Default::default()
        };
        let mut extractor = FrameExtractor::with_config(config).unwrap();
        let frames = extractor.extract(&mut source).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!((frames[0].width, frames[0].height), (4, 3));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = [
            ExtractionConfig {
                resize_factor: 0.0,
                ..Default::default()
            },
            ExtractionConfig {
                sampling: SamplingPolicy::every_nth(0),
                ..Default::default()
            },
            ExtractionConfig {
                index_width: 0,
                ..Default::default()
            },
            ExtractionConfig {
                jpeg_quality: 0,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(FrameExtractor::with_config(config).is_err());
        }
    }

    #[test]
    fn test_extract_to_dir_writes_sorted_files() {
        let dir = std::env::temp_dir().join(format!("engagement_extract_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let mut source = MemorySource::new(numbered_frames(6), 30.0);
        let mut extractor = FrameExtractor::new();
        let paths = extractor.extract_to_dir(&mut source, &dir).unwrap();
        assert_eq!(paths.len(), 3);

        let mut names: Vec<String> = fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["frame_0000.jpg", "frame_0001.jpg", "frame_0002.jpg"]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_callback_error_stops_run() {
        let mut source = MemorySource::new(numbered_frames(10), 30.0);
        let mut extractor = FrameExtractor::new();
        let mut seen = 0;
        let result = extractor.run(&mut source, |_| {
            seen += 1;
            if seen == 2 {
                Err(VideoError::Decode("stop".to_string()))
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
        assert_eq!(seen, 2);
        assert_eq!(extractor.stats().retained_frames, 1);
    }

    #[test]
    fn test_corrupt_frame_is_skipped_not_fatal() {
        // frame 2 is sampled, frame 3 is not
        let mut source = CorruptingSource::new(numbered_frames(6), 30.0, vec![2, 3]);
        let mut extractor = FrameExtractor::new();

        let frames = extractor.extract(&mut source).unwrap();
        let numbers: Vec<u64> = frames.iter().map(|f| f.frame_number).collect();
        assert_eq!(numbers, vec![0, 4]);
        assert_eq!(frames[1].id, "frame_0001.jpg");

        let stats = extractor.stats();
        assert_eq!(stats.decoded_frames, 4);
        assert_eq!(stats.retained_frames, 2);
        assert_eq!(stats.skipped_frames, 1);
    }

    #[test]
    fn test_time_interval_skips_corrupt_position() {
        let mut source = CorruptingSource::new(numbered_frames(9), 1.0, vec![3]);
        let config = ExtractionConfig {
            sampling: SamplingPolicy::every_secs(3.0),
            ..Default::default()
        };
        let mut extractor = FrameExtractor::with_config(config).unwrap();

        let frames = extractor.extract(&mut source).unwrap();
        let numbers: Vec<u64> = frames.iter().map(|f| f.frame_number).collect();
        assert_eq!(numbers, vec![0, 6]);
        assert_eq!(extractor.stats().skipped_frames, 1);
    }

    #[test]
    fn test_unbroken_decode_failures_end_the_run() {
        let corrupt: Vec<u64> = (0..40).collect();
        let mut source = CorruptingSource::new(numbered_frames(40), 30.0, corrupt);
        let mut extractor = FrameExtractor::new();
        assert!(matches!(
            extractor.extract(&mut source),
            Err(VideoError::Backend(_))
        ));
    }
}
