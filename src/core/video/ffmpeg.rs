//! ffmpeg 命令行解码后端
//!
//! Metadata comes from `ffprobe -of json`; pixels come from an `ffmpeg` child
//! writing raw RGB24 frames to stdout. Seeking restarts the child at the
//! requested timestamp.

use super::error::VideoError;
use super::source::{VideoMetadata, VideoSource};
use image::RgbImage;
use log::{debug, info, warn};
use serde::Deserialize;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

const FFMPEG_BIN: &str = "ffmpeg";
const FFPROBE_BIN: &str = "ffprobe";
const STDERR_TAIL: usize = 4096;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

/// Parses ffprobe's rational notation (`30000/1001`, `25/1`, `0/0`).
pub fn parse_frame_rate(value: &str) -> Option<f64> {
    let (num, den) = match value.split_once('/') {
        Some((n, d)) => (n.trim().parse::<f64>().ok()?, d.trim().parse::<f64>().ok()?),
        None => (value.trim().parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 {
        return None;
    }
    let fps = num / den;
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

/// Reads stream metadata out of `ffprobe -show_streams -of json` output.
pub fn parse_probe_json(json: &str) -> Result<VideoMetadata, String> {
    let probe: ProbeOutput = serde_json::from_str(json).map_err(|e| e.to_string())?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| "no video stream found".to_string())?;

    let width = stream.width.unwrap_or(0);
    let height = stream.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err("video stream reports no frame size".to_string());
    }

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(0.0);

    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|&n| n > 0)
        .or_else(|| {
            let duration = stream.duration.as_deref()?.parse::<f64>().ok()?;
            (duration > 0.0 && fps > 0.0).then(|| (duration * fps).round() as u64)
        });

    Ok(VideoMetadata {
        fps,
        frame_count,
        width,
        height,
    })
}

/// Executables used by [`FfmpegSource`]. The defaults resolve through `PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from(FFMPEG_BIN),
            ffprobe: PathBuf::from(FFPROBE_BIN),
        }
    }
}

/// Running `ffmpeg` child. Its stderr is drained on a helper thread so a
/// chatty decoder never blocks on a full pipe.
struct Decoder {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
}

impl Decoder {
    fn stderr_tail(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }
}

/// Keeps the last `STDERR_TAIL` bytes the child writes to stderr.
fn drain_stderr(stderr: ChildStderr) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut reader = BufReader::new(stderr);
        let mut tail = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    tail.extend_from_slice(&chunk[..n]);
                    if tail.len() > STDERR_TAIL {
                        let excess = tail.len() - STDERR_TAIL;
                        tail.drain(..excess);
                    }
                }
            }
        }
        String::from_utf8_lossy(&tail).into_owned()
    })
}

/// Video file decoded through the ffmpeg executables.
pub struct FfmpegSource {
    path: PathBuf,
    tools: FfmpegTools,
    metadata: VideoMetadata,
    cursor: u64,
    decoder: Option<Decoder>,
}

impl FfmpegSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VideoError> {
        Self::open_with(path, FfmpegTools::default())
    }

    pub fn open_with(path: impl AsRef<Path>, tools: FfmpegTools) -> Result<Self, VideoError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(VideoError::open(&path, "file does not exist"));
        }

        let output = Command::new(&tools.ffprobe)
            .args(["-v", "error", "-select_streams", "v:0", "-show_streams", "-of", "json"])
            .arg(&path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| VideoError::open(&path, format!("{:?} not available: {}", tools.ffprobe, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::open(&path, stderr.trim().to_string()));
        }

        let json = String::from_utf8_lossy(&output.stdout);
        let metadata = parse_probe_json(&json).map_err(|reason| VideoError::open(&path, reason))?;

        info!(
            "🎬 FfmpegSource: opened {:?} ({}x{}, {:.2} fps, {:?} frames)",
            path, metadata.width, metadata.height, metadata.fps, metadata.frame_count
        );

        Ok(Self {
            path,
            tools,
            metadata,
            cursor: 0,
            decoder: None,
        })
    }

    fn frame_len(&self) -> usize {
        self.metadata.width as usize * self.metadata.height as usize * 3
    }

    fn spawn_decoder(&mut self) -> Result<(), VideoError> {
        let mut cmd = Command::new(&self.tools.ffmpeg);
        cmd.args(["-v", "error", "-nostdin", "-noautorotate"]);
        if self.cursor > 0 {
            if self.metadata.fps <= 0.0 {
                return Err(VideoError::InvalidFrameRate(self.metadata.fps));
            }
            let offset = self.cursor as f64 / self.metadata.fps;
            cmd.arg("-ss").arg(format!("{:.6}", offset));
        }
        cmd.arg("-i")
            .arg(&self.path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| VideoError::Backend(format!("failed to spawn {:?}: {}", self.tools.ffmpeg, e)))?;
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(VideoError::Backend("ffmpeg stdout not captured".to_string()));
            }
        };
        let stderr = child.stderr.take().map(drain_stderr);

        debug!("ffmpeg decoder started at frame {}", self.cursor);
        self.decoder = Some(Decoder {
            child,
            stdout: BufReader::new(stdout),
            stderr,
        });
        Ok(())
    }

    /// Reaps a decoder whose stdout reached EOF. A non-zero exit means the
    /// stream was cut short, not that the video ended.
    fn finish_decoder(&mut self) -> Result<(), VideoError> {
        let Some(mut decoder) = self.decoder.take() else {
            return Ok(());
        };
        let status = decoder.child.wait()?;
        let stderr = decoder.stderr_tail();
        if status.success() {
            debug!("ffmpeg stream ended at frame {}", self.cursor);
            return Ok(());
        }
        let stderr = stderr.trim();
        warn!("⚠️ ffmpeg exited with {} at frame {}: {}", status, self.cursor, stderr);
        Err(VideoError::Backend(format!("ffmpeg exited with {}: {}", status, stderr)))
    }

    fn stop_decoder(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            let _ = decoder.child.kill();
            let _ = decoder.child.wait();
            decoder.stderr_tail();
        }
    }
}

impl VideoSource for FfmpegSource {
    fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>, VideoError> {
        if self.decoder.is_none() {
            self.spawn_decoder()?;
        }
        let frame_len = self.frame_len();
        let mut buf = vec![0u8; frame_len];

        let read = match self.decoder.as_mut() {
            Some(decoder) => decoder.stdout.read_exact(&mut buf),
            None => return Ok(None),
        };

        match read {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.finish_decoder()?;
                return Ok(None);
            }
            Err(e) => {
                self.stop_decoder();
                return Err(e.into());
            }
        }

        self.cursor += 1;
        RgbImage::from_raw(self.metadata.width, self.metadata.height, buf)
            .map(Some)
            .ok_or_else(|| VideoError::Decode("rawvideo frame size mismatch".to_string()))
    }

    fn seek(&mut self, frame_index: u64) -> Result<(), VideoError> {
        if frame_index == self.cursor && self.decoder.is_some() {
            return Ok(());
        }
        self.stop_decoder();
        self.cursor = frame_index;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.cursor
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.stop_decoder();
        info!("🗑️ FfmpegSource: released {:?}", self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        let ntsc = parse_frame_rate("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_parse_probe_json() {
        let json = r#"{
            "streams": [{
                "index": 0,
                "codec_type": "video",
                "width": 1280,
                "height": 720,
                "r_frame_rate": "30/1",
                "avg_frame_rate": "30/1",
                "duration": "10.000000",
                "nb_frames": "300"
            }]
        }"#;
        let meta = parse_probe_json(json).unwrap();
        assert_eq!(meta.width, 1280);
        assert_eq!(meta.height, 720);
        assert_eq!(meta.fps, 30.0);
        assert_eq!(meta.frame_count, Some(300));
    }

    #[test]
    fn test_parse_probe_json_falls_back_to_duration() {
        // webm/mkv streams usually carry no nb_frames
        let json = r#"{"streams":[{"width":640,"height":480,"avg_frame_rate":"0/0","r_frame_rate":"25/1","duration":"4.0"}]}"#;
        let meta = parse_probe_json(json).unwrap();
        assert_eq!(meta.fps, 25.0);
        assert_eq!(meta.frame_count, Some(100));
    }

    #[test]
    fn test_parse_probe_json_without_stream() {
        assert!(parse_probe_json(r#"{"streams":[]}"#).is_err());
        assert!(parse_probe_json("{}").is_err());
        assert!(parse_probe_json("not json").is_err());
    }

    #[test]
    fn test_open_missing_file() {
        let result = FfmpegSource::open("/definitely/not/here.mp4");
        assert!(matches!(result, Err(VideoError::Open { .. })));
    }

    #[cfg(unix)]
    mod stub {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::sync::OnceLock;

        /// 2x2 stream at 1 fps with four frames filled with `a`, `b`, `c`, `d`.
        const FFPROBE: &str = r#"#!/bin/sh
printf '%s' '{"streams":[{"width":2,"height":2,"avg_frame_rate":"1/1","nb_frames":"4"}]}'
"#;

        const FFMPEG: &str = r#"#!/bin/sh
start=0
while [ $# -gt 0 ]; do
  if [ "$1" = "-ss" ]; then start=${2%%.*}; fi
  shift
done
i=$start
while [ "$i" -lt 4 ]; do
  case $i in 0) c=a;; 1) c=b;; 2) c=c;; *) c=d;; esac
  printf '%s' "$c$c$c$c$c$c$c$c$c$c$c$c"
  i=$((i + 1))
done
"#;

        const FFMPEG_BROKEN: &str = "#!/bin/sh\necho 'Decoder not found' >&2\nexit 1\n";

        /// Writes the stub executables once; every test shares them.
        fn dir() -> &'static Path {
            static DIR: OnceLock<PathBuf> = OnceLock::new();
            DIR.get_or_init(|| {
                let dir = std::env::temp_dir().join(format!("engagement_ffmpeg_stub_{}", std::process::id()));
                let _ = fs::remove_dir_all(&dir);
                fs::create_dir_all(&dir).unwrap();
                for (name, body) in [("ffprobe", FFPROBE), ("ffmpeg", FFMPEG), ("ffmpeg_broken", FFMPEG_BROKEN)] {
                    let path = dir.join(name);
                    fs::write(&path, body).unwrap();
                    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
                }
                fs::write(dir.join("clip.mp4"), b"stub").unwrap();
                dir
            })
        }

        fn open(ffmpeg: &str) -> FfmpegSource {
            let tools = FfmpegTools {
                ffmpeg: dir().join(ffmpeg),
                ffprobe: dir().join("ffprobe"),
            };
            FfmpegSource::open_with(dir().join("clip.mp4"), tools).unwrap()
        }

        fn first_byte(frame: Option<RgbImage>) -> u8 {
            frame.unwrap().as_raw()[0]
        }

        #[test]
        fn test_reads_frames_until_eof() {
            let mut source = open("ffmpeg");
            assert_eq!(source.metadata().frame_count, Some(4));
            assert_eq!(source.metadata().fps, 1.0);

            let mut seen = Vec::new();
            while let Some(frame) = source.read_frame().unwrap() {
                assert_eq!(frame.dimensions(), (2, 2));
                seen.push(frame.as_raw()[0]);
            }
            assert_eq!(seen, vec![b'a', b'b', b'c', b'd']);
            assert_eq!(source.position(), 4);
            assert!(source.decoder.is_none());
        }

        #[test]
        fn test_seek_restarts_decoder() {
            let mut source = open("ffmpeg");
            assert_eq!(first_byte(source.read_frame().unwrap()), b'a');

            source.seek(2).unwrap();
            assert!(source.decoder.is_none());
            assert_eq!(source.position(), 2);
            assert_eq!(first_byte(source.read_frame().unwrap()), b'c');
            assert_eq!(first_byte(source.read_frame().unwrap()), b'd');
            assert!(source.read_frame().unwrap().is_none());

            source.seek(1).unwrap();
            assert_eq!(first_byte(source.read_frame().unwrap()), b'b');
        }

        #[test]
        fn test_decoder_failure_is_reported() {
            let mut source = open("ffmpeg_broken");
            match source.read_frame() {
                Err(VideoError::Backend(reason)) => assert!(reason.contains("Decoder not found"), "{}", reason),
                other => panic!("expected backend error, got {:?}", other.map(|f| f.is_some())),
            }
        }

        #[test]
        fn test_decoder_failure_fails_extraction() {
            let mut source = open("ffmpeg_broken");
            let result = crate::core::video::FrameExtractor::new().extract(&mut source);
            assert!(matches!(result, Err(VideoError::Backend(_))));
        }

        #[test]
        fn test_drop_mid_stream() {
            let mut source = open("ffmpeg");
            assert!(source.read_frame().unwrap().is_some());
            assert!(source.decoder.is_some());
            drop(source);
        }

        #[test]
        fn test_missing_ffprobe_is_open_error() {
            let tools = FfmpegTools {
                ffmpeg: dir().join("ffmpeg"),
                ffprobe: dir().join("no_such_ffprobe"),
            };
            let result = FfmpegSource::open_with(dir().join("clip.mp4"), tools);
            assert!(matches!(result, Err(VideoError::Open { .. })));
        }
    }
}
