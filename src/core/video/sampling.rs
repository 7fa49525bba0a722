use super::error::VideoError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FRAME_STEP: u64 = 2;
pub const DEFAULT_INTERVAL_SECS: f64 = 5.0;

/// Which decoded frames are retained for analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SamplingPolicy {
    /// Decode every frame, keep those with `frame_number % step == 0`.
    /// Works on sources that cannot seek.
    FixedStep { step: u64 },
    /// Seek straight to positions `0, s, 2s, ...` where `s = round(seconds * fps)`.
    TimeInterval { seconds: f64 },
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        SamplingPolicy::FixedStep {
            step: DEFAULT_FRAME_STEP,
        }
    }
}

impl SamplingPolicy {
    pub fn every_nth(step: u64) -> Self {
        SamplingPolicy::FixedStep { step }
    }

    pub fn every_secs(seconds: f64) -> Self {
        SamplingPolicy::TimeInterval { seconds }
    }

    pub fn validate(&self) -> Result<(), VideoError> {
        match *self {
            SamplingPolicy::FixedStep { step } if step == 0 => Err(VideoError::InvalidConfig(
                "fixed-step sampling needs step >= 1".to_string(),
            )),
            SamplingPolicy::TimeInterval { seconds } if !(seconds.is_finite() && seconds > 0.0) => {
                Err(VideoError::InvalidConfig(format!(
                    "time-interval sampling needs a positive interval, got {}",
                    seconds
                )))
            }
            _ => Ok(()),
        }
    }

    /// Whether a sequentially decoded frame is kept under fixed-step sampling.
    pub fn retains(&self, frame_number: u64) -> bool {
        match *self {
            SamplingPolicy::FixedStep { step } => step > 0 && frame_number % step == 0,
            SamplingPolicy::TimeInterval { .. } => true,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SamplingPolicy::FixedStep { .. } => "fixed_step",
            SamplingPolicy::TimeInterval { .. } => "time_interval",
        }
    }
}

/// Decode-position stride for time-interval sampling, never less than one frame.
pub fn interval_step(seconds: f64, fps: f64) -> Result<u64, VideoError> {
    if !(fps.is_finite() && fps > 0.0) {
        return Err(VideoError::InvalidFrameRate(fps));
    }
    let step = (seconds * fps).round();
    Ok((step as u64).max(1))
}

/// Positions visited by time-interval sampling when the frame count is known.
pub fn interval_positions(step: u64, frame_count: u64) -> impl Iterator<Item = u64> {
    (0..frame_count).step_by(step.max(1) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_every_second_frame() {
        assert_eq!(SamplingPolicy::default(), SamplingPolicy::FixedStep { step: 2 });
    }

    #[test]
    fn test_fixed_step_retains_even_frames() {
        let policy = SamplingPolicy::every_nth(2);
        let kept: Vec<u64> = (0..10).filter(|&n| policy.retains(n)).collect();
        assert_eq!(kept, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn test_interval_step_five_seconds_at_30fps() {
        assert_eq!(interval_step(5.0, 30.0).unwrap(), 150);
        let positions: Vec<u64> = interval_positions(150, 451).collect();
        assert_eq!(positions, vec![0, 150, 300, 450]);
    }

    #[test]
    fn test_interval_step_rounds() {
        // 29.97 fps NTSC
        assert_eq!(interval_step(5.0, 30000.0 / 1001.0).unwrap(), 150);
        assert_eq!(interval_step(0.01, 30.0).unwrap(), 1);
    }

    #[test]
    fn test_interval_step_needs_frame_rate() {
        assert!(matches!(
            interval_step(5.0, 0.0),
            Err(VideoError::InvalidFrameRate(_))
        ));
        assert!(interval_step(5.0, f64::NAN).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(SamplingPolicy::every_nth(0).validate().is_err());
        assert!(SamplingPolicy::every_secs(-1.0).validate().is_err());
        assert!(SamplingPolicy::every_secs(f64::INFINITY).validate().is_err());
        assert!(SamplingPolicy::every_nth(1).validate().is_ok());
        assert!(SamplingPolicy::every_secs(0.5).validate().is_ok());
    }

    #[test]
    fn test_serde_tagged_form() {
        let json = serde_json::to_string(&SamplingPolicy::every_secs(5.0)).unwrap();
        assert_eq!(json, r#"{"mode":"time_interval","seconds":5.0}"#);

        let parsed: SamplingPolicy =
            serde_json::from_str(r#"{"mode":"fixed_step","step":3}"#).unwrap();
        assert_eq!(parsed, SamplingPolicy::every_nth(3));
    }
}
