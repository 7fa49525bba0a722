use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngagementLabel {
    Engaged,
    Distracted,
}

impl EngagementLabel {
    /// Strictly greater than the threshold is engaged; a tie is distracted.
    pub fn from_probability(probability: f32, threshold: f32) -> Self {
        if probability > threshold {
            EngagementLabel::Engaged
        } else {
            EngagementLabel::Distracted
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementLabel::Engaged => "Engaged",
            EngagementLabel::Distracted => "Distracted",
        }
    }
}

impl fmt::Display for EngagementLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified frame.
#[derive(Debug, Clone, PartialEq)]
pub struct EngagementPrediction {
    pub frame_id: String,
    pub probability: f32,
    pub label: EngagementLabel,
}

impl EngagementPrediction {
    pub fn is_engaged(&self) -> bool {
        self.label == EngagementLabel::Engaged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_tie_is_distracted() {
        assert_eq!(
            EngagementLabel::from_probability(0.5, 0.5),
            EngagementLabel::Distracted
        );
        assert_eq!(
            EngagementLabel::from_probability(0.5000001, 0.5),
            EngagementLabel::Engaged
        );
        assert_eq!(
            EngagementLabel::from_probability(0.0, 0.5),
            EngagementLabel::Distracted
        );
    }

    #[test]
    fn test_label_serializes_as_name() {
        assert_eq!(
            serde_json::to_string(&EngagementLabel::Engaged).unwrap(),
            r#""Engaged""#
        );
        assert_eq!(EngagementLabel::Distracted.to_string(), "Distracted");
    }
}
