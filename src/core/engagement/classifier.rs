use super::error::EngagementError;
use super::prediction::{EngagementLabel, EngagementPrediction};
use super::preprocess::{FramePreprocessor, FrameTensor, TensorLayout};
use crate::core::video::Frame;
use log::debug;
use serde::{Deserialize, Serialize};

/// Probability above which a frame counts as engaged.
pub const DEFAULT_THRESHOLD: f32 = 0.5;
/// Position of the engaged probability in the model's output vector.
pub const DEFAULT_ENGAGED_INDEX: usize = 0;

/// Opaque trained predictor: one preprocessed tensor in, the flattened output
/// vector out.
pub trait EngagementModel {
    fn name(&self) -> &str {
        "model"
    }

    fn predict(&mut self, input: &FrameTensor) -> Result<Vec<f32>, EngagementError>;
}

impl<M: EngagementModel + ?Sized> EngagementModel for Box<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn predict(&mut self, input: &FrameTensor) -> Result<Vec<f32>, EngagementError> {
        (**self).predict(input)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub threshold: f32,
    pub engaged_index: usize,
    pub layout: TensorLayout,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            engaged_index: DEFAULT_ENGAGED_INDEX,
            layout: TensorLayout::default(),
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<(), EngagementError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(EngagementError::Config(format!(
                "threshold {} outside [0, 1]",
                self.threshold
            )));
        }
        Ok(())
    }
}

pub struct EngagementClassifier<M> {
    model: M,
    config: ClassifierConfig,
    preprocessor: FramePreprocessor,
}

impl<M: EngagementModel> EngagementClassifier<M> {
    pub fn new(model: M, config: ClassifierConfig) -> Result<Self, EngagementError> {
        config.validate()?;
        Ok(Self {
            model,
            preprocessor: FramePreprocessor::new(config.layout),
            config,
        })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn preprocessor(&self) -> &FramePreprocessor {
        &self.preprocessor
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn classify(
        &mut self,
        frame_id: &str,
        input: &FrameTensor,
    ) -> Result<EngagementPrediction, EngagementError> {
        let output = self.model.predict(input)?;
        let probability = *output.get(self.config.engaged_index).ok_or_else(|| {
            EngagementError::Inference(format!(
                "{}: output has {} values, expected index {}",
                frame_id,
                output.len(),
                self.config.engaged_index
            ))
        })?;

        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(EngagementError::Inference(format!(
                "{}: probability {} outside [0, 1]",
                frame_id, probability
            )));
        }

        let label = EngagementLabel::from_probability(probability, self.config.threshold);
        debug!("{} p={:.4} -> {}", frame_id, probability, label);
        Ok(EngagementPrediction {
            frame_id: frame_id.to_string(),
            probability,
            label,
        })
    }

    /// Preprocesses and classifies a decoded frame.
    pub fn classify_frame(&mut self, frame: &Frame) -> Result<EngagementPrediction, EngagementError> {
        let tensor = self.preprocessor.preprocess(frame)?;
        self.classify(&frame.id, &tensor)
    }
}

type Script = Box<dyn FnMut(&FrameTensor) -> Result<Vec<f32>, EngagementError> + Send>;

/// Scripted stand-in for a trained model.
pub struct MockEngagementModel {
    script: Script,
    calls: usize,
}

impl MockEngagementModel {
    pub fn constant(probability: f32) -> Self {
        Self::with_script(move |_| Ok(vec![probability]))
    }

    /// Returns the given probabilities in order, cycling when exhausted.
    pub fn with_sequence(probabilities: Vec<f32>) -> Self {
        let mut next = 0usize;
        Self::with_script(move |_| {
            if probabilities.is_empty() {
                return Ok(Vec::new());
            }
            let p = probabilities[next % probabilities.len()];
            next += 1;
            Ok(vec![p])
        })
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(&FrameTensor) -> f32 + Send + 'static,
    {
        Self::with_script(move |input| Ok(vec![pattern(input)]))
    }

    /// Mean normalized luminance as the engaged probability: bright frames are
    /// engaged, dark frames distracted.
    pub fn from_brightness() -> Self {
        Self::with_pattern(|input| input.mean())
    }

    pub fn with_script<F>(script: F) -> Self
    where
        F: FnMut(&FrameTensor) -> Result<Vec<f32>, EngagementError> + Send + 'static,
    {
        Self {
            script: Box::new(script),
            calls: 0,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl EngagementModel for MockEngagementModel {
    fn name(&self) -> &str {
        "mock"
    }

    fn predict(&mut self, input: &FrameTensor) -> Result<Vec<f32>, EngagementError> {
        self.calls += 1;
        (self.script)(input)
    }
}
