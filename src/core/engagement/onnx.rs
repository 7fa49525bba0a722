//! ONNX Runtime 推理后端（`onnx` feature）

use super::classifier::EngagementModel;
use super::error::EngagementError;
use super::preprocess::FrameTensor;
use log::{debug, error, info};
use ndarray::ArrayD;
use ort::{inputs, session::Session, value::TensorRef};
use std::path::{Path, PathBuf};

/// The engagement classifier exported to ONNX, loaded once per process.
pub struct OnnxEngagementModel {
    session: Session,
    path: PathBuf,
}

impl OnnxEngagementModel {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngagementError> {
        let path = path.as_ref().to_path_buf();
        info!("🔧 Loading engagement model from: {:?}", path);

        if !path.is_file() {
            error!("❌ Model artifact not found at {:?}", path);
            return Err(EngagementError::ModelLoad(format!(
                "model artifact not found at {:?}",
                path
            )));
        }

        let session = Session::builder()
            .map_err(|e| EngagementError::ModelLoad(format!("failed to create session builder: {}", e)))?
            .commit_from_file(&path)
            .map_err(|e| {
                error!("❌ Failed to load model: {}", e);
                EngagementError::ModelLoad(format!("failed to load {:?}: {}", path, e))
            })?;

        info!("✅ Engagement model loaded successfully");
        Ok(Self { session, path })
    }
}

impl EngagementModel for OnnxEngagementModel {
    fn name(&self) -> &str {
        "onnx"
    }

    fn predict(&mut self, input: &FrameTensor) -> Result<Vec<f32>, EngagementError> {
        let array = ArrayD::from_shape_vec(input.shape.clone(), input.data.clone())
            .map_err(|e| EngagementError::Inference(format!("bad input shape: {}", e)))?;
        let tensor = TensorRef::from_array_view(array.view())
            .map_err(|e| EngagementError::Inference(format!("failed to create tensor ref: {}", e)))?;

        let outputs = self
            .session
            .run(inputs![tensor])
            .map_err(|e| EngagementError::Inference(format!("inference failed: {}", e)))?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| EngagementError::Inference(format!("output is not f32: {}", e)))?;
        let values: Vec<f32> = output.iter().copied().collect();
        debug!("model output: {:?}", values);
        Ok(values)
    }
}

impl Drop for OnnxEngagementModel {
    fn drop(&mut self) {
        info!("🗑️ OnnxEngagementModel: releasing session for {:?}", self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_load_error() {
        let result = OnnxEngagementModel::load("/no/such/engagement-model.onnx");
        assert!(matches!(result, Err(EngagementError::ModelLoad(_))));
    }

    #[test]
    fn test_corrupt_model_is_load_error() {
        let path = std::env::temp_dir().join(format!("engagement_corrupt_{}.onnx", std::process::id()));
        std::fs::write(&path, b"not an onnx graph").unwrap();
        let result = OnnxEngagementModel::load(&path);
        assert!(matches!(result, Err(EngagementError::ModelLoad(_))));
        std::fs::remove_file(&path).unwrap();
    }
}
