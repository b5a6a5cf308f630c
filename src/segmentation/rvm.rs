use super::preprocess::{into_shape_and_data, Preprocessor};
use super::quality::EngineQualityConfig;
use super::types::{ConfidenceMap, EngineImage, InferenceEngine};
use crate::error::{ConstructError, InferenceError};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::{Path, PathBuf};

/// RobustVideoMatting engine backed by ONNX Runtime
///
/// Each request owns its own session sized for one quality tier, plus the
/// recurrent hidden states (r1-r4) carried between frames for temporally
/// smooth mattes. Dropping a request discards that temporal state.
pub struct RvmEngine {
    model_path: PathBuf,
    intra_threads: usize,
}

impl RvmEngine {
    /// Create an engine for an ONNX model file
    ///
    /// The file is only checked for existence here; sessions are built per
    /// request.
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self, ConstructError> {
        let path = model_path.as_ref();
        if !path.is_file() {
            return Err(ConstructError::Unavailable(format!(
                "model file {} not found",
                path.display()
            )));
        }

        Ok(Self {
            model_path: path.to_path_buf(),
            intra_threads: 4,
        })
    }

    pub fn with_intra_threads(mut self, intra_threads: usize) -> Self {
        self.intra_threads = intra_threads.max(1);
        self
    }

    fn load_session(&self) -> Result<Session, String> {
        let builder = Session::builder().map_err(|e| e.to_string())?;
        let builder = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| e.to_string())?;
        let mut builder = builder
            .with_intra_threads(self.intra_threads)
            .map_err(|e| e.to_string())?;
        builder
            .commit_from_file(&self.model_path)
            .map_err(|e| e.to_string())
    }
}

/// Recurrent tensor fed back into the next frame
struct RecurrentState {
    shape: [usize; 4],
    data: Vec<f32>,
}

impl RecurrentState {
    /// RVM accepts 1x1x1x1 zero states on the first frame
    fn initial() -> Self {
        Self {
            shape: [1, 1, 1, 1],
            data: vec![0.0],
        }
    }

    fn to_tensor(&self) -> Result<Tensor<f32>, InferenceError> {
        Tensor::from_array((self.shape, self.data.clone())).map_err(inference_failed)
    }
}

pub struct RvmRequest {
    session: Session,
    preprocessor: Preprocessor,
    config: EngineQualityConfig,
    recurrent: [RecurrentState; 4],
}

impl RvmRequest {
    pub fn config(&self) -> &EngineQualityConfig {
        &self.config
    }
}

impl InferenceEngine for RvmEngine {
    type Request = RvmRequest;

    fn build_request(&self, config: &EngineQualityConfig) -> Result<RvmRequest, ConstructError> {
        if config.input_width == 0 || config.input_height == 0 {
            return Err(ConstructError::Unsupported(format!(
                "input size {}x{}",
                config.input_width, config.input_height
            )));
        }

        tracing::info!(
            "Loading RVM model from {} at {}x{}",
            self.model_path.display(),
            config.input_width,
            config.input_height
        );

        let session = self.load_session().map_err(|e| {
            ConstructError::Unavailable(format!(
                "failed to load model from {}: {}",
                self.model_path.display(),
                e
            ))
        })?;

        tracing::info!("RVM model loaded successfully");

        Ok(RvmRequest {
            session,
            preprocessor: Preprocessor::new(config.input_width, config.input_height),
            config: *config,
            recurrent: std::array::from_fn(|_| RecurrentState::initial()),
        })
    }

    fn infer(
        &self,
        request: &mut RvmRequest,
        image: &EngineImage,
    ) -> Result<ConfidenceMap, InferenceError> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        let (shape, data) = into_shape_and_data(request.preprocessor.preprocess(image));
        let src = Tensor::from_array((shape, data)).map_err(inference_failed)?;
        let [r1, r2, r3, r4] = &request.recurrent;
        let ratio = Tensor::from_array(([1usize], vec![request.config.downsample_ratio]))
            .map_err(inference_failed)?;

        // RVM expects: src, r1i-r4i, downsample_ratio
        let inputs = ort::inputs![
            src,
            r1.to_tensor()?,
            r2.to_tensor()?,
            r3.to_tensor()?,
            r4.to_tensor()?,
            ratio
        ];

        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = request.session.run(inputs).map_err(inference_failed)?;
        drop(_infer_span);

        // Outputs: fgr, pha, r1o-r4o. Only the matte and the new states are kept.
        let (pha_shape, pha) = outputs[1]
            .try_extract_tensor::<f32>()
            .map_err(inference_failed)?;
        let [_, _, matte_height, matte_width] = to_dims(pha_shape)?;
        let matte = ConfidenceMap::new(matte_width as u32, matte_height as u32, pha.to_vec())?;

        let mut next: [Option<RecurrentState>; 4] = Default::default();
        for (slot, index) in next.iter_mut().zip(2..6) {
            let (shape, data) = outputs[index]
                .try_extract_tensor::<f32>()
                .map_err(inference_failed)?;
            *slot = Some(RecurrentState {
                shape: to_dims(shape)?,
                data: data.to_vec(),
            });
        }
        drop(outputs);

        for (state, fresh) in request.recurrent.iter_mut().zip(next) {
            if let Some(fresh) = fresh {
                *state = fresh;
            }
        }

        Ok(matte)
    }
}

fn to_dims(shape: &[i64]) -> Result<[usize; 4], InferenceError> {
    let dims: Vec<usize> = shape
        .iter()
        .map(|&d| usize::try_from(d))
        .collect::<Result<_, _>>()
        .map_err(|_| InferenceError::MalformedOutput(format!("negative dimension in {:?}", shape)))?;

    dims.try_into()
        .map_err(|_| InferenceError::MalformedOutput(format!("expected a 4-d tensor, got {:?}", shape)))
}

fn inference_failed(e: impl std::fmt::Display) -> InferenceError {
    InferenceError::Failed(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_is_unavailable() {
        let err = RvmEngine::new("/nonexistent/rvm.onnx").err().unwrap();
        assert!(matches!(err, ConstructError::Unavailable(_)));
    }

    #[test]
    fn dims_must_be_four_non_negative() {
        assert_eq!(to_dims(&[1, 1, 4, 8]).unwrap(), [1, 1, 4, 8]);
        assert!(to_dims(&[1, 4, 8]).is_err());
        assert!(to_dims(&[1, 1, -1, 8]).is_err());
    }
}
