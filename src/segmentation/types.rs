use super::quality::EngineQualityConfig;
use crate::error::{ConstructError, InferenceError};
use image::RgbImage;

/// Frame in the layout the inference engine consumes: packed 8-bit RGB
pub type EngineImage = RgbImage;

/// Per-pixel foreground confidence: 0.0 = background, 1.0 = foreground
///
/// May be at a lower resolution than the frame it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceMap {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl ConfidenceMap {
    /// Wrap a row-major confidence buffer
    ///
    /// Fails when the buffer length does not match the dimensions.
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Result<Self, InferenceError> {
        let expected = width as usize * height as usize;
        if width == 0 || height == 0 || values.len() != expected {
            return Err(InferenceError::MalformedOutput(format!(
                "{} values for a {}x{} map",
                values.len(),
                width,
                height
            )));
        }

        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }
}

/// Seam to the platform segmentation engine
///
/// Allows swapping between backends (ONNX RVM, platform vision services,
/// scripted engines in tests).
pub trait InferenceEngine {
    /// Reusable request bound to one quality configuration
    ///
    /// Expensive to build; may carry temporal state between frames.
    type Request;

    /// Build a request for the given configuration
    fn build_request(&self, config: &EngineQualityConfig)
        -> Result<Self::Request, ConstructError>;

    /// Segment one frame with an existing request
    fn infer(
        &self,
        request: &mut Self::Request,
        image: &EngineImage,
    ) -> Result<ConfidenceMap, InferenceError>;
}
