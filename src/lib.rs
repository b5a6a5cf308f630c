//! Per-frame person matting for live video.
//!
//! The [`effect::SegmentationPipeline`] turns each host frame into a matte
//! (or a background-removed composite) using a pluggable
//! [`segmentation::InferenceEngine`], reusing the expensive inference
//! request across frames until the quality tier changes or the user resets.

pub mod effect;
pub mod error;
pub mod frame;
pub mod segmentation;

pub use effect::{
    ControlEvent, Effect, OutputInfo, ParameterDecl, PipelineConfig, PipelineDiagnostics,
    SegmentationPipeline, TickStatus,
};
pub use error::{ConstructError, FrameError, InferenceError, TickError, TickFailure};
pub use frame::{Frame, FrameBuffer, FrameInfo, OutputBuffer, OutputMode, PixelFormat};
pub use segmentation::{
    ConfidenceMap, EngineImage, EngineQualityConfig, InferenceEngine, QualityLevel,
};
