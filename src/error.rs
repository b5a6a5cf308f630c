use crate::frame::PixelFormat;
use thiserror::Error;

/// The inference request could not be built for the requested configuration
#[derive(Debug, Error)]
pub enum ConstructError {
    #[error("inference engine unavailable: {0}")]
    Unavailable(String),

    #[error("unsupported engine configuration: {0}")]
    Unsupported(String),
}

/// A host buffer could not be adapted to or from the engine's layout
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("pixel format {format:?} is not supported here: {reason}")]
    FormatUnsupported {
        format: PixelFormat,
        reason: &'static str,
    },

    #[error("buffer holds {actual} bytes, {expected} required")]
    BufferTooSmall { expected: usize, actual: usize },

    #[error("output is {output:?} but the input frame is {input:?}")]
    DimensionMismatch {
        input: (u32, u32),
        output: (u32, u32),
    },
}

impl FrameError {
    pub(crate) fn unsupported(format: PixelFormat, reason: &'static str) -> Self {
        Self::FormatUnsupported { format, reason }
    }
}

/// The engine failed for one specific frame
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference failed: {0}")]
    Failed(String),

    #[error("engine returned a malformed confidence map: {0}")]
    MalformedOutput(String),
}

/// Everything that can abandon a single tick
#[derive(Debug, Error)]
pub enum TickError {
    #[error(transparent)]
    Construct(#[from] ConstructError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl TickError {
    pub fn kind(&self) -> TickFailure {
        match self {
            TickError::Construct(_) => TickFailure::Construct,
            TickError::Frame(_) => TickFailure::FormatUnsupported,
            TickError::Inference(_) => TickFailure::Inference,
        }
    }
}

/// Coarse failure category reported back to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFailure {
    Construct,
    FormatUnsupported,
    Inference,
}
