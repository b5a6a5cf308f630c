//! Host-facing effect interface.
//!
//! A host runtime drives an effect through four calls: it asks once (or
//! whenever its inputs change) what output to allocate, collects the
//! parameter declarations for its panel, forwards control events as they
//! happen, and calls `execute_tick` once per frame.

mod params;
mod pipeline;

pub use params::{
    ControlAction, ControlEvent, ControlSurface, MenuOption, ParameterDecl, QUALITY_PARAM,
    RESET_PARAM,
};
pub use pipeline::{PipelineConfig, PipelineDiagnostics, SegmentationPipeline};

use crate::error::TickFailure;
use crate::frame::{FrameBuffer, FrameInfo, OutputBuffer, PixelFormat};

/// Output the host must allocate before ticking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputInfo {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Cook on every host frame, even when the input did not change
    pub execute_every_tick: bool,
}

/// Result of one tick as seen by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    Completed { frame: u64 },
    /// The tick was abandoned and the output left as it was
    Failed(TickFailure),
}

impl TickStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, TickStatus::Completed { .. })
    }
}

/// Operations a host runtime calls on a per-frame effect
pub trait Effect {
    fn describe_output(&mut self, input: FrameInfo) -> OutputInfo;

    fn declare_parameters(&self) -> Vec<ParameterDecl>;

    fn on_control_event(&mut self, event: ControlEvent);

    /// Process one frame. Errors never escape; they are logged and reported
    /// through the returned status.
    fn execute_tick(&mut self, input: &FrameBuffer<'_>, output: &mut OutputBuffer<'_>)
        -> TickStatus;
}
