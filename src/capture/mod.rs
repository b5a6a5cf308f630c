mod v4l_capture;

pub use v4l_capture::WebcamCapture;

use anyhow::Result;
use camola_matte::Frame;

/// Host-side frame source feeding the pipeline one tick at a time
pub trait FrameSource {
    /// Block until the next frame is available
    fn next_frame(&mut self) -> Result<Frame>;

    fn resolution(&self) -> (u32, u32);
}
