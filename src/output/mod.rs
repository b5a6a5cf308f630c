mod loopback;

pub use loopback::V4L2Output;

use anyhow::Result;
use camola_matte::Frame;

/// Where finished frames go once the pipeline is done with them
pub trait FrameSink {
    /// Push one frame; any pixel format the pipeline declares is accepted
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Resolution the sink was configured for
    fn resolution(&self) -> (u32, u32);
}
