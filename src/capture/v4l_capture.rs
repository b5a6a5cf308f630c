use super::FrameSource;
use anyhow::{Context, Result};
use camola_matte::{Frame, FrameInfo, PixelFormat};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;

pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    /// Open a webcam, asking for the mode closest to the requested one
    pub fn new(device_index: u32, width: u32, height: u32, fps: u32) -> Result<Self> {
        tracing::info!(
            "Initializing webcam {} at {}x{}@{}",
            device_index,
            width,
            height,
            fps
        );

        let index = CameraIndex::Index(device_index);
        let wanted = CameraFormat::new(Resolution::new(width, height), FrameFormat::MJPEG, fps);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(wanted));

        let mut camera = Camera::new(index, requested).context("Failed to open camera")?;

        camera
            .open_stream()
            .context("Failed to open camera stream")?;

        let actual = camera.resolution();
        tracing::info!(
            "Webcam initialized at {}x{}",
            actual.width(),
            actual.height()
        );

        Ok(Self {
            camera,
            width: actual.width(),
            height: actual.height(),
        })
    }
}

impl FrameSource for WebcamCapture {
    fn next_frame(&mut self) -> Result<Frame> {
        let buffer = self.camera.frame().context("Failed to capture frame")?;

        let decoded = buffer
            .decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        let info = FrameInfo::new(decoded.width(), decoded.height(), PixelFormat::Rgb8);
        Frame::from_raw(info, decoded.into_raw()).context("Decoded frame has an unexpected size")
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
