use super::FrameSink;
use anyhow::{Context, Result};
use camola_matte::Frame;
use image::{imageops, RgbImage};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, FourCC};

/// Raw YUYV writer for a v4l2loopback device
pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        Self::negotiate_format(path, width, height)?;

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!("v4l2loopback device opened successfully");

        Ok(Self {
            file,
            width,
            height,
        })
    }

    /// Announce YUYV at the output size so readers see the right geometry
    fn negotiate_format(path: &Path, width: u32, height: u32) -> Result<()> {
        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open {} for format setup", path.display()))?;

        let mut format = Output::format(&device).context("Failed to query output format")?;
        format.width = width;
        format.height = height;
        format.fourcc = FourCC::new(b"YUYV");

        let applied = Output::set_format(&device, &format).context("Failed to set output format")?;
        if (applied.width, applied.height) != (width, height) {
            tracing::warn!(
                "Loopback device accepted {}x{} instead of {}x{}",
                applied.width,
                applied.height,
                width,
                height
            );
        }
        Ok(())
    }
}

/// Pack RGB into YUV 4:2:2 (YUYV), sharing chroma between pixel pairs
fn rgb_to_yuyv(rgb_image: &RgbImage) -> Vec<u8> {
    let (width, height) = rgb_image.dimensions();
    let mut yuyv = Vec::with_capacity((width * height * 2) as usize);

    for y in 0..height {
        for x in (0..width).step_by(2) {
            let pixel1 = rgb_image.get_pixel(x, y);
            let pixel2 = if x + 1 < width {
                rgb_image.get_pixel(x + 1, y)
            } else {
                pixel1
            };

            let (y1, u1, v1) = rgb_to_yuv(pixel1[0], pixel1[1], pixel1[2]);
            let (y2, u2, v2) = rgb_to_yuv(pixel2[0], pixel2[1], pixel2[2]);

            let u = ((u1 as u16 + u2 as u16) / 2) as u8;
            let v = ((v1 as u16 + v2 as u16) / 2) as u8;

            yuyv.extend_from_slice(&[y1, u, y2, v]);
        }
    }

    yuyv
}

/// BT.601 RGB to YUV
fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = r as f32;
    let g = g as f32;
    let b = b as f32;

    let y = (0.299 * r + 0.587 * g + 0.114 * b).clamp(0.0, 255.0) as u8;
    let u = ((-0.147 * r - 0.289 * g + 0.436 * b) + 128.0).clamp(0.0, 255.0) as u8;
    let v = ((0.615 * r - 0.515 * g - 0.100 * b) + 128.0).clamp(0.0, 255.0) as u8;

    (y, u, v)
}

impl FrameSink for V4L2Output {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let rgb = frame.to_rgb_image();
        let rgb = if rgb.dimensions() != (self.width, self.height) {
            imageops::resize(&rgb, self.width, self.height, imageops::FilterType::Triangle)
        } else {
            rgb
        };

        self.file
            .write_all(&rgb_to_yuyv(&rgb))
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray_has_neutral_chroma() {
        let (y, u, v) = rgb_to_yuv(128, 128, 128);
        assert!((127..=128).contains(&y));
        assert!((127..=129).contains(&u));
        assert!((127..=129).contains(&v));
    }

    #[test]
    fn yuyv_is_two_bytes_per_pixel() {
        let image = RgbImage::new(3, 2);
        assert_eq!(rgb_to_yuyv(&image).len(), 2 * 4 * 2);
    }
}
