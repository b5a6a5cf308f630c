//! Host-owned image buffers.
//!
//! The host lends the pipeline a read-only input and a writable output for
//! the duration of one tick; the lifetimes on [`FrameBuffer`] and
//! [`OutputBuffer`] keep either from outliving that call.

mod adapter;

pub use adapter::{apply_mask, output_format_for, to_engine_image, OutputMode};

use crate::error::FrameError;
use image::RgbImage;

/// Pixel layouts the host may hand over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
    Bgra8,
    Mono8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
            PixelFormat::Mono8 => 1,
        }
    }
}

/// Dimensions and layout of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl FrameInfo {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Bytes needed for `height` rows at `stride`, the last row unpadded
    fn required_len(&self, stride: usize) -> usize {
        match self.height as usize {
            0 => 0,
            rows => stride * (rows - 1) + self.row_bytes(),
        }
    }

    fn check(&self, stride: usize, len: usize) -> Result<(), FrameError> {
        let row_bytes = self.row_bytes();
        if stride < row_bytes {
            return Err(FrameError::BufferTooSmall {
                expected: row_bytes,
                actual: stride,
            });
        }

        let expected = self.required_len(stride);
        if len < expected {
            return Err(FrameError::BufferTooSmall {
                expected,
                actual: len,
            });
        }
        Ok(())
    }
}

/// Read-only view of the input frame for one tick
#[derive(Debug, Clone, Copy)]
pub struct FrameBuffer<'a> {
    info: FrameInfo,
    stride: usize,
    data: &'a [u8],
}

impl<'a> FrameBuffer<'a> {
    /// View over tightly packed rows
    pub fn new(info: FrameInfo, data: &'a [u8]) -> Result<Self, FrameError> {
        Self::with_stride(info, info.row_bytes(), data)
    }

    /// View over rows that are `stride` bytes apart
    pub fn with_stride(info: FrameInfo, stride: usize, data: &'a [u8]) -> Result<Self, FrameError> {
        info.check(stride, data.len())?;
        Ok(Self { info, stride, data })
    }

    pub fn info(&self) -> FrameInfo {
        self.info
    }

    pub fn is_packed(&self) -> bool {
        self.stride == self.info.row_bytes()
    }

    /// All pixel bytes, when rows carry no padding
    pub fn packed_data(&self) -> Option<&'a [u8]> {
        self.is_packed()
            .then(|| &self.data[..self.info.required_len(self.stride)])
    }

    /// Pixel bytes of row `y`, without padding
    pub fn row(&self, y: u32) -> &'a [u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.info.row_bytes()]
    }
}

/// Writable view of the output image for one tick
#[derive(Debug)]
pub struct OutputBuffer<'a> {
    info: FrameInfo,
    stride: usize,
    data: &'a mut [u8],
}

impl<'a> OutputBuffer<'a> {
    pub fn new(info: FrameInfo, data: &'a mut [u8]) -> Result<Self, FrameError> {
        Self::with_stride(info, info.row_bytes(), data)
    }

    pub fn with_stride(
        info: FrameInfo,
        stride: usize,
        data: &'a mut [u8],
    ) -> Result<Self, FrameError> {
        info.check(stride, data.len())?;
        Ok(Self { info, stride, data })
    }

    pub fn info(&self) -> FrameInfo {
        self.info
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let len = self.info.row_bytes();
        &mut self.data[start..start + len]
    }
}

/// Owned, tightly packed image used by hosts and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    info: FrameInfo,
    data: Vec<u8>,
}

impl Frame {
    /// Zero-filled frame
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let info = FrameInfo::new(width, height, format);
        let data = vec![0; info.required_len(info.row_bytes())];
        Self { info, data }
    }

    pub fn from_raw(info: FrameInfo, data: Vec<u8>) -> Result<Self, FrameError> {
        info.check(info.row_bytes(), data.len())?;
        Ok(Self { info, data })
    }

    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            info: FrameInfo::new(width, height, PixelFormat::Rgb8),
            data: image.into_raw(),
        }
    }

    pub fn info(&self) -> FrameInfo {
        self.info
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn as_input(&self) -> FrameBuffer<'_> {
        FrameBuffer {
            info: self.info,
            stride: self.info.row_bytes(),
            data: &self.data,
        }
    }

    pub fn as_output(&mut self) -> OutputBuffer<'_> {
        OutputBuffer {
            info: self.info,
            stride: self.info.row_bytes(),
            data: &mut self.data,
        }
    }

    /// Flatten onto black for sinks that only take RGB
    ///
    /// Colour channels of RGBA/BGRA frames are taken as premultiplied.
    pub fn to_rgb_image(&self) -> RgbImage {
        let bpp = self.info.format.bytes_per_pixel();
        RgbImage::from_fn(self.info.width, self.info.height, |x, y| {
            let i = (y as usize * self.info.width as usize + x as usize) * bpp;
            let p = &self.data[i..i + bpp];
            match self.info.format {
                PixelFormat::Rgb8 | PixelFormat::Rgba8 => image::Rgb([p[0], p[1], p[2]]),
                PixelFormat::Bgra8 => image::Rgb([p[2], p[1], p[0]]),
                PixelFormat::Mono8 => image::Rgb([p[0], p[0], p[0]]),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_buffers() {
        let info = FrameInfo::new(4, 2, PixelFormat::Rgba8);
        assert!(FrameBuffer::new(info, &[0; 32]).is_ok());
        assert_eq!(
            FrameBuffer::new(info, &[0; 31]).unwrap_err(),
            FrameError::BufferTooSmall {
                expected: 32,
                actual: 31
            }
        );
        assert!(FrameBuffer::with_stride(info, 8, &[0; 64]).is_err());
    }

    #[test]
    fn padded_rows_skip_padding() {
        let info = FrameInfo::new(2, 2, PixelFormat::Mono8);
        let data = [1, 2, 99, 99, 3, 4];
        let frame = FrameBuffer::with_stride(info, 4, &data).unwrap();
        assert!(!frame.is_packed());
        assert_eq!(frame.row(0), &[1, 2]);
        assert_eq!(frame.row(1), &[3, 4]);
    }

    #[test]
    fn flattens_to_rgb() {
        let info = FrameInfo::new(1, 1, PixelFormat::Bgra8);
        let frame = Frame::from_raw(info, vec![10, 20, 30, 40]).unwrap();
        assert_eq!(frame.to_rgb_image().get_pixel(0, 0), &image::Rgb([30, 20, 10]));

        let mono = Frame::from_raw(FrameInfo::new(1, 1, PixelFormat::Mono8), vec![7]).unwrap();
        assert_eq!(mono.to_rgb_image().get_pixel(0, 0), &image::Rgb([7, 7, 7]));
    }
}
