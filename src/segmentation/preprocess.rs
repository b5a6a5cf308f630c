use image::{imageops, RgbImage};
use ndarray::Array4;

/// Preprocessor for converting RGB images to model input tensors
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    pub fn target_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    /// Preprocess an RGB image into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Convert to float and normalize to [0, 1]
    /// 3. Transpose from HWC to NCHW format
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized;
        let source = if image.dimensions() != (self.target_width, self.target_height) {
            resized = imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Lanczos3,
            );
            &resized
        } else {
            image
        };

        let (width, height) = source.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in source.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for channel in 0..3 {
                tensor[[0, channel, y, x]] = pixel[channel] as f32 / 255.0;
            }
        }

        tensor
    }
}

/// Split a tensor into its shape and row-major data
pub fn into_shape_and_data(tensor: Array4<f32>) -> ([usize; 4], Vec<f32>) {
    let (n, c, h, w) = tensor.dim();
    let data = if tensor.is_standard_layout() {
        tensor.into_raw_vec_and_offset().0
    } else {
        tensor.iter().copied().collect()
    };
    ([n, c, h, w], data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_nchw_in_unit_range() {
        let image = RgbImage::from_fn(4, 2, |x, _| image::Rgb([255, (x * 60) as u8, 0]));
        let tensor = Preprocessor::new(4, 2).preprocess(&image);

        assert_eq!(tensor.shape(), &[1, 3, 2, 4]);
        assert_eq!(tensor[[0, 0, 1, 3]], 1.0);
        assert_eq!(tensor[[0, 1, 0, 1]], 60.0 / 255.0);
        assert_eq!(tensor[[0, 2, 0, 0]], 0.0);
    }

    #[test]
    fn resizes_to_target() {
        let image = RgbImage::new(64, 48);
        let tensor = Preprocessor::new(16, 16).preprocess(&image);
        assert_eq!(tensor.shape(), &[1, 3, 16, 16]);
    }

    #[test]
    fn flattens_row_major() {
        let mut tensor = Array4::<f32>::zeros((1, 1, 2, 2));
        tensor[[0, 0, 1, 0]] = 3.0;
        let (shape, data) = into_shape_and_data(tensor);
        assert_eq!(shape, [1, 1, 2, 2]);
        assert_eq!(data, vec![0.0, 0.0, 3.0, 0.0]);
    }
}
