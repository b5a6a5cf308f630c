use super::{FrameBuffer, OutputBuffer, PixelFormat};
use crate::error::FrameError;
use crate::segmentation::{ConfidenceMap, EngineImage};
use image::{imageops, ImageBuffer, Luma};

/// What the output image carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputMode {
    /// Grayscale matte only
    #[default]
    #[value(name = "mask")]
    MaskOnly,
    /// Input frame with the background faded out by the matte
    #[value(name = "remove-background")]
    BackgroundRemoved,
}

/// Output pixel format the pipeline declares for a given input
pub fn output_format_for(mode: OutputMode, input: PixelFormat) -> PixelFormat {
    match (mode, input) {
        (OutputMode::MaskOnly, _) => PixelFormat::Mono8,
        (OutputMode::BackgroundRemoved, PixelFormat::Bgra8) => PixelFormat::Bgra8,
        (OutputMode::BackgroundRemoved, _) => PixelFormat::Rgba8,
    }
}

/// Convert a host frame into packed RGB for the engine
pub fn to_engine_image(frame: &FrameBuffer<'_>) -> Result<EngineImage, FrameError> {
    let info = frame.info();
    if info.format == PixelFormat::Mono8 {
        return Err(FrameError::unsupported(
            info.format,
            "single-channel frames carry no colour for segmentation",
        ));
    }

    if info.format == PixelFormat::Rgb8 {
        if let Some(image) = frame
            .packed_data()
            .and_then(|bytes| EngineImage::from_raw(info.width, info.height, bytes.to_vec()))
        {
            return Ok(image);
        }
    }

    let mut image = EngineImage::new(info.width, info.height);
    for y in 0..info.height {
        let row = frame.row(y);
        for (x, pixel) in (0..info.width).zip(row.chunks_exact(info.format.bytes_per_pixel())) {
            image.put_pixel(x, y, image::Rgb(rgb_of(info.format, pixel)));
        }
    }
    Ok(image)
}

fn rgb_of(format: PixelFormat, pixel: &[u8]) -> [u8; 3] {
    match format {
        PixelFormat::Rgb8 | PixelFormat::Rgba8 => [pixel[0], pixel[1], pixel[2]],
        PixelFormat::Bgra8 => [pixel[2], pixel[1], pixel[0]],
        PixelFormat::Mono8 => [pixel[0]; 3],
    }
}

/// Write the matte (or the matted frame) into `target`
///
/// All checks happen before the first byte is written, so on error the
/// target is untouched.
pub fn apply_mask(
    map: &ConfidenceMap,
    original: &FrameBuffer<'_>,
    target: &mut OutputBuffer<'_>,
    mode: OutputMode,
) -> Result<(), FrameError> {
    let input = original.info();
    let output = target.info();

    if input.dimensions() != output.dimensions() {
        return Err(FrameError::DimensionMismatch {
            input: input.dimensions(),
            output: output.dimensions(),
        });
    }
    if mode == OutputMode::BackgroundRemoved {
        if output.format == PixelFormat::Mono8 {
            return Err(FrameError::unsupported(
                output.format,
                "background removal needs a colour target",
            ));
        }
        if input.format == PixelFormat::Mono8 {
            return Err(FrameError::unsupported(
                input.format,
                "background removal needs a colour source",
            ));
        }
    }

    let _span = tracing::debug_span!("postprocess").entered();
    let confidence = resample(map, output.width, output.height);
    let out_bpp = output.format.bytes_per_pixel();
    let in_bpp = input.format.bytes_per_pixel();

    for y in 0..output.height {
        let source = original.row(y);
        let weights = &confidence[y as usize * output.width as usize..][..output.width as usize];
        let row = target.row_mut(y);

        for ((dst, src), &c) in row
            .chunks_exact_mut(out_bpp)
            .zip(source.chunks_exact(in_bpp))
            .zip(weights)
        {
            match mode {
                OutputMode::MaskOnly => write_mask(output.format, dst, encode(c)),
                OutputMode::BackgroundRemoved => {
                    write_matted(output.format, dst, rgb_of(input.format, src), c)
                }
            }
        }
    }

    Ok(())
}

fn write_mask(format: PixelFormat, dst: &mut [u8], value: u8) {
    match format {
        PixelFormat::Mono8 => dst[0] = value,
        PixelFormat::Rgb8 => dst.copy_from_slice(&[value; 3]),
        PixelFormat::Rgba8 | PixelFormat::Bgra8 => dst.copy_from_slice(&[value, value, value, 255]),
    }
}

/// Premultiplied colour, alpha = confidence where the target has alpha
fn write_matted(format: PixelFormat, dst: &mut [u8], [r, g, b]: [u8; 3], c: f32) {
    let scale = |v: u8| (v as f32 * c).round() as u8;
    match format {
        PixelFormat::Rgb8 => dst.copy_from_slice(&[scale(r), scale(g), scale(b)]),
        PixelFormat::Rgba8 => dst.copy_from_slice(&[scale(r), scale(g), scale(b), encode(c)]),
        PixelFormat::Bgra8 => dst.copy_from_slice(&[scale(b), scale(g), scale(r), encode(c)]),
        PixelFormat::Mono8 => {}
    }
}

fn encode(c: f32) -> u8 {
    (c * 255.0).round() as u8
}

/// NaN maps to background, everything else is clamped into [0, 1]
fn sanitize(c: f32) -> f32 {
    if c.is_nan() {
        0.0
    } else {
        c.clamp(0.0, 1.0)
    }
}

/// Bilinear resample of the map to `width` x `height`, clamped to [0, 1]
fn resample(map: &ConfidenceMap, width: u32, height: u32) -> Vec<f32> {
    let (map_width, map_height) = map.dimensions();
    let values: Vec<f32> = map.values().iter().copied().map(sanitize).collect();

    if (map_width, map_height) == (width, height) {
        return values;
    }

    let Some(matte) = ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(map_width, map_height, values)
    else {
        // ConfidenceMap guarantees the length; treat anything else as background
        return vec![0.0; width as usize * height as usize];
    };

    imageops::resize(&matte, width, height, imageops::FilterType::Triangle)
        .into_raw()
        .into_iter()
        .map(sanitize)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, FrameInfo};

    fn map(width: u32, height: u32, values: &[f32]) -> ConfidenceMap {
        ConfidenceMap::new(width, height, values.to_vec()).unwrap()
    }

    #[test]
    fn mask_values_stay_in_range() {
        let confidence = map(2, 2, &[0.0, 0.5, 1.0, 1.7]);
        let input = Frame::new(2, 2, PixelFormat::Rgb8);
        let mut output = Frame::new(2, 2, PixelFormat::Mono8);

        apply_mask(&confidence, &input.as_input(), &mut output.as_output(), OutputMode::MaskOnly)
            .unwrap();
        assert_eq!(output.data(), &[0, 128, 255, 255]);
    }

    #[test]
    fn nan_is_background() {
        let confidence = map(1, 1, &[f32::NAN]);
        let input = Frame::new(1, 1, PixelFormat::Rgb8);
        let mut output = Frame::new(1, 1, PixelFormat::Rgba8);

        apply_mask(&confidence, &input.as_input(), &mut output.as_output(), OutputMode::MaskOnly)
            .unwrap();
        assert_eq!(output.data(), &[0, 0, 0, 255]);
    }

    #[test]
    fn background_removal_premultiplies() {
        let confidence = map(2, 1, &[1.0, 0.5]);
        let input =
            Frame::from_raw(FrameInfo::new(2, 1, PixelFormat::Rgb8), vec![200, 100, 50, 200, 100, 50])
                .unwrap();
        let mut output = Frame::new(2, 1, PixelFormat::Rgba8);

        apply_mask(
            &confidence,
            &input.as_input(),
            &mut output.as_output(),
            OutputMode::BackgroundRemoved,
        )
        .unwrap();
        assert_eq!(output.data(), &[200, 100, 50, 255, 100, 50, 25, 128]);
    }

    #[test]
    fn bgra_round_trips_channel_order() {
        let confidence = map(1, 1, &[1.0]);
        let input =
            Frame::from_raw(FrameInfo::new(1, 1, PixelFormat::Bgra8), vec![1, 2, 3, 4]).unwrap();
        let mut output = Frame::new(1, 1, PixelFormat::Bgra8);

        apply_mask(
            &confidence,
            &input.as_input(),
            &mut output.as_output(),
            OutputMode::BackgroundRemoved,
        )
        .unwrap();
        assert_eq!(output.data(), &[1, 2, 3, 255]);
    }

    #[test]
    fn upsamples_low_resolution_maps() {
        let confidence = map(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let input = Frame::new(8, 6, PixelFormat::Rgb8);
        let mut output = Frame::new(8, 6, PixelFormat::Mono8);

        apply_mask(&confidence, &input.as_input(), &mut output.as_output(), OutputMode::MaskOnly)
            .unwrap();
        assert!(output.data().iter().all(|&v| v == 255));
    }

    #[test]
    fn resampling_is_deterministic() {
        let confidence = map(3, 2, &[0.1, 0.9, 0.3, 0.0, 1.0, 0.6]);
        let first = resample(&confidence, 7, 5);
        let second = resample(&confidence, 7, 5);
        assert_eq!(first, second);
        assert!(first.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn mismatched_output_is_untouched() {
        let confidence = map(1, 1, &[1.0]);
        let input = Frame::new(2, 2, PixelFormat::Rgb8);
        let mut output = Frame::from_raw(FrameInfo::new(1, 1, PixelFormat::Mono8), vec![42]).unwrap();

        let err = apply_mask(&confidence, &input.as_input(), &mut output.as_output(), OutputMode::MaskOnly)
            .unwrap_err();
        assert!(matches!(err, FrameError::DimensionMismatch { .. }));
        assert_eq!(output.data(), &[42]);
    }

    #[test]
    fn mono_target_cannot_hold_background_removal() {
        let confidence = map(1, 1, &[1.0]);
        let input = Frame::new(1, 1, PixelFormat::Rgb8);
        let mut output = Frame::new(1, 1, PixelFormat::Mono8);

        let err = apply_mask(
            &confidence,
            &input.as_input(),
            &mut output.as_output(),
            OutputMode::BackgroundRemoved,
        )
        .unwrap_err();
        assert!(matches!(err, FrameError::FormatUnsupported { .. }));
    }

    #[test]
    fn adapts_supported_formats() {
        let bgra = Frame::from_raw(FrameInfo::new(1, 1, PixelFormat::Bgra8), vec![1, 2, 3, 4]).unwrap();
        let image = to_engine_image(&bgra.as_input()).unwrap();
        assert_eq!(image.get_pixel(0, 0), &image::Rgb([3, 2, 1]));

        let rgb = Frame::from_raw(FrameInfo::new(2, 1, PixelFormat::Rgb8), vec![1, 2, 3, 4, 5, 6]).unwrap();
        let image = to_engine_image(&rgb.as_input()).unwrap();
        assert_eq!(image.into_raw(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn adapts_padded_rgb() {
        let info = FrameInfo::new(1, 2, PixelFormat::Rgb8);
        let data = [1, 2, 3, 0, 4, 5, 6];
        let frame = FrameBuffer::with_stride(info, 4, &data).unwrap();
        let image = to_engine_image(&frame).unwrap();
        assert_eq!(image.into_raw(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn mono_input_is_unsupported() {
        let mono = Frame::new(2, 2, PixelFormat::Mono8);
        let err = to_engine_image(&mono.as_input()).unwrap_err();
        assert!(matches!(
            err,
            FrameError::FormatUnsupported {
                format: PixelFormat::Mono8,
                ..
            }
        ));
    }

    #[test]
    fn declared_output_formats() {
        assert_eq!(output_format_for(OutputMode::MaskOnly, PixelFormat::Bgra8), PixelFormat::Mono8);
        assert_eq!(
            output_format_for(OutputMode::BackgroundRemoved, PixelFormat::Bgra8),
            PixelFormat::Bgra8
        );
        assert_eq!(
            output_format_for(OutputMode::BackgroundRemoved, PixelFormat::Rgb8),
            PixelFormat::Rgba8
        );
    }
}
