mod capture;
mod output;

use anyhow::{Context, Result};
use camola_matte::effect::QUALITY_PARAM;
use camola_matte::segmentation::RvmEngine;
use camola_matte::{
    ControlEvent, Effect, Frame, FrameInfo, OutputMode, PipelineConfig, QualityLevel,
    SegmentationPipeline,
};
use capture::{FrameSource, WebcamCapture};
use clap::Parser;
use output::{FrameSink, V4L2Output};
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Capture resolution width
    #[arg(long, default_value_t = 1920)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 1080)]
    capture_height: u32,

    /// Output resolution width
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Path to the RobustVideoMatting ONNX model
    /// If not provided, runs in passthrough mode without segmentation
    #[arg(long)]
    model: Option<String>,

    /// Initial quality tier; change it at runtime with `quality <tier>` on stdin
    #[arg(long, value_enum, default_value_t = QualityLevel::Accurate)]
    quality: QualityLevel,

    /// Emit the grayscale matte or the frame with its background removed
    #[arg(long, value_enum, default_value_t = OutputMode::MaskOnly)]
    mode: OutputMode,

    /// ONNX Runtime intra-op threads per inference session
    #[arg(long, default_value_t = 4)]
    threads: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("Camola matte starting");
    tracing::info!("Capture: {}x{}", args.capture_width, args.capture_height);
    tracing::info!("Output: {}x{}", args.output_width, args.output_height);
    tracing::info!("Target FPS: {}", args.fps);

    let mut capture = WebcamCapture::new(
        args.input_device,
        args.capture_width,
        args.capture_height,
        args.fps,
    )
    .context("Failed to initialize webcam capture")?;

    let mut output = V4L2Output::new(&args.output_device, args.output_width, args.output_height)
        .context("Failed to initialize v4l2loopback output")?;

    let effect = match &args.model {
        Some(model_path) => {
            let engine = RvmEngine::new(model_path)
                .context("Failed to set up segmentation engine")?
                .with_intra_threads(args.threads);
            let config = PipelineConfig {
                mode: args.mode,
                default_quality: args.quality,
            };
            Some(SegmentationPipeline::new(engine, config))
        }
        None => {
            tracing::info!("Running in passthrough mode (no segmentation)");
            None
        }
    };

    let (capture_width, capture_height) = capture.resolution();
    let (output_width, output_height) = output.resolution();
    tracing::info!(
        "Streaming {}x{} capture to {}x{} output",
        capture_width,
        capture_height,
        output_width,
        output_height
    );

    let controls = spawn_control_reader();

    run_pipeline(&mut capture, &mut output, effect, &controls, args.fps)
}

/// Forward `reset` and `quality <tier>` lines from stdin as control events
fn spawn_control_reader() -> Receiver<ControlEvent> {
    let (sender, receiver) = mpsc::channel();

    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match parse_command(&line) {
                Some(event) => {
                    if sender.send(event).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => tracing::warn!("Unknown command {:?} (try `reset` or `quality fast`)", line),
            }
        }
    });

    receiver
}

fn parse_command(line: &str) -> Option<ControlEvent> {
    let mut words = line.split_whitespace();
    match (words.next()?, words.next(), words.next()) {
        ("reset", None, None) => Some(ControlEvent::reset()),
        ("quality", Some(value), None) => Some(ControlEvent::MenuChanged {
            name: QUALITY_PARAM.to_string(),
            value: value.to_string(),
        }),
        _ => None,
    }
}

fn run_pipeline<C, O, E>(
    capture: &mut C,
    output: &mut O,
    mut effect: Option<E>,
    controls: &Receiver<ControlEvent>,
    target_fps: u32,
) -> Result<()>
where
    C: FrameSource,
    O: FrameSink,
    E: Effect,
{
    let frame_duration = Duration::from_secs_f32(1.0 / target_fps.max(1) as f32);
    let mut frame_count = 0u64;
    let mut failed_ticks = 0u64;
    let mut total_capture_time = Duration::ZERO;
    let mut total_segment_time = Duration::ZERO;
    let mut total_output_time = Duration::ZERO;

    // Output buffer allocated from the effect's description of the current input
    let mut target: Option<(FrameInfo, Frame)> = None;

    if let Some(effect) = &effect {
        let names: Vec<_> = effect
            .declare_parameters()
            .iter()
            .map(|decl| decl.name())
            .collect();
        tracing::info!("Segmentation enabled, controls: {:?}", names);
    }
    tracing::info!("Starting main pipeline loop");
    tracing::info!("Press Ctrl+C to stop");

    loop {
        let loop_start = Instant::now();

        while let Ok(event) = controls.try_recv() {
            match effect.as_mut() {
                Some(effect) => effect.on_control_event(event),
                None => tracing::debug!("Dropping control event in passthrough mode"),
            }
        }

        let capture_start = Instant::now();
        let frame = capture
            .next_frame()
            .context("Failed to capture frame")?;
        total_capture_time += capture_start.elapsed();

        let output_frame = match effect.as_mut() {
            Some(effect) => {
                let info = frame.info();
                if target.as_ref().is_some_and(|(current, _)| *current != info) {
                    target = None;
                }
                let (_, buffer) = target.get_or_insert_with(|| {
                    let described = effect.describe_output(info);
                    tracing::info!(
                        "Input is {}x{} {:?}, allocating {:?} output",
                        info.width,
                        info.height,
                        info.format,
                        described.format
                    );
                    (
                        info,
                        Frame::new(described.width, described.height, described.format),
                    )
                });

                let segment_start = Instant::now();
                if !effect
                    .execute_tick(&frame.as_input(), &mut buffer.as_output())
                    .is_completed()
                {
                    failed_ticks += 1;
                }
                total_segment_time += segment_start.elapsed();

                &*buffer
            }
            None => &frame,
        };

        let output_start = Instant::now();
        output
            .write_frame(output_frame)
            .context("Failed to write frame")?;
        total_output_time += output_start.elapsed();

        frame_count += 1;

        // Log stats every 30 frames
        if frame_count % 30 == 0 {
            let avg = |total: Duration| total.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_capture_ms = avg(total_capture_time);
            let avg_segment_ms = avg(total_segment_time);
            let avg_output_ms = avg(total_output_time);
            let total_ms = avg_capture_ms + avg_segment_ms + avg_output_ms;
            let actual_fps = 1000.0 / total_ms;

            tracing::info!(
                "Frame {}: capture={:.1}ms, segment={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}, failed={}",
                frame_count,
                avg_capture_ms,
                avg_segment_ms,
                avg_output_ms,
                total_ms,
                actual_fps,
                failed_ticks
            );
        }

        // Frame rate limiting
        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_control_commands() {
        assert_eq!(parse_command("reset"), Some(ControlEvent::reset()));
        assert_eq!(
            parse_command("  quality fast "),
            Some(ControlEvent::MenuChanged {
                name: QUALITY_PARAM.to_string(),
                value: "fast".to_string(),
            })
        );
        assert_eq!(parse_command("quality"), None);
        assert_eq!(parse_command("reset now"), None);
        assert_eq!(parse_command(""), None);
    }
}
