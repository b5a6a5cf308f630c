use super::params::{ControlAction, ControlEvent, ControlSurface, ParameterDecl};
use super::{Effect, OutputInfo, TickStatus};
use crate::error::{FrameError, TickError};
use crate::frame::{self, FrameBuffer, FrameInfo, OutputBuffer, OutputMode};
use crate::segmentation::{InferenceEngine, QualityLevel, RequestLifecycle};

/// Log a summary every this many completed ticks
const STATS_INTERVAL: u64 = 30;

/// Per-instance settings fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineConfig {
    pub mode: OutputMode,
    pub default_quality: QualityLevel,
}

/// Snapshot of the pipeline's counters for host info panels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineDiagnostics {
    pub frame_count: u64,
    pub handle_builds: u64,
    pub failed_ticks: u64,
    pub active_quality: Option<QualityLevel>,
    pub has_handle: bool,
}

/// Per-frame segmentation orchestrator
///
/// Each tick reads the selected quality, makes sure a matching inference
/// request exists, runs the engine on the adapted frame and writes the
/// result into the host's output buffer. A failed tick writes nothing.
pub struct SegmentationPipeline<E: InferenceEngine> {
    engine: E,
    config: PipelineConfig,
    controls: ControlSurface,
    requests: RequestLifecycle<E::Request>,
    frame_count: u64,
    failed_ticks: u64,
}

impl<E: InferenceEngine> SegmentationPipeline<E> {
    pub fn new(engine: E, config: PipelineConfig) -> Self {
        tracing::info!(
            "Segmentation pipeline created: mode={:?}, quality={}",
            config.mode,
            config.default_quality
        );

        Self {
            engine,
            config,
            controls: ControlSurface::new(config.default_quality),
            requests: RequestLifecycle::new(),
            frame_count: 0,
            failed_ticks: 0,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> PipelineConfig {
        self.config
    }

    pub fn quality(&self) -> QualityLevel {
        self.controls.quality()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn diagnostics(&self) -> PipelineDiagnostics {
        PipelineDiagnostics {
            frame_count: self.frame_count,
            handle_builds: self.requests.builds(),
            failed_ticks: self.failed_ticks,
            active_quality: self.requests.active_level(),
            has_handle: self.requests.has_handle(),
        }
    }

    /// Drop the inference request now; the next tick rebuilds it
    ///
    /// The frame counter is left alone.
    pub fn reset(&mut self) {
        if !self.requests.invalidate() {
            tracing::debug!("Reset requested with no live inference request");
        }
    }

    /// Run one tick, returning the frame counter on success
    pub fn try_execute(
        &mut self,
        input: &FrameBuffer<'_>,
        output: &mut OutputBuffer<'_>,
    ) -> Result<u64, TickError> {
        let _span = tracing::debug_span!("tick", frame = self.frame_count + 1).entered();

        let quality = self.controls.quality();
        let request = self.requests.ensure_handle(&self.engine, quality)?;

        let image = frame::to_engine_image(input)?;
        if input.info().dimensions() != output.info().dimensions() {
            return Err(FrameError::DimensionMismatch {
                input: input.info().dimensions(),
                output: output.info().dimensions(),
            }
            .into());
        }

        let confidence = self.engine.infer(request, &image)?;
        frame::apply_mask(&confidence, input, output, self.config.mode)?;

        self.frame_count += 1;
        if self.frame_count % STATS_INTERVAL == 0 {
            tracing::debug!(
                "Frame {}: quality={}, request builds={}, failed ticks={}",
                self.frame_count,
                quality,
                self.requests.builds(),
                self.failed_ticks
            );
        }

        Ok(self.frame_count)
    }
}

impl<E: InferenceEngine> Effect for SegmentationPipeline<E> {
    fn describe_output(&mut self, input: FrameInfo) -> OutputInfo {
        OutputInfo {
            width: input.width,
            height: input.height,
            format: frame::output_format_for(self.config.mode, input.format),
            execute_every_tick: true,
        }
    }

    fn declare_parameters(&self) -> Vec<ParameterDecl> {
        self.controls.declare()
    }

    fn on_control_event(&mut self, event: ControlEvent) {
        match self.controls.route(&event) {
            ControlAction::Reset => self.reset(),
            ControlAction::None => {}
        }
    }

    fn execute_tick(
        &mut self,
        input: &FrameBuffer<'_>,
        output: &mut OutputBuffer<'_>,
    ) -> TickStatus {
        match self.try_execute(input, output) {
            Ok(frame) => TickStatus::Completed { frame },
            Err(e) => {
                self.failed_ticks += 1;
                tracing::warn!("Tick abandoned, output left unchanged: {}", e);
                TickStatus::Failed(e.kind())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConstructError, InferenceError, TickFailure};
    use crate::frame::{Frame, PixelFormat};
    use crate::segmentation::{ConfidenceMap, EngineImage, EngineQualityConfig};
    use std::cell::Cell;

    /// Engine returning a constant matte at half resolution
    #[derive(Default)]
    struct ConstantEngine {
        built: Cell<u32>,
        fail_build: Cell<bool>,
    }

    impl InferenceEngine for ConstantEngine {
        type Request = u32;

        fn build_request(&self, _config: &EngineQualityConfig) -> Result<u32, ConstructError> {
            if self.fail_build.get() {
                return Err(ConstructError::Unavailable("no device".into()));
            }
            self.built.set(self.built.get() + 1);
            Ok(self.built.get())
        }

        fn infer(&self, _request: &mut u32, image: &EngineImage) -> Result<ConfidenceMap, InferenceError> {
            let (w, h) = ((image.width() / 2).max(1), (image.height() / 2).max(1));
            ConfidenceMap::new(w, h, vec![1.0; (w * h) as usize])
        }
    }

    fn pipeline(mode: OutputMode) -> SegmentationPipeline<ConstantEngine> {
        SegmentationPipeline::new(
            ConstantEngine::default(),
            PipelineConfig {
                mode,
                default_quality: QualityLevel::Accurate,
            },
        )
    }

    #[test]
    fn describes_output_from_input() {
        let mut mask = pipeline(OutputMode::MaskOnly);
        let info = mask.describe_output(FrameInfo::new(640, 480, PixelFormat::Bgra8));
        assert_eq!((info.width, info.height), (640, 480));
        assert_eq!(info.format, PixelFormat::Mono8);
        assert!(info.execute_every_tick);

        let mut remover = pipeline(OutputMode::BackgroundRemoved);
        let info = remover.describe_output(FrameInfo::new(64, 48, PixelFormat::Rgb8));
        assert_eq!(info.format, PixelFormat::Rgba8);
    }

    #[test]
    fn successful_tick_writes_mask() {
        let mut pipeline = pipeline(OutputMode::MaskOnly);
        let input = Frame::new(4, 4, PixelFormat::Rgb8);
        let mut output = Frame::new(4, 4, PixelFormat::Mono8);

        let status = pipeline.execute_tick(&input.as_input(), &mut output.as_output());
        assert_eq!(status, TickStatus::Completed { frame: 1 });
        assert!(output.data().iter().all(|&v| v == 255));
    }

    #[test]
    fn construct_failure_is_retried_next_tick() {
        let mut pipeline = pipeline(OutputMode::MaskOnly);
        let input = Frame::new(2, 2, PixelFormat::Rgb8);
        let mut output = Frame::new(2, 2, PixelFormat::Mono8);

        pipeline.engine().fail_build.set(true);
        let status = pipeline.execute_tick(&input.as_input(), &mut output.as_output());
        assert_eq!(status, TickStatus::Failed(TickFailure::Construct));
        assert!(!pipeline.diagnostics().has_handle);
        assert_eq!(output.data(), &[0, 0, 0, 0]);

        pipeline.engine().fail_build.set(false);
        let status = pipeline.execute_tick(&input.as_input(), &mut output.as_output());
        assert_eq!(status, TickStatus::Completed { frame: 1 });
        assert_eq!(pipeline.diagnostics().failed_ticks, 1);
    }

    #[test]
    fn unsupported_input_keeps_handle() {
        let mut pipeline = pipeline(OutputMode::MaskOnly);
        let good = Frame::new(2, 2, PixelFormat::Rgb8);
        let mono = Frame::new(2, 2, PixelFormat::Mono8);
        let mut output = Frame::new(2, 2, PixelFormat::Mono8);

        pipeline.execute_tick(&good.as_input(), &mut output.as_output());
        let status = pipeline.execute_tick(&mono.as_input(), &mut output.as_output());
        assert_eq!(status, TickStatus::Failed(TickFailure::FormatUnsupported));
        assert!(pipeline.diagnostics().has_handle);
        assert_eq!(pipeline.diagnostics().handle_builds, 1);
        assert_eq!(pipeline.frame_count(), 1);
    }

    #[test]
    fn reset_does_not_touch_frame_counter() {
        let mut pipeline = pipeline(OutputMode::MaskOnly);
        let input = Frame::new(2, 2, PixelFormat::Rgb8);
        let mut output = Frame::new(2, 2, PixelFormat::Mono8);

        pipeline.execute_tick(&input.as_input(), &mut output.as_output());
        pipeline.on_control_event(ControlEvent::reset());
        assert!(!pipeline.diagnostics().has_handle);
        assert_eq!(pipeline.frame_count(), 1);
    }

    #[test]
    fn mismatched_output_fails_the_tick() {
        let mut pipeline = pipeline(OutputMode::MaskOnly);
        let input = Frame::new(4, 4, PixelFormat::Rgb8);
        let mut output = Frame::new(2, 2, PixelFormat::Mono8);

        let err = pipeline
            .try_execute(&input.as_input(), &mut output.as_output())
            .unwrap_err();
        assert!(matches!(err, TickError::Frame(FrameError::DimensionMismatch { .. })));
        assert_eq!(pipeline.frame_count(), 0);
    }
}
