//! Frame loop: plot updates, composition and encoding, strictly in order.

use std::time::Instant;

use crossbeam_channel::{bounded, Sender};
use serde::Serialize;
use syncplot_common::{SyncplotError, SyncplotResult};

use crate::canvas::{BitmapSurface, DrawingSurface};
use crate::compositor::LayoutPlan;
use crate::graph::GraphRenderer;
use crate::media::{Frame, FrameSink, FrameSource};

/// Progress callback for rendering.
pub type ProgressCallback = Box<dyn Fn(RenderProgress) + Send>;

/// Render progress report.
#[derive(Debug, Clone, Serialize)]
pub struct RenderProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Frames written so far.
    pub frames_rendered: u64,

    /// Frames the video source announced.
    pub total_frames: u64,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,

    pub stage: RenderStage,
}

/// Stages of a render run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RenderStage {
    Preparing,
    Synchronizing,
    Rendering,
    Finalizing,
    Complete,
    Failed,
}

impl RenderProgress {
    pub fn stage(stage: RenderStage, frames_rendered: u64, total_frames: u64) -> Self {
        let progress = match stage {
            RenderStage::Complete => 1.0,
            _ if total_frames == 0 => 0.0,
            _ => (frames_rendered as f64 / total_frames as f64).clamp(0.0, 1.0),
        };
        Self {
            progress,
            frames_rendered,
            total_frames,
            eta_secs: 0.0,
            stage,
        }
    }
}

fn progress_report(frames_rendered: u64, total_frames: u64, elapsed_secs: f64) -> RenderProgress {
    let mut report = RenderProgress::stage(RenderStage::Rendering, frames_rendered, total_frames);
    report.eta_secs = if report.progress > 0.0 {
        (elapsed_secs / report.progress) - elapsed_secs
    } else {
        0.0
    }
    .max(0.0);
    report
}

/// Drives one render run over a fixed [`LayoutPlan`].
pub struct PipelineDriver {
    plan: LayoutPlan,
    parallel_ingestion: bool,
    progress: Option<ProgressCallback>,
}

impl PipelineDriver {
    pub fn new(plan: LayoutPlan) -> Self {
        Self {
            plan,
            parallel_ingestion: false,
            progress: None,
        }
    }

    /// Decode the next frame on a second thread while the current one is composed.
    pub fn with_parallel_ingestion(mut self, enabled: bool) -> Self {
        self.parallel_ingestion = enabled;
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn plan(&self) -> &LayoutPlan {
        &self.plan
    }

    fn report(&self, progress: RenderProgress) {
        if let Some(cb) = &self.progress {
            cb(progress);
        }
    }

    /// Render every frame of `source` into `sink`.
    ///
    /// The sink is finished on success and aborted on any error. Returns the
    /// number of frames written.
    pub fn run(
        &self,
        source: &mut dyn FrameSource,
        renderers: &mut [GraphRenderer],
        sink: &mut dyn FrameSink,
    ) -> SyncplotResult<u64> {
        let total_frames = source.frame_count();
        let frames = match self.render_frames(source, renderers, sink) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::error!(error = %e, "Render failed, aborting output");
                sink.abort();
                self.report(RenderProgress::stage(RenderStage::Failed, 0, total_frames));
                return Err(e);
            }
        };

        self.report(RenderProgress::stage(RenderStage::Finalizing, frames, total_frames));
        if let Err(e) = sink.finish() {
            sink.abort();
            self.report(RenderProgress::stage(RenderStage::Failed, frames, total_frames));
            return Err(e);
        }
        if frames != total_frames {
            tracing::warn!(
                frames,
                expected = total_frames,
                "Video source ended at a different frame count than announced"
            );
        }
        tracing::info!(frames, "Render complete");
        self.report(RenderProgress::stage(RenderStage::Complete, frames, total_frames));
        Ok(frames)
    }

    fn render_frames(
        &self,
        source: &mut dyn FrameSource,
        renderers: &mut [GraphRenderer],
        sink: &mut dyn FrameSink,
    ) -> SyncplotResult<u64> {
        let plan = &self.plan;
        if source.dimensions() != plan.video {
            return Err(SyncplotError::render(format!(
                "video is {}, layout was planned for {}",
                source.dimensions(),
                plan.video
            )));
        }
        if sink.dimensions() != plan.output {
            return Err(SyncplotError::render(format!(
                "sink expects {}, layout produces {}",
                sink.dimensions(),
                plan.output
            )));
        }
        let axes: usize = renderers.iter().map(GraphRenderer::axis_count).sum();
        if axes > plan.slot_count() {
            return Err(SyncplotError::config(format!(
                "{axes} graph axes do not fit a {}x{} grid",
                plan.rows, plan.columns
            )));
        }

        let mut surface = BitmapSurface::new(plan.plot, plan.rows, plan.columns)?;
        let mut next_slot = 0;
        for renderer in renderers.iter_mut() {
            let slots = next_slot..next_slot + renderer.axis_count();
            next_slot = slots.end;
            renderer.bind_axes(&mut surface, slots)?;
        }

        source.rewind()?;
        let mut frame_loop = FrameLoop {
            driver: self,
            renderers,
            surface: &mut surface,
            sink,
            output: plan.blank_output(),
            total_frames: source.frame_count(),
            written: 0,
            started: Instant::now(),
        };
        tracing::info!(
            total_frames = frame_loop.total_frames,
            output = %plan.output,
            axes,
            parallel_ingestion = self.parallel_ingestion,
            "Rendering frames"
        );

        if self.parallel_ingestion {
            std::thread::scope(|scope| {
                let (tx, rx) = bounded(1);
                scope.spawn(move || decode_frames(source, tx));
                // Returning drops `rx`, which stops the decoder on error.
                for item in rx.iter() {
                    frame_loop.process(item?)?;
                }
                Ok::<(), SyncplotError>(())
            })?;
        } else {
            while let Some(frame) = source.next_frame()? {
                frame_loop.process(frame)?;
            }
        }
        Ok(frame_loop.written)
    }
}

/// Decoder side of parallel ingestion; frames are handed over by value.
fn decode_frames(source: &mut dyn FrameSource, tx: Sender<SyncplotResult<Frame>>) {
    loop {
        let item = match source.next_frame() {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => break,
            Err(e) => Err(e),
        };
        let failed = item.is_err();
        if tx.send(item).is_err() || failed {
            break;
        }
    }
}

struct FrameLoop<'a> {
    driver: &'a PipelineDriver,
    renderers: &'a mut [GraphRenderer],
    surface: &'a mut BitmapSurface,
    sink: &'a mut dyn FrameSink,
    output: image::RgbImage,
    total_frames: u64,
    written: u64,
    started: Instant,
}

impl FrameLoop<'_> {
    fn process(&mut self, frame: Frame) -> SyncplotResult<()> {
        for renderer in self.renderers.iter_mut() {
            renderer.render_at(&mut *self.surface, frame.timestamp)?;
        }
        self.driver
            .plan
            .compose(&frame.image, self.surface.image(), &mut self.output)?;
        self.sink.write_frame(&self.output)?;
        self.written += 1;

        self.driver.report(progress_report(
            self.written,
            self.total_frames,
            self.started.elapsed().as_secs_f64(),
        ));
        Ok(())
    }
}
