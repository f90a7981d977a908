//! Frame sources and sinks.
//!
//! Sources yield video frames in increasing timestamp order and can be
//! restarted from the first frame. Sinks accept fixed-size RGB frames in
//! write order and are closed exactly once, either by `finish` (the output
//! is complete) or `abort` (the output must not be used).

use image::RgbImage;
use syncplot_common::{SyncplotError, SyncplotResult, Timestamp};
use syncplot_data_model::Dimensions;

/// A decoded video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position on the video clock; the first frame is at zero.
    pub timestamp: Timestamp,
    pub image: RgbImage,
}

/// Lazy, finite, restartable sequence of video frames.
pub trait FrameSource: Send {
    /// Frame size, known before iteration starts.
    fn dimensions(&self) -> Dimensions;

    /// Total number of frames.
    fn frame_count(&self) -> u64;

    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> SyncplotResult<Option<Frame>>;

    /// Restart from the first frame.
    fn rewind(&mut self) -> SyncplotResult<()>;
}

/// Ordered consumer of composed output frames.
pub trait FrameSink {
    /// Frame size fixed at construction.
    fn dimensions(&self) -> Dimensions;

    fn write_frame(&mut self, frame: &RgbImage) -> SyncplotResult<()>;

    /// Flush and close; the output is complete afterwards.
    fn finish(&mut self) -> SyncplotResult<()>;

    /// Close after a failure, discarding incomplete output.
    fn abort(&mut self);
}

pub(crate) fn check_frame_size(expected: Dimensions, frame: &RgbImage) -> SyncplotResult<()> {
    let actual = Dimensions::from(frame.dimensions());
    if actual != expected {
        return Err(SyncplotError::render(format!(
            "frame is {actual}, sink expects {expected}"
        )));
    }
    Ok(())
}

/// In-memory frame source at a fixed frame rate.
#[derive(Debug, Clone)]
pub struct MemoryFrameSource {
    dimensions: Dimensions,
    frames: Vec<RgbImage>,
    fps: f64,
    position: usize,
}

impl MemoryFrameSource {
    pub fn new(frames: Vec<RgbImage>, fps: f64) -> SyncplotResult<Self> {
        let first = frames
            .first()
            .ok_or_else(|| SyncplotError::data("frame source needs at least one frame"))?;
        let dimensions = Dimensions::from(first.dimensions());
        if frames.iter().any(|f| Dimensions::from(f.dimensions()) != dimensions) {
            return Err(SyncplotError::data("all frames must share one size"));
        }
        if !(fps > 0.0) {
            return Err(SyncplotError::data(format!("invalid frame rate {fps}")));
        }
        Ok(Self {
            dimensions,
            frames,
            fps,
            position: 0,
        })
    }

    /// `count` frames of one solid color.
    pub fn solid(dimensions: Dimensions, count: usize, fps: f64, rgb: [u8; 3]) -> SyncplotResult<Self> {
        let frame = RgbImage::from_pixel(dimensions.width, dimensions.height, image::Rgb(rgb));
        Self::new(vec![frame; count], fps)
    }
}

impl FrameSource for MemoryFrameSource {
    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    fn frame_count(&self) -> u64 {
        self.frames.len() as u64
    }

    fn next_frame(&mut self) -> SyncplotResult<Option<Frame>> {
        let Some(image) = self.frames.get(self.position) else {
            return Ok(None);
        };
        let frame = Frame {
            timestamp: Timestamp::from_frame_index(self.position as u64, self.fps),
            image: image.clone(),
        };
        self.position += 1;
        Ok(Some(frame))
    }

    fn rewind(&mut self) -> SyncplotResult<()> {
        self.position = 0;
        Ok(())
    }
}

/// Sink that keeps every written frame.
#[derive(Debug, Clone)]
pub struct MemoryFrameSink {
    dimensions: Dimensions,
    pub frames: Vec<RgbImage>,
    pub finished: bool,
    pub aborted: bool,
}

impl MemoryFrameSink {
    pub fn new(dimensions: Dimensions) -> Self {
        Self {
            dimensions,
            frames: Vec::new(),
            finished: false,
            aborted: false,
        }
    }
}

impl FrameSink for MemoryFrameSink {
    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    fn write_frame(&mut self, frame: &RgbImage) -> SyncplotResult<()> {
        if self.finished || self.aborted {
            return Err(SyncplotError::render("sink is already closed"));
        }
        check_frame_size(self.dimensions, frame)?;
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> SyncplotResult<()> {
        self.finished = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.aborted = true;
        self.frames.clear();
    }
}
