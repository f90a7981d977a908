//! SyncPlot Render Engine
//!
//! Offline rendering pipeline that draws synchronized sensor streams as
//! plots with a moving time indicator and composites them next to the
//! source video.
//!
//! # Pipeline Architecture
//!
//! ```text
//! video.mp4 ──── ffmpeg decode (rgb24) ──────────┐
//!                                                │
//! camera IMU / skeleton ──┐                      │
//!                         ├── cross-correlate    │
//! sensor CSVs ────────────┘        │             │
//!                                  ▼             │
//!                      GraphRenderer (per stream)│
//!                                  │             │
//!                                  ▼             ▼
//!                          plot grid ──── Compositor
//!                                                │
//!                                                ▼
//!                                   ffmpeg encode (fixed fps)
//!                                                │
//!                                                ▼
//!                                           output.avi
//! ```

pub mod canvas;
pub mod compositor;
pub mod export;
pub mod ffmpeg;
pub mod graph;
pub mod media;
pub mod pipeline;

pub use canvas::{BitmapSurface, DrawingSurface, StaticPlot};
pub use compositor::{LayoutPlan, PLOT_ROW_HEIGHT};
pub use export::*;
pub use ffmpeg::{FfmpegFrameSink, FfmpegFrameSource};
pub use graph::{GraphRenderer, RendererState};
pub use media::{Frame, FrameSink, FrameSource, MemoryFrameSink, MemoryFrameSource};
pub use pipeline::{PipelineDriver, ProgressCallback, RenderProgress, RenderStage};
