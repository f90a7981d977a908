//! Render job orchestration.
//!
//! A job opens the video and its synchronization data, loads every sensor
//! stream, moves each stream onto the video clock and then drives the
//! frame pipeline into an encoder. All configuration and synchronization
//! failures surface before the first frame is written.

use std::path::PathBuf;

use serde::Serialize;
use syncplot_common::{offset_as_secs, SyncplotError, SyncplotResult, ToolsConfig};
use syncplot_data_model::{
    load_sensor, read_skeleton, read_time_series, ColumnSelection, Dimensions, JobConfig, JointSyncAxis,
    RenderConfig, SensorSync, TimeSeries, VideoConfig,
};
use syncplot_signal_core::{compute_offset_report, SyncReport};

use crate::compositor::LayoutPlan;
use crate::ffmpeg::{command_exists, FfmpegFrameSink, FfmpegFrameSource};
use crate::graph::GraphRenderer;
use crate::media::{FrameSink, FrameSource};
use crate::pipeline::{PipelineDriver, ProgressCallback, RenderProgress, RenderStage};

/// Synchronization data recorded alongside the video.
#[derive(Debug, Clone)]
pub enum SyncData {
    /// Nothing to correlate against.
    None,
    /// Camera IMU samples and the columns sensors are aligned to.
    Imu {
        series: TimeSeries,
        columns: ColumnSelection,
    },
    /// Skeleton joint positions of the first tracked body.
    Skeleton(TimeSeries),
}

impl SyncData {
    fn kind(&self) -> &'static str {
        match self {
            SyncData::None => "no",
            SyncData::Imu { .. } => "camera IMU",
            SyncData::Skeleton(_) => "skeleton",
        }
    }
}

/// An opened video with its synchronization data.
pub struct VideoInput {
    pub frames: Box<dyn FrameSource>,
    pub sync: SyncData,
}

/// Read the synchronization data of a video, moved to start at zero.
pub fn load_sync_data(config: &VideoConfig) -> SyncplotResult<SyncData> {
    match config {
        VideoConfig::Raw { .. } => Ok(SyncData::None),
        VideoConfig::Imu {
            imu_path,
            camera_imu_sync_column,
            ..
        } => {
            let mut series = read_time_series(imu_path)?;
            series.epochize();
            tracing::info!(path = %imu_path.display(), rows = series.len(), "Loaded camera IMU data");
            Ok(SyncData::Imu {
                series,
                columns: camera_imu_sync_column.clone(),
            })
        }
        VideoConfig::Kinect { skeleton_path, .. } => {
            let mut series = read_skeleton(skeleton_path)?;
            series.epochize();
            Ok(SyncData::Skeleton(series))
        }
        VideoConfig::AppCapture { .. } | VideoConfig::Openpose { .. } => Err(
            SyncplotError::unsupported(format!("video type '{}' is not supported", config.kind())),
        ),
    }
}

/// Open the video frames and synchronization data described by `config`.
pub fn open_video(config: &VideoConfig, tools: &ToolsConfig) -> SyncplotResult<VideoInput> {
    let sync = load_sync_data(config)?;
    let frames = FfmpegFrameSource::open(config.path(), tools)?;
    Ok(VideoInput {
        frames: Box::new(frames),
        sync,
    })
}

/// Load every configured sensor stream into a renderer.
pub fn load_renderers(config: &JobConfig) -> SyncplotResult<Vec<GraphRenderer>> {
    config
        .sensors
        .iter()
        .enumerate()
        .map(|(i, sensor)| {
            let name = config.sensor_name(i);
            let series = load_sensor(sensor)?;
            GraphRenderer::new(
                name,
                series,
                sensor.sync.clone(),
                sensor.graph_groups.as_deref(),
                config.render.plotting_method,
                config.render.add_magnitude,
            )
        })
        .collect()
}

/// Offset applied to one stream.
#[derive(Debug, Clone, Serialize)]
pub struct StreamOffset {
    pub stream: String,
    /// Synchronization type as written in the job file.
    pub kind: &'static str,
    pub offset_secs: f64,
    /// Cross-correlation details for computed offsets.
    #[serde(skip)]
    pub report: Option<SyncReport>,
}

fn reference_and_target(
    renderer: &GraphRenderer,
    sync: &SyncData,
) -> SyncplotResult<Option<(TimeSeries, TimeSeries, bool)>> {
    let Some(target) = renderer.sync_series()? else {
        return Ok(None);
    };
    match (renderer.sync(), sync) {
        (SensorSync::Manual { .. }, _) => Ok(None),
        (SensorSync::CameraImu { .. }, SyncData::Imu { series, columns }) => {
            Ok(Some((series.select(columns)?, target, false)))
        }
        (
            SensorSync::Joint {
                sync_joint_name,
                joint_sync_axis,
                ..
            },
            SyncData::Skeleton(skeleton),
        ) => {
            if *joint_sync_axis != JointSyncAxis::AccelerationMag {
                return Err(SyncplotError::unsupported(format!(
                    "joint sync axis {joint_sync_axis:?} is not supported, use ACCELERATION_MAG"
                )));
            }
            let joint = skeleton.select(&ColumnSelection::Substring(sync_joint_name.clone()))?;
            if joint.columns().is_empty() {
                return Err(SyncplotError::data(format!(
                    "skeleton has no columns for joint '{sync_joint_name}'"
                )));
            }
            // Joint positions are differentiated twice to match accelerations.
            Ok(Some((joint, target, true)))
        }
        (stream_sync, video_sync) => Err(SyncplotError::config(format!(
            "{} sensor cannot be synchronized against {} data",
            stream_sync.kind(),
            video_sync.kind()
        ))),
    }
}

fn synchronize_stream(renderer: &mut GraphRenderer, sync: &SyncData) -> SyncplotResult<StreamOffset> {
    let report = match reference_and_target(renderer, sync)? {
        Some((reference, target, second_derivative)) => {
            Some(compute_offset_report(&reference, &target, second_derivative)?)
        }
        None => None,
    };
    let offset = renderer.apply_offset(report.as_ref().map(|r| r.offset))?;
    Ok(StreamOffset {
        stream: renderer.name().to_string(),
        kind: renderer.sync().kind(),
        offset_secs: offset_as_secs(offset),
        report,
    })
}

/// Compute and apply the offset of every stream.
///
/// Manual streams get their configured constant; the others are
/// cross-correlated against the video's data. Failures name the stream.
pub fn synchronize(sync: &SyncData, renderers: &mut [GraphRenderer]) -> SyncplotResult<Vec<StreamOffset>> {
    renderers
        .iter_mut()
        .map(|renderer| {
            synchronize_stream(renderer, sync)
                .map_err(|e| SyncplotError::synchronization(renderer.name(), e))
        })
        .collect()
}

/// Load a job's streams and compute their offsets without rendering.
pub fn compute_offsets(config: &JobConfig) -> SyncplotResult<Vec<StreamOffset>> {
    let sync = load_sync_data(&config.video)?;
    let mut renderers = load_renderers(config)?;
    synchronize(&sync, &mut renderers)
}

/// Geometry for rendering `renderers` next to a video of `video` size.
pub fn plan_layout(
    settings: &RenderConfig,
    video: Dimensions,
    renderers: &[GraphRenderer],
) -> SyncplotResult<LayoutPlan> {
    let axes = renderers.iter().map(GraphRenderer::axis_count).sum();
    LayoutPlan::new(
        settings.stacking_direction,
        video,
        axes,
        settings.plot_column_count as usize,
    )
}

/// Render synchronized streams next to `source` into `sink`.
pub fn render_streams(
    settings: &RenderConfig,
    source: &mut dyn FrameSource,
    renderers: &mut [GraphRenderer],
    sink: &mut dyn FrameSink,
    progress: Option<ProgressCallback>,
) -> SyncplotResult<u64> {
    let plan = plan_layout(settings, source.dimensions(), renderers)?;
    PipelineDriver::new(plan)
        .with_parallel_ingestion(settings.use_parallel_image_ingestion)
        .with_progress(progress)
        .run(source, renderers, sink)
}

/// A render job ready to run.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub config: JobConfig,

    /// External binaries for decoding and encoding.
    pub tools: ToolsConfig,

    /// Overrides the job file's `target_file_path`.
    pub output_path: Option<PathBuf>,
}

impl RenderJob {
    pub fn output_path(&self) -> PathBuf {
        self.output_path
            .clone()
            .unwrap_or_else(|| self.config.render.target_file_path.clone())
    }
}

fn run_job(job: RenderJob, progress: Option<ProgressCallback>) -> SyncplotResult<PathBuf> {
    let report = |stage| {
        if let Some(cb) = &progress {
            cb(RenderProgress::stage(stage, 0, 0));
        }
    };
    report(RenderStage::Preparing);

    for binary in [&job.tools.ffmpeg, &job.tools.ffprobe] {
        if !command_exists(binary) {
            return Err(SyncplotError::unsupported(format!(
                "{} not found (expected in PATH or configured in the app config)",
                binary.display()
            )));
        }
    }
    let output_path = job.output_path();
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let VideoInput { mut frames, sync } = open_video(&job.config.video, &job.tools)?;
    let mut renderers = load_renderers(&job.config)?;

    report(RenderStage::Synchronizing);
    for offset in synchronize(&sync, &mut renderers)? {
        tracing::info!(stream = %offset.stream, kind = offset.kind, offset_secs = offset.offset_secs, "Stream synchronized");
    }

    let settings = &job.config.render;
    let plan = plan_layout(settings, frames.dimensions(), &renderers)?;
    let mut sink = FfmpegFrameSink::create(
        &output_path,
        plan.output,
        settings.output_fps,
        settings.fourcc_codec,
        &job.tools,
    )?;
    render_streams(settings, frames.as_mut(), &mut renderers, &mut sink, progress)?;
    Ok(output_path)
}

/// Render the composite video of a job.
///
/// This is the main entry point for rendering; the blocking pipeline runs
/// on tokio's blocking pool.
pub async fn render_composite(
    job: RenderJob,
    progress: Option<ProgressCallback>,
) -> SyncplotResult<PathBuf> {
    tracing::info!(
        output = %job.output_path().display(),
        video = %job.config.video.path().display(),
        sensors = job.config.sensors.len(),
        "Starting render"
    );
    tokio::task::spawn_blocking(move || run_job(job, progress))
        .await
        .map_err(|e| SyncplotError::render(format!("render task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncplot_common::Timestamp;
    use syncplot_data_model::PlottingMethod;

    fn imu_series(rate: f64, len: usize, columns: &[&str]) -> TimeSeries {
        let index = (0..len)
            .map(|i| Timestamp::from_secs_f64(i as f64 / rate))
            .collect();
        let rows: Vec<Vec<f64>> = (0..len)
            .map(|i| {
                let t = i as f64 / rate;
                vec![(1.7 * t).sin() + (0.3 * t * t).cos(), (2.3 * t).cos(), (0.9 * t).sin() * t]
            })
            .collect();
        TimeSeries::from_rows(index, columns.iter().map(|c| c.to_string()).collect(), &rows).unwrap()
    }

    fn renderer(sync: SensorSync) -> GraphRenderer {
        GraphRenderer::new(
            "wrist",
            imu_series(50.0, 300, &["ax", "ay", "az"]),
            sync,
            None,
            PlottingMethod::MovingVerticalLine,
            false,
        )
        .unwrap()
    }

    #[test]
    fn test_camera_imu_sensor_needs_imu_video() {
        let mut renderers = vec![renderer(SensorSync::CameraImu {
            sensor_sync_column: ColumnSelection::Substring("a".into()),
        })];
        let err = synchronize(&SyncData::None, &mut renderers).unwrap_err();
        assert_eq!(err.failed_stream(), Some("wrist"));
        let SyncplotError::Synchronization { source, .. } = err else {
            panic!("expected a synchronization error");
        };
        assert!(matches!(*source, SyncplotError::Config { .. }));
    }

    #[test]
    fn test_manual_sensor_ignores_video_data() {
        let mut renderers = vec![renderer(SensorSync::Manual { offset_seconds: -0.25 })];
        let sync = SyncData::Skeleton(imu_series(30.0, 90, &["HEAD_x", "HEAD_y", "HEAD_z"]));
        let offsets = synchronize(&sync, &mut renderers).unwrap();
        assert_eq!(offsets.len(), 1);
        assert_eq!(offsets[0].kind, "manually-synced");
        assert_eq!(offsets[0].offset_secs, -0.25);
        assert!(offsets[0].report.is_none());
    }

    #[test]
    fn test_identical_imu_streams_have_zero_offset() {
        let mut renderers = vec![renderer(SensorSync::CameraImu {
            sensor_sync_column: ColumnSelection::Exact(vec!["ax".into(), "ay".into(), "az".into()]),
        })];
        let sync = SyncData::Imu {
            series: imu_series(50.0, 300, &["gx", "gy", "gz"]),
            columns: ColumnSelection::Substring("g".into()),
        };
        let offsets = synchronize(&sync, &mut renderers).unwrap();
        assert!(offsets[0].offset_secs.abs() <= 1.0 / 50.0 + 1e-9);
        assert!(offsets[0].report.is_some());
    }

    #[test]
    fn test_unknown_sync_column_is_data_error() {
        let mut renderers = vec![renderer(SensorSync::CameraImu {
            sensor_sync_column: ColumnSelection::Exact(vec!["missing".into()]),
        })];
        let sync = SyncData::Imu {
            series: imu_series(50.0, 300, &["gx", "gy", "gz"]),
            columns: ColumnSelection::Substring("g".into()),
        };
        let err = synchronize(&sync, &mut renderers).unwrap_err();
        let SyncplotError::Synchronization { source, .. } = err else {
            panic!("expected a synchronization error");
        };
        assert!(matches!(*source, SyncplotError::Data { .. }));
    }

    #[test]
    fn test_joint_axis_other_than_magnitude_is_unsupported() {
        let mut renderers = vec![renderer(SensorSync::Joint {
            sync_joint_name: "WRIST".into(),
            sensor_sync_axes: ColumnSelection::Substring("a".into()),
            joint_sync_axis: JointSyncAxis::AccelerationX,
        })];
        let sync = SyncData::Skeleton(imu_series(30.0, 90, &["WRIST_x", "WRIST_y", "WRIST_z"]));
        let err = synchronize(&sync, &mut renderers).unwrap_err();
        let SyncplotError::Synchronization { source, .. } = err else {
            panic!("expected a synchronization error");
        };
        assert!(matches!(*source, SyncplotError::Unsupported { .. }));
    }

    #[test]
    fn test_unsupported_video_types() {
        let config = VideoConfig::Openpose {
            path: PathBuf::from("v.mp4"),
        };
        assert!(matches!(
            load_sync_data(&config),
            Err(SyncplotError::Unsupported { .. })
        ));
    }
}
