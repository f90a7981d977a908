//! Render job configuration.
//!
//! A job is described by one or more TOML files merged in order:
//! - tables merge recursively,
//! - arrays concatenate (so `[[sensor]]` entries accumulate),
//! - scalars from later files win,
//! - a later `video` entry replaces an earlier one entirely.

use crate::groups::{ColumnSelection, GroupPattern};
use crate::loader::parse_timestamp;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use syncplot_common::{SyncplotError, SyncplotResult, Timestamp};

/// Fully parsed render job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    pub render: RenderConfig,
    pub video: VideoConfig,
    pub sensors: Vec<SensorConfig>,
}

/// How plots are placed relative to the video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StackingDirection {
    /// Plots on the left and right of the (cropped) video.
    #[default]
    #[serde(rename = "HORIZONTAL", alias = "horizontal")]
    Horizontal,
    /// Plots below the video.
    #[serde(rename = "VERTICAL", alias = "vertical")]
    Vertical,
}

/// How the passage of time is shown on the plots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PlottingMethod {
    /// Static full-range plot with a moving vertical indicator.
    #[default]
    #[serde(rename = "MOVING_VERTICAL_LINE", alias = "moving_vertical_line")]
    MovingVerticalLine,
    /// Scrolling plot where new data enters on the right.
    #[serde(rename = "PUSH_IN", alias = "push_in")]
    PushIn,
}

/// Output codec, identified by its FourCC code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum VideoCodec {
    #[default]
    #[serde(rename = "MJPG", alias = "mjpg", alias = "mjpeg")]
    Mjpeg,
    #[serde(rename = "MP4V", alias = "mp4v")]
    Mpeg4,
    #[serde(rename = "H264", alias = "h264", alias = "avc1")]
    H264,
    #[serde(rename = "FFV1", alias = "ffv1")]
    Ffv1,
}

impl VideoCodec {
    /// ffmpeg encoder name.
    pub fn encoder(&self) -> &'static str {
        match self {
            VideoCodec::Mjpeg => "mjpeg",
            VideoCodec::Mpeg4 => "mpeg4",
            VideoCodec::H264 => "libx264",
            VideoCodec::Ffv1 => "ffv1",
        }
    }

    /// Pixel format handed to the encoder.
    pub fn pixel_format(&self) -> &'static str {
        match self {
            VideoCodec::Mjpeg => "yuvj420p",
            VideoCodec::Mpeg4 | VideoCodec::H264 => "yuv420p",
            VideoCodec::Ffv1 => "bgr0",
        }
    }

    pub fn fourcc(&self) -> &'static str {
        match self {
            VideoCodec::Mjpeg => "MJPG",
            VideoCodec::Mpeg4 => "MP4V",
            VideoCodec::H264 => "H264",
            VideoCodec::Ffv1 => "FFV1",
        }
    }
}

/// Rendering settings (top-level keys of the job file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Where the composite video is written.
    pub target_file_path: PathBuf,

    #[serde(alias = "codec")]
    pub fourcc_codec: VideoCodec,

    /// Output frame rate; independent of the input video's rate.
    pub output_fps: u32,

    pub stacking_direction: StackingDirection,

    pub plotting_method: PlottingMethod,

    /// Number of plot axes per grid row.
    pub plot_column_count: u32,

    /// Decode the next video frame while the current one is composed.
    pub use_parallel_image_ingestion: bool,

    /// Add a magnitude line to every three-column plot group.
    pub add_magnitude: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            target_file_path: PathBuf::from("syncplot.avi"),
            fourcc_codec: VideoCodec::default(),
            output_fps: 32,
            stacking_direction: StackingDirection::default(),
            plotting_method: PlottingMethod::default(),
            plot_column_count: 2,
            use_parallel_image_ingestion: false,
            add_magnitude: false,
        }
    }
}

/// Source video and the synchronization data that comes with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum VideoConfig {
    /// Plain video without synchronization data.
    Raw { path: PathBuf },
    /// Camera with an integrated IMU recorded to CSV.
    Imu {
        path: PathBuf,
        imu_path: PathBuf,
        /// IMU columns every camera-IMU-synced sensor is aligned to.
        camera_imu_sync_column: ColumnSelection,
    },
    /// Depth camera video with a `;`-separated skeleton export.
    Kinect { path: PathBuf, skeleton_path: PathBuf },
    /// Capture app recording with protobuf IMU data.
    AppCapture { path: PathBuf, imu_pb_path: PathBuf },
    /// Video with OpenPose keypoints.
    Openpose { path: PathBuf },
}

impl VideoConfig {
    pub fn path(&self) -> &Path {
        match self {
            VideoConfig::Raw { path }
            | VideoConfig::Imu { path, .. }
            | VideoConfig::Kinect { path, .. }
            | VideoConfig::AppCapture { path, .. }
            | VideoConfig::Openpose { path } => path,
        }
    }

    /// Discriminant as written in the job file.
    pub fn kind(&self) -> &'static str {
        match self {
            VideoConfig::Raw { .. } => "raw",
            VideoConfig::Imu { .. } => "imu",
            VideoConfig::Kinect { .. } => "kinect",
            VideoConfig::AppCapture { .. } => "app-capture",
            VideoConfig::Openpose { .. } => "openpose",
        }
    }

    fn referenced_files(&self) -> Vec<&Path> {
        match self {
            VideoConfig::Raw { path } | VideoConfig::Openpose { path } => vec![path],
            VideoConfig::Imu { path, imu_path, .. } => vec![path, imu_path],
            VideoConfig::Kinect {
                path,
                skeleton_path,
            } => vec![path, skeleton_path],
            VideoConfig::AppCapture { path, imu_pb_path } => vec![path, imu_pb_path],
        }
    }
}

/// Which joint signal a joint-synced sensor is aligned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JointSyncAxis {
    AccelerationX,
    AccelerationY,
    AccelerationZ,
    #[default]
    AccelerationMag,
}

/// How a sensor stream is brought onto the video clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SensorSync {
    /// A fixed, user-supplied offset.
    #[serde(rename = "manually-synced")]
    Manual {
        #[serde(default)]
        offset_seconds: f64,
    },
    /// Cross-correlated against the camera's IMU.
    #[serde(rename = "camera-imu-synced")]
    CameraImu { sensor_sync_column: ColumnSelection },
    /// Cross-correlated against the acceleration of a skeleton joint.
    #[serde(rename = "joint-synced")]
    Joint {
        sync_joint_name: String,
        sensor_sync_axes: ColumnSelection,
        #[serde(default)]
        joint_sync_axis: JointSyncAxis,
    },
}

impl SensorSync {
    pub fn kind(&self) -> &'static str {
        match self {
            SensorSync::Manual { .. } => "manually-synced",
            SensorSync::CameraImu { .. } => "camera-imu-synced",
            SensorSync::Joint { .. } => "joint-synced",
        }
    }
}

/// A crop bound: seconds on the stream's clock or a date/time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeBound {
    Seconds(f64),
    Text(String),
    Date(toml::value::Datetime),
}

impl TimeBound {
    pub fn resolve(&self) -> SyncplotResult<Timestamp> {
        match self {
            TimeBound::Seconds(secs) => Ok(Timestamp::from_secs_f64(*secs)),
            TimeBound::Text(text) => parse_timestamp(text),
            TimeBound::Date(dt) => parse_timestamp(&dt.to_string()),
        }
    }
}

/// One sensor CSV and how to synchronize and plot it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Display name; defaults to the sensor's position in the job.
    #[serde(default)]
    pub name: Option<String>,

    pub path: PathBuf,

    /// Drop samples before this time (on the sensor's own clock).
    #[serde(default)]
    pub start_time: Option<TimeBound>,

    /// Drop samples after this time (on the sensor's own clock).
    #[serde(default)]
    pub end_time: Option<TimeBound>,

    /// Plot grouping; every column on its own axis when absent.
    #[serde(default)]
    pub graph_groups: Option<Vec<GroupPattern>>,

    #[serde(flatten)]
    pub sync: SensorSync,
}

impl JobConfig {
    /// Read and merge the given TOML files, in order.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> SyncplotResult<Self> {
        if paths.is_empty() {
            return Err(SyncplotError::config(
                "At least one config file is required to set video and data sources",
            ));
        }

        let mut merged = toml::Table::new();
        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                return Err(SyncplotError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            let content = std::fs::read_to_string(path)
                .map_err(|e| SyncplotError::resource(path, e.to_string()))?;
            let update: toml::Table = toml::from_str(&content)
                .map_err(|e| SyncplotError::config(format!("{}: {e}", path.display())))?;
            tracing::debug!(path = %path.display(), "Merging job config");
            merge_table(&mut merged, update);
        }

        Self::from_table(merged)
    }

    /// Parse a single TOML document.
    pub fn from_toml_str(content: &str) -> SyncplotResult<Self> {
        let table: toml::Table =
            toml::from_str(content).map_err(|e| SyncplotError::config(e.to_string()))?;
        Self::from_table(table)
    }

    fn from_table(mut table: toml::Table) -> SyncplotResult<Self> {
        let video = table.remove("video").ok_or_else(|| {
            SyncplotError::config(
                "Missing video parameter. You need to supply a video to render the graphs next to.",
            )
        })?;
        let sensors = table.remove("sensor").ok_or_else(|| {
            SyncplotError::config(
                "Missing sensor parameters. You need to supply at least one sensor to render next to the video.",
            )
        })?;

        let render: RenderConfig = toml::Value::Table(table)
            .try_into()
            .map_err(|e| SyncplotError::config(format!("invalid render settings: {e}")))?;

        let mut videos: Vec<VideoConfig> = match video {
            toml::Value::Array(_) => video.try_into(),
            single => single.try_into().map(|v| vec![v]),
        }
        .map_err(|e| SyncplotError::config(format!("invalid video config: {e}")))?;
        if videos.is_empty() {
            return Err(SyncplotError::config("Video config list is empty"));
        }
        if videos.len() > 1 {
            tracing::warn!(count = videos.len(), "Several videos configured, using the first");
        }
        let video = videos.swap_remove(0);

        let sensors: Vec<SensorConfig> = match sensors {
            toml::Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    item.try_into().map_err(|e| {
                        SyncplotError::config(format!("invalid sensor config {i}: {e}"))
                    })
                })
                .collect::<SyncplotResult<_>>()?,
            _ => {
                return Err(SyncplotError::config(
                    "sensor must be an array of tables ([[sensor]])",
                ))
            }
        };
        if sensors.is_empty() {
            return Err(SyncplotError::config("At least one sensor is required"));
        }

        let config = Self {
            render,
            video,
            sensors,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> SyncplotResult<()> {
        if self.render.output_fps == 0 {
            return Err(SyncplotError::config("output_fps must be positive"));
        }
        if self.render.plot_column_count == 0 {
            return Err(SyncplotError::config("plot_column_count must be positive"));
        }
        for (i, sensor) in self.sensors.iter().enumerate() {
            if let SensorSync::Manual { offset_seconds } = sensor.sync {
                if !offset_seconds.is_finite() {
                    return Err(SyncplotError::config(format!(
                        "sensor {i}: offset_seconds must be finite"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Display name of sensor `i`.
    pub fn sensor_name(&self, i: usize) -> String {
        self.sensors
            .get(i)
            .and_then(|s| s.name.clone())
            .unwrap_or_else(|| format!("sensor-{i}"))
    }

    /// Referenced input files that do not exist.
    pub fn missing_files(&self) -> Vec<PathBuf> {
        self.video
            .referenced_files()
            .into_iter()
            .chain(self.sensors.iter().map(|s| s.path.as_path()))
            .filter(|p| !p.exists())
            .map(Path::to_path_buf)
            .collect()
    }
}

/// Deep-merge `update` into `base`.
pub fn merge_table(base: &mut toml::Table, update: toml::Table) {
    if update.contains_key("video") && base.remove("video").is_some() {
        tracing::info!("Only the latest video config is used");
    }
    merge_into(base, update);
}

fn merge_into(base: &mut toml::Table, update: toml::Table) {
    for (key, value) in update {
        let value = match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_into(existing, incoming);
                continue;
            }
            (Some(toml::Value::Array(existing)), toml::Value::Array(incoming)) => {
                existing.extend(incoming);
                continue;
            }
            (_, value) => value,
        };
        base.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BASE: &str = r#"
        target_file_path = "out.avi"
        stacking_direction = "VERTICAL"

        [[video]]
        type = "imu"
        path = "video.mp4"
        imu_path = "camera_imu.csv"
        camera_imu_sync_column = ["AX", "AY", "AZ"]

        [[sensor]]
        type = "camera-imu-synced"
        name = "wrist"
        path = "wrist.csv"
        sensor_sync_column = "Acc"
        graph_groups = ["Acc", ["Gyr_X", "Gyr_Y"]]
    "#;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_parse_single_document() {
        let config = JobConfig::from_toml_str(BASE).unwrap();
        assert_eq!(config.render.target_file_path, PathBuf::from("out.avi"));
        assert_eq!(config.render.stacking_direction, StackingDirection::Vertical);
        assert_eq!(config.render.output_fps, 32);
        assert_eq!(config.render.fourcc_codec, VideoCodec::Mjpeg);
        assert_eq!(config.video.kind(), "imu");
        assert_eq!(config.sensors.len(), 1);
        assert_eq!(config.sensor_name(0), "wrist");
        assert_eq!(
            config.sensors[0].sync,
            SensorSync::CameraImu {
                sensor_sync_column: ColumnSelection::Substring("Acc".into())
            }
        );
        assert_eq!(config.sensors[0].graph_groups.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_video_is_config_error() {
        let err = JobConfig::from_toml_str(
            r#"
            [[sensor]]
            type = "manually-synced"
            path = "a.csv"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SyncplotError::Config { .. }));
        assert!(err.to_string().contains("Missing video"));
    }

    #[test]
    fn test_missing_sensor_is_config_error() {
        let err = JobConfig::from_toml_str(
            r#"
            [[video]]
            type = "raw"
            path = "v.mp4"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Missing sensor"));
    }

    #[test]
    fn test_unknown_variant_is_config_error() {
        let err = JobConfig::from_toml_str(
            r#"
            [[video]]
            type = "hologram"
            path = "v.mp4"

            [[sensor]]
            type = "manually-synced"
            path = "a.csv"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SyncplotError::Config { .. }));
    }

    #[test]
    fn test_missing_required_field_is_config_error() {
        let err = JobConfig::from_toml_str(
            r#"
            [[video]]
            type = "kinect"
            path = "v.mp4"

            [[sensor]]
            type = "manually-synced"
            path = "a.csv"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("skeleton_path"));
    }

    #[test]
    fn test_manual_offset_and_crop_bounds() {
        let config = JobConfig::from_toml_str(
            r#"
            use_parallel_image_ingestion = true
            codec = "ffv1"

            [[video]]
            type = "raw"
            path = "v.mp4"

            [[sensor]]
            type = "manually-synced"
            path = "a.csv"
            offset_seconds = 2
            start_time = 1.5
            end_time = "2021-05-01 10:00:00"
            "#,
        )
        .unwrap();
        assert!(config.render.use_parallel_image_ingestion);
        assert_eq!(config.render.fourcc_codec, VideoCodec::Ffv1);
        let sensor = &config.sensors[0];
        assert_eq!(sensor.sync, SensorSync::Manual { offset_seconds: 2.0 });
        assert_eq!(
            sensor.start_time.as_ref().unwrap().resolve().unwrap(),
            Timestamp::from_secs_f64(1.5)
        );
        assert!(sensor.end_time.as_ref().unwrap().resolve().is_ok());
        assert_eq!(config.sensor_name(0), "sensor-0");
    }

    #[test]
    fn test_joint_sync_defaults_to_magnitude() {
        let config = JobConfig::from_toml_str(
            r#"
            [[video]]
            type = "kinect"
            path = "v.mkv"
            skeleton_path = "skeleton.csv"

            [[sensor]]
            type = "joint-synced"
            path = "ankle.csv"
            sync_joint_name = "ANKLE_RIGHT"
            sensor_sync_axes = ["AX", "AY", "AZ"]
            "#,
        )
        .unwrap();
        match &config.sensors[0].sync {
            SensorSync::Joint {
                sync_joint_name,
                joint_sync_axis,
                ..
            } => {
                assert_eq!(sync_joint_name, "ANKLE_RIGHT");
                assert_eq!(*joint_sync_axis, JointSyncAxis::AccelerationMag);
            }
            other => panic!("unexpected sync variant {other:?}"),
        }
    }

    #[test]
    fn test_merge_files_concatenates_sensors_and_replaces_video() {
        let dir = tempfile::tempdir().unwrap();
        let first = write(dir.path(), "base.toml", BASE);
        let second = write(
            dir.path(),
            "extra.toml",
            r#"
            stacking_direction = "horizontal"

            [[video]]
            type = "raw"
            path = "other.mp4"

            [[sensor]]
            type = "manually-synced"
            path = "ankle.csv"
            offset_seconds = -0.5
            "#,
        );

        let config = JobConfig::from_files(&[first, second]).unwrap();
        assert_eq!(config.sensors.len(), 2);
        assert_eq!(config.video, VideoConfig::Raw { path: "other.mp4".into() });
        assert_eq!(
            config.render.stacking_direction,
            StackingDirection::Horizontal
        );
        assert_eq!(config.render.target_file_path, PathBuf::from("out.avi"));
    }

    #[test]
    fn test_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = JobConfig::from_files(&[dir.path().join("nope.toml")]).unwrap_err();
        assert!(matches!(err, SyncplotError::FileNotFound { .. }));
    }

    #[test]
    fn test_merge_nested_tables() {
        let mut base: toml::Table = toml::from_str("[a]\nx = 1\ny = [1]").unwrap();
        let update: toml::Table = toml::from_str("[a]\nx = 2\ny = [2]\nz = true").unwrap();
        merge_table(&mut base, update);
        let a = base["a"].as_table().unwrap();
        assert_eq!(a["x"].as_integer(), Some(2));
        assert_eq!(a["y"].as_array().unwrap().len(), 2);
        assert_eq!(a["z"].as_bool(), Some(true));
    }

    #[test]
    fn test_missing_files_lists_absent_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let video = write(dir.path(), "v.mp4", "");
        let mut config = JobConfig::from_toml_str(
            r#"
            [[video]]
            type = "raw"
            path = "placeholder"

            [[sensor]]
            type = "manually-synced"
            path = "definitely-missing.csv"
            "#,
        )
        .unwrap();
        config.video = VideoConfig::Raw { path: video };
        assert_eq!(
            config.missing_files(),
            vec![PathBuf::from("definitely-missing.csv")]
        );
    }
}
