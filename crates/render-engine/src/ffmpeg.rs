//! ffmpeg-backed frame source and sink.
//!
//! Frames travel as packed `rgb24` over pipes: the source reads
//! `ffmpeg -f rawvideo` from stdout, the sink writes raw frames to an
//! encoder's stdin. Child processes are killed and reaped when dropped.

use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use image::RgbImage;
use syncplot_common::{SyncplotError, SyncplotResult, Timestamp, ToolsConfig};
use syncplot_data_model::{Dimensions, VideoCodec};

use crate::media::{check_frame_size, Frame, FrameSink, FrameSource};

pub fn command_exists(binary: &Path) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v '{}' >/dev/null 2>&1", binary.display()))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Stream properties reported by ffprobe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub dimensions: Dimensions,
    pub fps: f64,
    pub frame_count: u64,
}

/// Parse an ffprobe rate such as `30000/1001`.
fn parse_rate(value: &str) -> Option<f64> {
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let den = den.trim().parse::<f64>().ok()?;
            if den == 0.0 {
                return None;
            }
            num.trim().parse::<f64>().ok()? / den
        }
        None => value.trim().parse::<f64>().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// Parse `key=value` lines from `ffprobe -of default=noprint_wrappers=1`.
fn parse_probe_output(path: &Path, raw: &str) -> SyncplotResult<VideoInfo> {
    let mut width = None;
    let mut height = None;
    let mut fps = None;
    let mut frames = None;
    let mut duration = None;
    for line in raw.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        match key {
            "width" => width = value.parse::<u32>().ok(),
            "height" => height = value.parse::<u32>().ok(),
            "r_frame_rate" => fps = parse_rate(value),
            "nb_frames" => frames = value.parse::<u64>().ok(),
            "duration" => duration = value.parse::<f64>().ok(),
            _ => {}
        }
    }

    let dimensions = match (width, height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Dimensions::new(w, h),
        _ => return Err(SyncplotError::resource(path, "no video stream dimensions")),
    };
    let fps = fps.ok_or_else(|| SyncplotError::resource(path, "no usable frame rate"))?;
    let frame_count = match (frames, duration) {
        (Some(n), _) if n > 0 => n,
        (_, Some(secs)) if secs > 0.0 => (secs * fps).round() as u64,
        _ => return Err(SyncplotError::resource(path, "unknown frame count")),
    };
    Ok(VideoInfo {
        dimensions,
        fps,
        frame_count,
    })
}

pub fn probe_video(ffprobe: &Path, path: &Path) -> SyncplotResult<VideoInfo> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate,nb_frames,duration",
            "-of",
            "default=noprint_wrappers=1",
        ])
        .arg(path)
        .output()
        .map_err(|e| SyncplotError::resource(path, format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(SyncplotError::resource(
            path,
            format!(
                "ffprobe failed (status {}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }
    parse_probe_output(path, &String::from_utf8_lossy(&output.stdout))
}

/// A running ffmpeg child with its stderr drained on a helper thread.
struct FfmpegProcess {
    child: Child,
    stderr_task: Option<JoinHandle<String>>,
    reaped: bool,
}

impl FfmpegProcess {
    fn spawn(binary: &Path, args: &[String], path: &Path) -> SyncplotResult<Self> {
        tracing::debug!(binary = %binary.display(), args = ?args, "Running ffmpeg");
        let mut child = Command::new(binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SyncplotError::resource(path, format!("failed to start ffmpeg: {e}")))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SyncplotError::resource(path, "failed to capture ffmpeg stderr"))?;
        // Drain stderr concurrently to avoid ffmpeg blocking on a full stderr pipe.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        tracing::debug!(pid = child.id(), "ffmpeg process started");
        Ok(Self {
            child,
            stderr_task: Some(stderr_task),
            reaped: false,
        })
    }

    fn stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    fn stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    fn stderr_output(&mut self) -> String {
        self.stderr_task
            .take()
            .map(|task| {
                task.join()
                    .unwrap_or_else(|_| "<failed to join stderr reader>".to_string())
            })
            .unwrap_or_default()
    }

    /// Wait for a normal exit; a non-zero status is an error.
    fn wait(&mut self, path: &Path) -> SyncplotResult<()> {
        let status = self
            .child
            .wait()
            .map_err(|e| SyncplotError::resource(path, format!("failed to wait on ffmpeg: {e}")))?;
        self.reaped = true;
        let stderr_output = self.stderr_output();
        if !status.success() {
            return Err(SyncplotError::resource(
                path,
                format!("ffmpeg failed (status {status}): {}", stderr_output.trim()),
            ));
        }
        Ok(())
    }

    fn kill(&mut self) {
        if self.reaped {
            return;
        }
        if let Err(e) = self.child.kill() {
            tracing::debug!(error = %e, "ffmpeg already exited");
        }
        if let Err(e) = self.child.wait() {
            tracing::warn!(error = %e, "Failed to reap ffmpeg");
        }
        self.reaped = true;
        self.stderr_output();
    }
}

impl Drop for FfmpegProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Decodes a video file frame by frame.
pub struct FfmpegFrameSource {
    ffmpeg: PathBuf,
    path: PathBuf,
    info: VideoInfo,
    process: Option<FfmpegProcess>,
    reader: Option<BufReader<ChildStdout>>,
    position: u64,
    exhausted: bool,
}

impl FfmpegFrameSource {
    pub fn open(path: &Path, tools: &ToolsConfig) -> SyncplotResult<Self> {
        if !path.exists() {
            return Err(SyncplotError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let info = probe_video(&tools.ffprobe, path)?;
        tracing::info!(
            path = %path.display(),
            dimensions = %info.dimensions,
            fps = info.fps,
            frames = info.frame_count,
            "Opened video"
        );
        Ok(Self {
            ffmpeg: tools.ffmpeg.clone(),
            path: path.to_path_buf(),
            info,
            process: None,
            reader: None,
            position: 0,
            exhausted: false,
        })
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn start(&mut self) -> SyncplotResult<()> {
        let args = vec![
            "-nostdin".to_string(),
            "-v".to_string(),
            "error".to_string(),
            "-i".to_string(),
            self.path.display().to_string(),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-".to_string(),
        ];
        let mut process = FfmpegProcess::spawn(&self.ffmpeg, &args, &self.path)?;
        let stdout = process
            .stdout()
            .ok_or_else(|| SyncplotError::resource(&self.path, "failed to capture ffmpeg stdout"))?;
        self.reader = Some(BufReader::new(stdout));
        self.process = Some(process);
        self.position = 0;
        Ok(())
    }

    fn stop(&mut self) {
        self.reader = None;
        if let Some(mut process) = self.process.take() {
            process.kill();
        }
    }

    /// Fill `buffer` with one frame; `false` on a clean end of stream.
    fn read_frame(&mut self, buffer: &mut [u8]) -> SyncplotResult<bool> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(false);
        };
        let mut filled = 0;
        while filled < buffer.len() {
            match reader.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(SyncplotError::resource(
                        &self.path,
                        format!("failed reading decoded frames: {e}"),
                    ))
                }
            }
        }
        if filled == buffer.len() {
            return Ok(true);
        }

        self.reader = None;
        self.exhausted = true;
        let result = match self.process.as_mut() {
            Some(process) => process.wait(&self.path),
            None => Ok(()),
        };
        self.process = None;
        result?;
        if filled > 0 {
            tracing::warn!(bytes = filled, "Discarding truncated trailing frame");
        }
        Ok(false)
    }
}

impl FrameSource for FfmpegFrameSource {
    fn dimensions(&self) -> Dimensions {
        self.info.dimensions
    }

    fn frame_count(&self) -> u64 {
        self.info.frame_count
    }

    fn next_frame(&mut self) -> SyncplotResult<Option<Frame>> {
        if self.exhausted {
            return Ok(None);
        }
        if self.reader.is_none() {
            self.start()?;
        }
        let mut buffer = vec![0u8; self.info.dimensions.rgb_len()];
        if !self.read_frame(&mut buffer)? {
            return Ok(None);
        }
        let Dimensions { width, height } = self.info.dimensions;
        let image = RgbImage::from_raw(width, height, buffer)
            .ok_or_else(|| SyncplotError::render("decoded frame has the wrong size"))?;
        let frame = Frame {
            timestamp: Timestamp::from_frame_index(self.position, self.info.fps),
            image,
        };
        self.position += 1;
        Ok(Some(frame))
    }

    fn rewind(&mut self) -> SyncplotResult<()> {
        self.stop();
        self.position = 0;
        self.exhausted = false;
        Ok(())
    }
}

/// Encoder arguments for raw rgb24 frames on stdin.
fn encoder_args(path: &Path, dimensions: Dimensions, fps: u32, codec: VideoCodec) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "-s".to_string(),
        dimensions.to_string(),
        "-r".to_string(),
        fps.to_string(),
        "-i".to_string(),
        "-".to_string(),
        "-an".to_string(),
        "-c:v".to_string(),
        codec.encoder().to_string(),
        "-pix_fmt".to_string(),
        codec.pixel_format().to_string(),
        "-tag:v".to_string(),
        codec.fourcc().to_string(),
        path.display().to_string(),
    ]
}

/// Encodes frames into a video file at a fixed frame rate.
pub struct FfmpegFrameSink {
    path: PathBuf,
    dimensions: Dimensions,
    process: Option<FfmpegProcess>,
    writer: Option<BufWriter<ChildStdin>>,
    frames: u64,
}

impl FfmpegFrameSink {
    pub fn create(
        path: &Path,
        dimensions: Dimensions,
        fps: u32,
        codec: VideoCodec,
        tools: &ToolsConfig,
    ) -> SyncplotResult<Self> {
        if dimensions.is_empty() || fps == 0 {
            return Err(SyncplotError::config(format!(
                "invalid output {dimensions} at {fps} fps"
            )));
        }
        let args = encoder_args(path, dimensions, fps, codec);
        let mut process = FfmpegProcess::spawn(&tools.ffmpeg, &args, path)?;
        let stdin = process
            .stdin()
            .ok_or_else(|| SyncplotError::resource(path, "failed to capture ffmpeg stdin"))?;
        tracing::info!(
            path = %path.display(),
            dimensions = %dimensions,
            fps,
            codec = codec.fourcc(),
            "Encoding output video"
        );
        Ok(Self {
            path: path.to_path_buf(),
            dimensions,
            process: Some(process),
            writer: Some(BufWriter::new(stdin)),
            frames: 0,
        })
    }

    fn close_writer(&mut self) -> std::io::Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl FrameSink for FfmpegFrameSink {
    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    fn write_frame(&mut self, frame: &RgbImage) -> SyncplotResult<()> {
        check_frame_size(self.dimensions, frame)?;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| SyncplotError::render("output video is already closed"))?;
        if let Err(e) = writer.write_all(frame.as_raw()) {
            // A broken pipe means ffmpeg exited; its stderr says why.
            self.writer = None;
            let reason = match self.process.as_mut().map(|p| p.wait(&self.path)) {
                Some(Err(ffmpeg_error)) => ffmpeg_error.to_string(),
                _ => e.to_string(),
            };
            return Err(SyncplotError::resource(
                &self.path,
                format!("failed writing frame {}: {reason}", self.frames),
            ));
        }
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> SyncplotResult<()> {
        let flushed = self.close_writer();
        let Some(mut process) = self.process.take() else {
            return Err(SyncplotError::render("output video is already closed"));
        };
        process.wait(&self.path)?;
        flushed.map_err(|e| SyncplotError::resource(&self.path, format!("failed to flush frames: {e}")))?;
        tracing::info!(path = %self.path.display(), frames = self.frames, "Output video written");
        Ok(())
    }

    fn abort(&mut self) {
        self.writer = None;
        if let Some(mut process) = self.process.take() {
            process.kill();
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::info!(path = %self.path.display(), "Removed incomplete output"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove incomplete output"
            ),
        }
    }
}

impl Drop for FfmpegFrameSink {
    fn drop(&mut self) {
        if self.process.is_some() {
            self.abort();
        }
    }
}
