use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use crate::error::{MediaError, MediaResult};
use crate::process::ProcessRunner;

/// Complete ffprobe output structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FFProbeData {
    #[serde(default)]
    pub streams: Vec<FFProbeStream>,
    #[serde(default)]
    pub format: FFProbeFormat,
}

/// Format-level metadata from ffprobe
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FFProbeFormat {
    #[serde(default)]
    pub format_name: String,
    /// Seconds as a decimal string; absent for WebM written by MediaRecorder
    pub duration: Option<String>,
    pub tags: Option<HashMap<String, String>>,
}

/// Stream-level metadata from ffprobe
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FFProbeStream {
    #[serde(default)]
    pub index: i32,
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub duration: Option<String>,
    pub duration_ts: Option<i64>,
    /// Rational such as "1/1000"
    pub time_base: Option<String>,
    pub nb_frames: Option<String>,
    /// Rational such as "30000/1001"
    pub avg_frame_rate: Option<String>,
    pub tags: Option<HashMap<String, String>>,
}

/// Packet listing from `-show_entries packet=pts,pts_time`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FFProbePackets {
    #[serde(default)]
    pub packets: Vec<FFProbePacket>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FFProbePacket {
    pub pts: Option<i64>,
    pub pts_time: Option<String>,
}

impl FFProbePackets {
    /// Largest presentation timestamp in seconds, 0 when none parse
    pub fn max_pts_time(&self) -> f64 {
        self.packets
            .iter()
            .filter_map(|p| p.pts_time.as_deref())
            .filter_map(|t| t.trim().parse::<f64>().ok())
            .filter(|t| t.is_finite())
            .fold(0.0, f64::max)
    }
}

/// Which stream a packet scan reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSelector {
    FirstAudio,
    FirstVideo,
}

impl StreamSelector {
    pub fn as_ffprobe_arg(&self) -> &'static str {
        match self {
            StreamSelector::FirstAudio => "a:0",
            StreamSelector::FirstVideo => "v:0",
        }
    }
}

/// Source of container and packet metadata for a media file
#[async_trait]
pub trait MediaProber: Send + Sync {
    /// Format and stream metadata
    async fn probe(&self, path: &Path) -> MediaResult<FFProbeData>;

    /// Every packet's presentation timestamp for the selected stream
    async fn packet_timestamps(&self, path: &Path, stream: StreamSelector) -> MediaResult<FFProbePackets>;
}

/// `MediaProber` backed by the ffprobe binary
///
/// Every invocation is killed once `timeout` elapses.
#[derive(Debug, Clone)]
pub struct FfprobeCli {
    ffprobe_bin: PathBuf,
    timeout: Duration,
    runner: ProcessRunner,
}

impl FfprobeCli {
    pub fn new(ffprobe_bin: PathBuf, timeout: Duration) -> Self {
        FfprobeCli {
            ffprobe_bin,
            timeout,
            runner: ProcessRunner::new(),
        }
    }

    async fn run_json(&self, args: Vec<String>) -> MediaResult<String> {
        let process = self.runner.spawn(&self.ffprobe_bin, &args)?;
        let output = process.wait_with_output(Some(self.timeout)).await?;
        Ok(output.stdout)
    }
}

#[async_trait]
impl MediaProber for FfprobeCli {
    async fn probe(&self, path: &Path) -> MediaResult<FFProbeData> {
        if !path.exists() {
            return Err(MediaError::PathNotAccessible(path.to_path_buf()));
        }
        debug!("ffprobe: probing format and streams for {}", path.display());

        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_streams".to_string(),
            "-show_format".to_string(),
            path.to_string_lossy().to_string(),
        ];
        let json_str = self.run_json(args).await?;

        serde_json::from_str(&json_str).map_err(|e| {
            MediaError::InvalidProbeOutput(format!("{}: {}", path.display(), e))
        })
    }

    async fn packet_timestamps(&self, path: &Path, stream: StreamSelector) -> MediaResult<FFProbePackets> {
        if !path.exists() {
            return Err(MediaError::PathNotAccessible(path.to_path_buf()));
        }
        debug!("ffprobe: scanning {} packets of {}", stream.as_ffprobe_arg(), path.display());

        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-select_streams".to_string(),
            stream.as_ffprobe_arg().to_string(),
            "-show_entries".to_string(),
            "packet=pts,pts_time".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            path.to_string_lossy().to_string(),
        ];
        let json_str = self.run_json(args).await?;

        serde_json::from_str(&json_str).map_err(|e| {
            MediaError::InvalidProbeOutput(format!("{}: {}", path.display(), e))
        })
    }
}
