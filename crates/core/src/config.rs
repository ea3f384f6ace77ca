use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Configuration for the capture-and-delivery pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Directory where in-flight recording chunks are written
    pub chunk_dir: PathBuf,
    /// Directory receiving finalized and recovered recordings
    pub recordings_dir: PathBuf,
    /// Directory caching generated JPEG thumbnails
    pub thumbnail_dir: PathBuf,
    /// Path to ffmpeg binary
    pub ffmpeg_bin: PathBuf,
    /// Path to ffprobe binary
    pub ffprobe_bin: PathBuf,
    /// Address the HTTP API binds to
    pub bind_addr: String,
    /// Budget for the "is this file really readable" check, in milliseconds
    pub readable_check_timeout_ms: u64,
    /// Upper bound on a single remux or thumbnail subprocess, in seconds
    pub tool_timeout_secs: u64,
    /// Upper bound on a single ffprobe invocation, in seconds
    pub probe_timeout_secs: u64,
    /// Largest accepted chunk upload, in bytes
    pub max_chunk_bytes: usize,
    /// Container extension used for new sessions when the client sends none
    pub default_extension: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl MediaConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            chunk_dir: std::env::temp_dir().join("vlog-chunks"),
            recordings_dir: PathBuf::from("vlogs"),
            thumbnail_dir: PathBuf::from("vlogs/.thumbnails"),
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            bind_addr: "127.0.0.1:8765".to_string(),
            readable_check_timeout_ms: 2000,
            tool_timeout_secs: 600,
            probe_timeout_secs: 30,
            max_chunk_bytes: 512 * 1024 * 1024,
            default_extension: "webm".to_string(),
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                // TOML by extension, JSON otherwise
                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            }
        }

        Ok(config)
    }

    pub fn readable_check_timeout(&self) -> Duration {
        Duration::from_millis(self.readable_check_timeout_ms)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}
