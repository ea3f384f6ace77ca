use std::path::{Path, PathBuf};
use std::time::Duration;
use async_trait::async_trait;
use log::{debug, info, warn};
use crate::library::MediaAsset;
use crate::process::ProcessRunner;

pub const THUMBNAIL_WIDTH: u32 = 320;

/// Produces a JPEG preview for a media file
#[async_trait]
pub trait ThumbnailGenerator: Send + Sync {
    /// Cached or freshly generated JPEG path; `None` when no preview can be made
    async fn generate(&self, path: &Path) -> Option<PathBuf>;
}

/// Extracts a single scaled frame with ffmpeg, cached by media id
#[derive(Debug, Clone)]
pub struct FfmpegThumbnailer {
    ffmpeg_bin: PathBuf,
    thumbnail_dir: PathBuf,
    runner: ProcessRunner,
    timeout: Duration,
}

impl FfmpegThumbnailer {
    pub fn new(ffmpeg_bin: PathBuf, thumbnail_dir: PathBuf, timeout: Duration) -> Self {
        FfmpegThumbnailer {
            ffmpeg_bin,
            thumbnail_dir,
            runner: ProcessRunner::new(),
            timeout,
        }
    }

    pub fn thumbnail_path(&self, source: &Path) -> PathBuf {
        let absolute = std::path::absolute(source).unwrap_or_else(|_| source.to_path_buf());
        self.thumbnail_dir.join(format!("{}.jpg", MediaAsset::id_for_path(&absolute)))
    }

    /// Seek before the input so only one frame is decoded
    pub fn build_frame_command(source: &Path, dest: &Path, at_secs: f64) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-ss".to_string(),
            format!("{:.3}", at_secs),
            "-i".to_string(),
            source.to_string_lossy().to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-vf".to_string(),
            format!("scale={}:-2", THUMBNAIL_WIDTH),
            "-q:v".to_string(),
            "4".to_string(),
            dest.to_string_lossy().to_string(),
        ]
    }

    async fn extract_frame(&self, source: &Path, dest: &Path, at_secs: f64) -> bool {
        let args = Self::build_frame_command(source, dest, at_secs);
        let result = match self.runner.spawn(&self.ffmpeg_bin, &args) {
            Ok(process) => process.wait_with_output(Some(self.timeout)).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(_) => has_content(dest).await,
            Err(e) => {
                debug!("Frame at {:.1}s from {} failed: {}", at_secs, source.display(), e);
                false
            }
        }
    }
}

#[async_trait]
impl ThumbnailGenerator for FfmpegThumbnailer {
    async fn generate(&self, path: &Path) -> Option<PathBuf> {
        let dest = self.thumbnail_path(path);
        if has_content(&dest).await {
            return Some(dest);
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.thumbnail_dir).await {
            warn!("Cannot create thumbnail directory {}: {}", self.thumbnail_dir.display(), e);
            return None;
        }

        // Clips shorter than a second have no frame at 1s
        for at_secs in [1.0, 0.0] {
            if self.extract_frame(path, &dest, at_secs).await {
                info!("🖼️  Thumbnail for {} -> {}", path.display(), dest.display());
                return Some(dest);
            }
        }

        warn!("Thumbnail generation failed for {}", path.display());
        let _ = tokio::fs::remove_file(&dest).await;
        None
    }
}

async fn has_content(path: &Path) -> bool {
    matches!(tokio::fs::metadata(path).await, Ok(m) if m.is_file() && m.len() > 0)
}
