use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use crate::duration::DurationResolver;
use crate::error::{MediaError, MediaResult};
use crate::process::{ProcessRunner, ToolEvent};
use crate::readable::is_file_readable;

/// Rewrites a container's framing and timestamps without re-encoding
#[async_trait]
pub trait Remuxer: Send + Sync {
    async fn remux(&self, source: &Path, dest: &Path) -> MediaResult<()>;
}

/// Stream-copy remux through ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegRemuxer {
    ffmpeg_bin: PathBuf,
    runner: ProcessRunner,
    timeout: Duration,
}

impl FfmpegRemuxer {
    pub fn new(ffmpeg_bin: PathBuf, timeout: Duration) -> Self {
        FfmpegRemuxer {
            ffmpeg_bin,
            runner: ProcessRunner::new(),
            timeout,
        }
    }

    /// Build the remux command line
    ///
    /// Streams are copied; negative timestamps are shifted so the output starts at zero.
    pub fn build_remux_command(source: &Path, dest: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-nostats".to_string(),
            "-progress".to_string(),
            "pipe:1".to_string(),
            "-fflags".to_string(),
            "+genpts".to_string(),
            "-i".to_string(),
            source.to_string_lossy().to_string(),
            "-map".to_string(),
            "0".to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-avoid_negative_ts".to_string(),
            "make_zero".to_string(),
            dest.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl Remuxer for FfmpegRemuxer {
    async fn remux(&self, source: &Path, dest: &Path) -> MediaResult<()> {
        let args = Self::build_remux_command(source, dest);
        let process = self.runner.spawn(&self.ffmpeg_bin, &args)?;
        let mut events = process.tool_events();

        let consume = async {
            while let Some(event) = events.recv().await {
                match event? {
                    ToolEvent::DurationDetected(secs) => {
                        debug!("Remux {}: source reports {:.2}s", source.display(), secs);
                    }
                    ToolEvent::Progress(percent) => {
                        debug!("Remux {}: {:.0}%", source.display(), percent);
                    }
                    ToolEvent::Completed(_) => return Ok(()),
                }
            }
            Err(MediaError::RemuxFailure {
                path: source.to_path_buf(),
                reason: "ffmpeg output ended without completion".to_string(),
            })
        };

        // Timing out drops the receiver, which kills ffmpeg
        tokio::time::timeout(self.timeout, consume)
            .await
            .map_err(|_| MediaError::ToolTimedOut {
                tool: self.ffmpeg_bin.display().to_string(),
                secs: self.timeout.as_secs(),
            })?
    }
}

/// Sibling path receiving the remuxed copy: `clip.webm` -> `clip.seekable.webm`
pub fn remux_output_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "media".to_string());
    let file_name = match source.extension() {
        Some(ext) => format!("{}.seekable.{}", stem, ext.to_string_lossy()),
        None => format!("{}.seekable", stem),
    };
    source.with_file_name(file_name)
}

/// Memoizes which file to serve for a source path, remuxing on first use when
/// the source lacks duration metadata
pub struct RemuxCache {
    resolver: Arc<DurationResolver>,
    remuxer: Arc<dyn Remuxer>,
    readable_timeout: Duration,
    entries: RwLock<HashMap<PathBuf, PathBuf>>,
    in_flight: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl RemuxCache {
    pub fn new(resolver: Arc<DurationResolver>, remuxer: Arc<dyn Remuxer>, readable_timeout: Duration) -> Self {
        RemuxCache {
            resolver,
            remuxer,
            readable_timeout,
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached(&self, path: &Path) -> Option<PathBuf> {
        self.entries.read().get(path).cloned()
    }

    /// Path to serve for `path`; never fails, falling back to `path` itself
    pub async fn ensure_playable(&self, path: &Path) -> PathBuf {
        if let Some(hit) = self.cached(path) {
            return hit;
        }

        // Single flight per path: later callers wait for the first one's result
        let gate = self
            .in_flight
            .lock()
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = gate.lock().await;

        if let Some(hit) = self.cached(path) {
            return hit;
        }

        let resolved = self.resolve_uncached(path).await;
        if let Some(resolved) = &resolved {
            self.entries.write().insert(path.to_path_buf(), resolved.clone());
        }
        self.in_flight.lock().remove(path);

        resolved.unwrap_or_else(|| path.to_path_buf())
    }

    /// `None` means "serve the original but do not remember the decision"
    async fn resolve_uncached(&self, path: &Path) -> Option<PathBuf> {
        // Placeholders that block on read would stall ffprobe too
        if !is_file_readable(path, self.readable_timeout).await {
            warn!("{} is not readable yet, skipping duration check and remux for now", path.display());
            return None;
        }

        match self.resolver.resolve_duration(path).await {
            Ok(secs) if secs > 0.0 => return Some(path.to_path_buf()),
            Ok(_) => {}
            Err(e) => {
                warn!("Cannot check duration of {}, serving original: {}", path.display(), e);
                return Some(path.to_path_buf());
            }
        }

        let dest = remux_output_path(path);
        info!("🔧 Remuxing {} -> {} (missing duration metadata)", path.display(), dest.display());

        if let Err(e) = self.remuxer.remux(path, &dest).await {
            let failure = MediaError::RemuxFailure {
                path: path.to_path_buf(),
                reason: e.to_string(),
            };
            warn!("{}; serving original", failure);
            discard(&dest).await;
            return Some(path.to_path_buf());
        }

        match self.resolver.resolve_duration(&dest).await {
            Ok(secs) if secs > 0.0 => {
                info!("✅ Remuxed {} now reports {:.2}s", dest.display(), secs);
                Some(dest)
            }
            Ok(_) => {
                warn!("Remuxed {} still has no duration; serving original", dest.display());
                discard(&dest).await;
                Some(path.to_path_buf())
            }
            Err(e) => {
                warn!("Cannot check remuxed {}: {}; serving original", dest.display(), e);
                Some(path.to_path_buf())
            }
        }
    }
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
