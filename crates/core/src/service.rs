use std::sync::Arc;
use log::info;
use crate::config::MediaConfig;
use crate::delivery::MediaDeliveryServer;
use crate::duration::DurationResolver;
use crate::error::MediaResult;
use crate::ffprobe::{FfprobeCli, MediaProber};
use crate::library::{AssetCatalog, MediaLibrary};
use crate::recovery::{CrashRecoveryScanner, RecoveryOutcome};
use crate::remux::{FfmpegRemuxer, RemuxCache, Remuxer};
use crate::routes::AppState;
use crate::scan;
use crate::session::RecordingSessionManager;
use crate::thumbnail::{FfmpegThumbnailer, ThumbnailGenerator};

/// External tools the pipeline shells out to
pub struct Toolchain {
    pub prober: Arc<dyn MediaProber>,
    pub remuxer: Arc<dyn Remuxer>,
    pub thumbnails: Arc<dyn ThumbnailGenerator>,
}

impl Toolchain {
    pub fn from_config(config: &MediaConfig) -> Self {
        Toolchain {
            prober: Arc::new(FfprobeCli::new(config.ffprobe_bin.clone(), config.probe_timeout())),
            remuxer: Arc::new(FfmpegRemuxer::new(config.ffmpeg_bin.clone(), config.tool_timeout())),
            thumbnails: Arc::new(FfmpegThumbnailer::new(
                config.ffmpeg_bin.clone(),
                config.thumbnail_dir.clone(),
                config.tool_timeout(),
            )),
        }
    }
}

/// Every long-lived service, wired once per process
pub struct MediaServices {
    pub config: MediaConfig,
    pub library: Arc<MediaLibrary>,
    pub catalog: Arc<AssetCatalog>,
    pub sessions: Arc<RecordingSessionManager>,
    pub delivery: MediaDeliveryServer,
    /// What crash recovery found at startup
    pub recovery: RecoveryOutcome,
}

impl MediaServices {
    pub async fn bootstrap(config: MediaConfig) -> MediaResult<Self> {
        let tools = Toolchain::from_config(&config);
        Self::bootstrap_with(config, tools).await
    }

    /// Wire the services around `tools`
    ///
    /// Crash recovery completes before the session manager exists, so no
    /// session can start while orphaned chunks are still being stitched.
    pub async fn bootstrap_with(config: MediaConfig, tools: Toolchain) -> MediaResult<Self> {
        tokio::fs::create_dir_all(&config.recordings_dir).await?;
        tokio::fs::create_dir_all(&config.chunk_dir).await?;

        let library = Arc::new(MediaLibrary::new());
        let resolver = Arc::new(DurationResolver::new(tools.prober));
        let catalog = Arc::new(AssetCatalog::new(library.clone(), resolver.clone()));

        scan::scan_recordings(&config.recordings_dir, &catalog).await;

        let recovery = CrashRecoveryScanner::new(
            config.chunk_dir.clone(),
            config.recordings_dir.clone(),
            config.default_extension.clone(),
            catalog.clone(),
        )
        .recover()
        .await?;

        let sessions = Arc::new(RecordingSessionManager::new(
            config.chunk_dir.clone(),
            config.recordings_dir.clone(),
            config.default_extension.clone(),
            catalog.clone(),
        ));

        let remux = Arc::new(RemuxCache::new(resolver, tools.remuxer, config.readable_check_timeout()));
        let delivery = MediaDeliveryServer::new(library.clone(), remux, tools.thumbnails);

        info!(
            "🚀 Media services ready: {} asset(s), {} recovered",
            library.len(),
            recovery.recovered.len()
        );

        Ok(MediaServices {
            config,
            library,
            catalog,
            sessions,
            delivery,
            recovery,
        })
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            sessions: self.sessions.clone(),
            delivery: self.delivery.clone(),
            max_chunk_bytes: self.config.max_chunk_bytes,
        }
    }
}
