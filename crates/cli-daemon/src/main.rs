use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn, LevelFilter};
use std::path::PathBuf;
use vlog_core::{routes, MediaConfig, MediaServices};

/// Vlog capture and playback daemon
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Override the listen address from the configuration
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose
    let mut logger = env_logger::Builder::new();
    logger.filter_level(if args.verbose { LevelFilter::Debug } else { LevelFilter::Info });
    logger.parse_default_env().format_timestamp_secs().init();

    let mut cfg = MediaConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        cfg.bind_addr = bind;
    }

    info!("Vlog daemon starting");
    info!("Configuration loaded:");
    info!("  Chunk dir: {}", cfg.chunk_dir.display());
    info!("  Recordings dir: {}", cfg.recordings_dir.display());
    info!("  Thumbnail dir: {}", cfg.thumbnail_dir.display());
    info!("  ffmpeg: {}, ffprobe: {}", cfg.ffmpeg_bin.display(), cfg.ffprobe_bin.display());
    info!("  Tool timeout: {}s", cfg.tool_timeout_secs);

    let bind_addr = cfg.bind_addr.clone();
    let services = MediaServices::bootstrap(cfg)
        .await
        .context("Failed to start media services")?;

    if !services.recovery.failed.is_empty() {
        warn!(
            "⚠️  {} interrupted session(s) could not be recovered; their chunks were left in {}",
            services.recovery.failed.len(),
            services.config.chunk_dir.display()
        );
    }

    let app = routes::router(services.app_state());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("🎬 Listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    if let Some(session) = services.sessions.active_session().await {
        warn!(
            "Shutting down during session {}; its chunks will be recovered on next start",
            session.session_id
        );
    }
    info!("Vlog daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("🛑 Shutdown requested");
}
