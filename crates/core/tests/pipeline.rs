//! End-to-end capture, recovery and delivery without external tools.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use async_trait::async_trait;
use parking_lot::RwLock;
use vlog_core::chunks::chunk_file_name;
use vlog_core::ffprobe::{FFProbePackets, StreamSelector};
use vlog_core::{
    FFProbeData, FFProbeFormat, MediaConfig, MediaError, MediaIdRegistry, MediaProber, MediaResult,
    MediaServices, Remuxer, SessionConfig, ThumbnailGenerator, Toolchain,
};

#[derive(Default)]
struct Durations(RwLock<HashMap<PathBuf, f64>>);

#[async_trait]
impl MediaProber for Durations {
    async fn probe(&self, path: &Path) -> MediaResult<FFProbeData> {
        Ok(FFProbeData {
            format: FFProbeFormat {
                duration: self.0.read().get(path).map(|d| d.to_string()),
                ..Default::default()
            },
            streams: vec![],
        })
    }

    async fn packet_timestamps(&self, _path: &Path, _stream: StreamSelector) -> MediaResult<FFProbePackets> {
        Ok(FFProbePackets::default())
    }
}

struct NoTools;

#[async_trait]
impl Remuxer for NoTools {
    async fn remux(&self, _source: &Path, _dest: &Path) -> MediaResult<()> {
        Err(MediaError::ToolUnavailable("ffmpeg".into()))
    }
}

#[async_trait]
impl ThumbnailGenerator for NoTools {
    async fn generate(&self, _path: &Path) -> Option<PathBuf> {
        None
    }
}

fn config(dir: &Path) -> MediaConfig {
    MediaConfig {
        chunk_dir: dir.join("chunks"),
        recordings_dir: dir.join("vlogs"),
        thumbnail_dir: dir.join("vlogs/.thumbnails"),
        ..MediaConfig::default_config()
    }
}

async fn services(dir: &Path) -> MediaServices {
    let tools = Toolchain {
        prober: Arc::new(Durations::default()),
        remuxer: Arc::new(NoTools),
        thumbnails: Arc::new(NoTools),
    };
    MediaServices::bootstrap_with(config(dir), tools).await.unwrap()
}

fn chunk(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

#[tokio::test]
async fn finalize_produces_exact_concatenation() {
    let dir = tempfile::tempdir().unwrap();
    let services = services(dir.path()).await;

    let parts = [chunk(10240, 1), chunk(10240, 2), chunk(5120, 3)];
    let id = services.sessions.start(SessionConfig::default()).await.unwrap();
    for part in &parts {
        services.sessions.append(&id, part).await.unwrap();
    }
    let asset = services.sessions.finalize(&id).await.unwrap();

    let written = std::fs::read(&asset.absolute_path).unwrap();
    assert_eq!(written.len(), 25600);
    assert_eq!(written, parts.concat());
    assert_eq!(services.library.resolve(&asset.id), Some(asset.absolute_path));
}

#[tokio::test]
async fn crashed_session_is_recovered_on_next_start() {
    let dir = tempfile::tempdir().unwrap();
    let parts = [chunk(4096, 7), chunk(100, 8), chunk(2048, 9)];

    {
        let first_run = services(dir.path()).await;
        let id = first_run.sessions.start(SessionConfig::default()).await.unwrap();
        for part in &parts {
            first_run.sessions.append(&id, part).await.unwrap();
        }
        // Process "dies" here without finalize
    }

    let second_run = services(dir.path()).await;
    assert_eq!(second_run.recovery.recovered.len(), 1);
    let recovered = &second_run.recovery.recovered[0];
    assert_eq!(std::fs::read(recovered).unwrap(), parts.concat());

    let leftover = std::fs::read_dir(dir.path().join("chunks")).unwrap().count();
    assert_eq!(leftover, 0, "chunk files are removed after recovery");

    let asset = &second_run.recovery.assets[0];
    assert_eq!(second_run.library.resolve(&asset.id).as_ref(), Some(recovered));
}

#[tokio::test]
async fn unrelated_files_in_chunk_dir_survive_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let chunks = dir.path().join("chunks");
    std::fs::create_dir_all(&chunks).unwrap();
    std::fs::write(chunks.join("README"), b"keep").unwrap();
    std::fs::write(chunks.join(chunk_file_name("abc", 0, "webm")), b"data").unwrap();

    let services = services(dir.path()).await;
    assert_eq!(services.recovery.recovered.len(), 1);
    assert!(chunks.join("README").exists());
}

#[tokio::test]
async fn ranged_delivery_of_finalized_recording() {
    let dir = tempfile::tempdir().unwrap();
    let services = services(dir.path()).await;

    let content = chunk(5000, 42);
    let id = services
        .sessions
        .start(SessionConfig { extension: Some("mp4".into()), label: None })
        .await
        .unwrap();
    services.sessions.append(&id, &content).await.unwrap();
    let asset = services.sessions.finalize(&id).await.unwrap();

    let response = services
        .delivery
        .serve_media(&format!("{}.mp4", asset.id), Some("bytes=1000-1999"))
        .await;
    assert_eq!(response.status, 206);
    assert_eq!(response.header_value("Content-Range"), Some("bytes 1000-1999/5000"));
    let body = response.read_body().await.unwrap();
    assert_eq!(body.len(), 1000);
    assert_eq!(body, &content[1000..2000]);
}

#[tokio::test]
async fn delivery_errors_for_unknown_and_vanished_media() {
    let dir = tempfile::tempdir().unwrap();
    let services = services(dir.path()).await;

    let unknown = services.delivery.serve_media("does-not-exist.webm", None).await;
    assert_eq!(unknown.status, 404);
    assert_eq!(unknown.read_body().await.unwrap(), b"Vlog not found");

    let id = services.sessions.start(SessionConfig::default()).await.unwrap();
    services.sessions.append(&id, b"short").await.unwrap();
    let asset = services.sessions.finalize(&id).await.unwrap();
    std::fs::remove_file(&asset.absolute_path).unwrap();

    let vanished = services.delivery.serve_media(&format!("{}.webm", asset.id), None).await;
    assert_eq!(vanished.status, 404);
}
