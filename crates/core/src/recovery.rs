use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use chrono::Utc;
use humansize::{format_size, DECIMAL};
use log::{debug, error, info, warn};
use walkdir::WalkDir;
use crate::chunks::{self, parse_chunk_file_name};
use crate::error::{MediaError, MediaResult};
use crate::library::{AssetCatalog, MediaAsset};

/// Chunk files left behind by one interrupted session
#[derive(Debug, Clone)]
pub struct ChunkGroup {
    pub session_id: String,
    /// Container extension recorded in the chunk names, if any
    pub extension: Option<String>,
    /// Ascending by sequence
    pub chunks: Vec<(u64, PathBuf)>,
}

impl ChunkGroup {
    fn paths(&self) -> Vec<PathBuf> {
        self.chunks.iter().map(|(_, path)| path.clone()).collect()
    }
}

#[derive(Debug, Default)]
pub struct RecoveryOutcome {
    pub recovered: Vec<PathBuf>,
    pub assets: Vec<MediaAsset>,
    /// Sessions whose chunks could not be stitched; their chunks stay on disk
    pub failed: Vec<String>,
}

/// Turns orphaned chunk files into recordings, once per process before any session starts
pub struct CrashRecoveryScanner {
    chunk_dir: PathBuf,
    recordings_dir: PathBuf,
    extension: String,
    catalog: Arc<AssetCatalog>,
}

impl CrashRecoveryScanner {
    pub fn new(chunk_dir: PathBuf, recordings_dir: PathBuf, extension: String, catalog: Arc<AssetCatalog>) -> Self {
        CrashRecoveryScanner {
            chunk_dir,
            recordings_dir,
            extension,
            catalog,
        }
    }

    pub async fn recover(&self) -> MediaResult<RecoveryOutcome> {
        let chunk_dir = self.chunk_dir.clone();
        let groups = tokio::task::spawn_blocking(move || find_chunk_groups(&chunk_dir))
            .await
            .map_err(|e| MediaError::Io(std::io::Error::other(e)))??;

        let mut outcome = RecoveryOutcome::default();
        if groups.is_empty() {
            debug!("No orphaned chunks in {}", self.chunk_dir.display());
            return Ok(outcome);
        }

        info!("🩹 Found {} interrupted session(s) in {}", groups.len(), self.chunk_dir.display());

        for group in groups {
            match self.recover_group(&group).await {
                Ok(Some(output)) => outcome.recovered.push(output),
                Ok(None) => {}
                Err(e) => {
                    error!("❌ Could not recover session {}: {}", group.session_id, e);
                    outcome.failed.push(group.session_id.clone());
                }
            }
        }

        for output in &outcome.recovered {
            match self.catalog.register(output).await {
                Ok(asset) => outcome.assets.push(asset),
                Err(e) => warn!("Recovered {} but could not register it: {}", output.display(), e),
            }
        }

        info!(
            "Recovery finished: {} recovered, {} failed",
            outcome.recovered.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }

    /// `Ok(None)` when the group held no bytes at all
    async fn recover_group(&self, group: &ChunkGroup) -> MediaResult<Option<PathBuf>> {
        let output = self.recordings_dir.join(format!(
            "recovered-{}-{}.{}",
            Utc::now().format("%Y%m%d-%H%M%S"),
            group.session_id,
            group.extension.as_deref().unwrap_or(&self.extension)
        ));

        let paths = group.paths();
        let total = chunks::concat_into(&paths, &output).await?;
        chunks::remove_chunks(&paths).await;

        if total == 0 {
            warn!("Session {} left only empty chunks, discarding", group.session_id);
            tokio::fs::remove_file(&output).await?;
            return Ok(None);
        }

        info!(
            "✅ Recovered session {}: {} chunk(s), {} -> {}",
            group.session_id,
            group.chunks.len(),
            format_size(total, DECIMAL),
            output.display()
        );
        Ok(Some(output))
    }
}

/// Group the chunk files directly inside `chunk_dir` by session
///
/// A missing directory yields no groups. Foreign files are ignored.
pub fn find_chunk_groups(chunk_dir: &Path) -> MediaResult<Vec<ChunkGroup>> {
    if !chunk_dir.exists() {
        return Ok(Vec::new());
    }

    let mut by_session: BTreeMap<String, (Option<String>, Vec<(u64, PathBuf)>)> = BTreeMap::new();
    for entry in WalkDir::new(chunk_dir).min_depth(1).max_depth(1).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Error reading chunk directory entry: {}", e);
                continue;
            }
        };

        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        let Some(chunk) = parse_chunk_file_name(name) else {
            continue;
        };
        let (extension, chunks) = by_session.entry(chunk.session_id).or_default();
        if extension.is_none() {
            *extension = chunk.extension;
        }
        chunks.push((chunk.sequence, entry.into_path()));
    }

    Ok(by_session
        .into_iter()
        .map(|(session_id, (extension, mut chunks))| {
            chunks.sort_by_key(|(sequence, _)| *sequence);
            ChunkGroup {
                session_id,
                extension,
                chunks,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunks::chunk_file_name;
    use crate::library::{MediaIdRegistry, MediaLibrary};
    use crate::testing;

    struct Fixture {
        dir: tempfile::TempDir,
        library: Arc<MediaLibrary>,
        scanner: CrashRecoveryScanner,
    }

    impl Fixture {
        fn chunk_dir(&self) -> PathBuf {
            self.dir.path().join("chunks")
        }

        fn write_chunk(&self, session: &str, sequence: u64, bytes: &[u8]) -> PathBuf {
            std::fs::create_dir_all(self.chunk_dir()).unwrap();
            let path = self.chunk_dir().join(chunk_file_name(session, sequence, "webm"));
            std::fs::write(&path, bytes).unwrap();
            path
        }
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let library = Arc::new(MediaLibrary::new());
        let scanner = CrashRecoveryScanner::new(
            dir.path().join("chunks"),
            dir.path().join("vlogs"),
            "webm".to_string(),
            testing::catalog(library.clone()),
        );
        Fixture { dir, library, scanner }
    }

    #[tokio::test]
    async fn test_missing_chunk_dir_is_empty() {
        let fx = fixture();
        let outcome = fx.scanner.recover().await.unwrap();
        assert!(outcome.recovered.is_empty());
        assert!(outcome.failed.is_empty());
    }

    #[tokio::test]
    async fn test_recovers_in_sequence_order() {
        let fx = fixture();
        // Written out of order, and past the point where string sort would misorder
        let c2 = fx.write_chunk("session-a", 2, b"C");
        let c0 = fx.write_chunk("session-a", 0, b"A");
        let c10 = fx.write_chunk("session-a", 10, b"D");
        let c1 = fx.write_chunk("session-a", 1, b"B");

        let outcome = fx.scanner.recover().await.unwrap();
        assert_eq!(outcome.recovered.len(), 1);
        assert_eq!(std::fs::read(&outcome.recovered[0]).unwrap(), b"ABCD");
        for chunk in [c0, c1, c2, c10] {
            assert!(!chunk.exists());
        }

        let asset = &outcome.assets[0];
        assert_eq!(fx.library.resolve(&asset.id), Some(asset.absolute_path.clone()));
    }

    #[tokio::test]
    async fn test_sessions_recover_separately() {
        let fx = fixture();
        fx.write_chunk("session-a", 0, b"alpha-");
        fx.write_chunk("session-a", 1, b"one");
        fx.write_chunk("session-b", 0, b"beta");
        std::fs::write(fx.chunk_dir().join("notes.txt"), b"ignore me").unwrap();

        let outcome = fx.scanner.recover().await.unwrap();
        assert_eq!(outcome.recovered.len(), 2);
        assert_eq!(fx.library.len(), 2);

        let mut contents: Vec<Vec<u8>> = outcome.recovered.iter().map(|p| std::fs::read(p).unwrap()).collect();
        contents.sort();
        assert_eq!(contents, vec![b"alpha-one".to_vec(), b"beta".to_vec()]);
        assert!(fx.chunk_dir().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_broken_group_does_not_block_others() {
        let fx = fixture();
        fx.write_chunk("healthy", 0, b"fine");
        // A directory with a chunk name cannot be read as a chunk
        let broken = fx.chunk_dir().join(chunk_file_name("broken", 0, "webm"));
        std::fs::create_dir_all(&broken).unwrap();

        let outcome = fx.scanner.recover().await.unwrap();
        assert_eq!(outcome.failed, vec!["broken".to_string()]);
        assert_eq!(outcome.recovered.len(), 1);
        assert_eq!(std::fs::read(&outcome.recovered[0]).unwrap(), b"fine");
        assert!(broken.exists(), "failed groups are left for inspection");
    }

    #[tokio::test]
    async fn test_empty_group_is_discarded() {
        let fx = fixture();
        let chunk = fx.write_chunk("silent", 0, b"");

        let outcome = fx.scanner.recover().await.unwrap();
        assert!(outcome.recovered.is_empty());
        assert!(outcome.failed.is_empty());
        assert!(!chunk.exists());
        assert!(fx.library.is_empty());
    }

    #[tokio::test]
    async fn test_shared_id_prefix_recovers_to_distinct_files() {
        let fx = fixture();
        fx.write_chunk("5f0c7a2e-aaaa", 0, b"first");
        fx.write_chunk("5f0c7a2e-bbbb", 0, b"second");

        let outcome = fx.scanner.recover().await.unwrap();
        assert_eq!(outcome.recovered.len(), 2);
        assert_ne!(outcome.recovered[0], outcome.recovered[1]);

        let mut contents: Vec<Vec<u8>> = outcome.recovered.iter().map(|p| std::fs::read(p).unwrap()).collect();
        contents.sort();
        assert_eq!(contents, vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[tokio::test]
    async fn test_recovered_file_keeps_recorded_extension() {
        let fx = fixture();
        std::fs::create_dir_all(fx.chunk_dir()).unwrap();
        std::fs::write(fx.chunk_dir().join(chunk_file_name("mp4-session", 0, "mp4")), b"ftyp").unwrap();
        std::fs::write(fx.chunk_dir().join("legacy_0000000000.chunk"), b"old").unwrap();

        let outcome = fx.scanner.recover().await.unwrap();
        let mut extensions: Vec<String> = outcome
            .recovered
            .iter()
            .map(|p| p.extension().unwrap().to_string_lossy().to_string())
            .collect();
        extensions.sort();
        assert_eq!(extensions, vec!["mp4".to_string(), "webm".to_string()]);
    }

    #[test]
    fn test_find_chunk_groups_sorts_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for seq in [9u64, 100, 0, 11] {
            std::fs::write(dir.path().join(chunk_file_name("s", seq, "webm")), b"x").unwrap();
        }
        let groups = find_chunk_groups(dir.path()).unwrap();
        assert_eq!(groups.len(), 1);
        let order: Vec<u64> = groups[0].chunks.iter().map(|(seq, _)| *seq).collect();
        assert_eq!(order, vec![0, 9, 11, 100]);
    }
}
