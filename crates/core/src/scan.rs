use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};
use crate::library::{AssetCatalog, MediaAsset};
use log::{debug, info, warn};

/// Media file extensions picked up from the recordings directory
pub const MEDIA_EXTENSIONS: &[&str] = &["webm", "mp4", "m4v", "mov", "mkv"];

/// Find existing recordings under `root`
///
/// Hidden directories (thumbnail cache), in-progress `.partial` files and
/// `*.seekable.*` remux outputs are skipped.
pub fn find_recordings(root: &Path) -> Vec<PathBuf> {
    let mut results = Vec::new();
    if !root.exists() {
        debug!("Recordings directory does not exist yet: {}", root.display());
        return results;
    }

    let mut entry_count = 0;
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));
    for entry in walker {
        entry_count += 1;

        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Error reading directory entry: {}", e);
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() || !is_recording(path) {
            continue;
        }

        debug!("Found recording: {}", path.display());
        results.push(path.to_path_buf());
    }

    debug!("Scanned {} entries in {}", entry_count, root.display());
    results
}

/// Register every recording under `root` with the catalog
pub async fn scan_recordings(root: &Path, catalog: &AssetCatalog) -> Vec<MediaAsset> {
    let dir = root.to_path_buf();
    let found = match tokio::task::spawn_blocking(move || find_recordings(&dir)).await {
        Ok(found) => found,
        Err(e) => {
            warn!("Recording scan of {} aborted: {}", root.display(), e);
            return Vec::new();
        }
    };

    let mut assets = Vec::with_capacity(found.len());
    for path in found {
        match catalog.register(&path).await {
            Ok(asset) => assets.push(asset),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }

    info!("📚 Library scan of {}: {} recording(s)", root.display(), assets.len());
    assets
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(|name| name.starts_with('.'))
}

fn is_recording(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with('.') || name.contains(".seekable.") {
        return false;
    }

    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());
    matches!(ext, Some(ext) if MEDIA_EXTENSIONS.contains(&ext.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{MediaIdRegistry, MediaLibrary};
    use crate::testing;
    use std::sync::Arc;

    #[test]
    fn test_is_recording() {
        assert!(is_recording(Path::new("/v/vlog-1.webm")));
        assert!(is_recording(Path::new("/v/Trip.MP4")));
        assert!(!is_recording(Path::new("/v/vlog-1.seekable.webm")));
        assert!(!is_recording(Path::new("/v/vlog-1.webm.partial")));
        assert!(!is_recording(Path::new("/v/notes.txt")));
        assert!(!is_recording(Path::new("/v/.hidden.webm")));
    }

    #[tokio::test]
    async fn test_scan_registers_recordings() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("2024/june")).unwrap();
        std::fs::create_dir_all(root.join(".thumbnails")).unwrap();
        std::fs::write(root.join("a.webm"), b"a").unwrap();
        std::fs::write(root.join("a.seekable.webm"), b"a").unwrap();
        std::fs::write(root.join("2024/june/b.mp4"), b"b").unwrap();
        std::fs::write(root.join("c.webm.partial"), b"c").unwrap();
        std::fs::write(root.join(".thumbnails/d.webm"), b"d").unwrap();

        let library = Arc::new(MediaLibrary::new());
        let assets = scan_recordings(root, &testing::catalog(library.clone())).await;

        assert_eq!(assets.len(), 2);
        assert_eq!(library.len(), 2);
        for asset in assets {
            assert_eq!(library.resolve(&asset.id), Some(asset.absolute_path));
        }
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let library = Arc::new(MediaLibrary::new());
        let assets = scan_recordings(Path::new("/no/such/vlogs"), &testing::catalog(library)).await;
        assert!(assets.is_empty());
    }
}
