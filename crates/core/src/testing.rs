//! Fakes shared by unit tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use async_trait::async_trait;
use parking_lot::RwLock;
use crate::duration::DurationResolver;
use crate::error::{MediaError, MediaResult};
use crate::ffprobe::{FFProbeData, FFProbeFormat, FFProbePackets, MediaProber, StreamSelector};
use crate::library::{AssetCatalog, MediaLibrary};

/// Prober answering from a path -> seconds table; unknown paths have no duration
#[derive(Default)]
pub struct TableProber {
    pub durations: RwLock<HashMap<PathBuf, f64>>,
}

#[async_trait]
impl MediaProber for TableProber {
    async fn probe(&self, path: &Path) -> MediaResult<FFProbeData> {
        if !path.exists() {
            return Err(MediaError::PathNotAccessible(path.to_path_buf()));
        }
        let duration = self.durations.read().get(path).map(|d| d.to_string());
        Ok(FFProbeData {
            format: FFProbeFormat { duration, ..Default::default() },
            streams: vec![],
        })
    }

    async fn packet_timestamps(&self, _path: &Path, _stream: StreamSelector) -> MediaResult<FFProbePackets> {
        Ok(FFProbePackets::default())
    }
}

pub fn resolver(prober: Arc<TableProber>) -> Arc<DurationResolver> {
    Arc::new(DurationResolver::new(prober))
}

pub fn catalog(library: Arc<MediaLibrary>) -> Arc<AssetCatalog> {
    Arc::new(AssetCatalog::new(library, resolver(Arc::new(TableProber::default()))))
}

/// Set in a test process that runs under `ulimit -f`
const FILE_SIZE_LIMIT_ENV: &str = "VLOG_TEST_FILE_SIZE_LIMITED";

/// Bytes past which writes fail with `EFBIG` under the limit (64 blocks of at most 1 KiB)
pub const FILE_SIZE_LIMIT: usize = 64 * 1024;

pub fn under_file_size_limit() -> bool {
    std::env::var_os(FILE_SIZE_LIMIT_ENV).is_some()
}

/// Run the single test `test_name` again in a child test process whose file size is limited
///
/// `SIGXFSZ` is ignored so an oversized write fails with `EFBIG` instead of killing the process.
#[cfg(unix)]
pub fn rerun_under_file_size_limit(test_name: &str) {
    let exe = std::env::current_exe().unwrap();
    let output = std::process::Command::new("sh")
        .arg("-c")
        .arg("trap '' XFSZ; ulimit -f 64 && exec \"$0\" \"$@\"")
        .arg(&exe)
        .args([test_name, "--exact", "--test-threads=1"])
        .env(FILE_SIZE_LIMIT_ENV, "1")
        .output()
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success() && stdout.contains("1 passed"),
        "{} failed under the file size limit:\n{}\n{}",
        test_name,
        stdout,
        String::from_utf8_lossy(&output.stderr)
    );
}
