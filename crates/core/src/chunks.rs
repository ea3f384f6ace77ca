use std::path::{Path, PathBuf};
use log::warn;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use crate::error::MediaResult;

pub const CHUNK_EXTENSION: &str = "chunk";

/// Session id, ordering key and container extension decoded from a chunk filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkName {
    pub session_id: String,
    pub sequence: u64,
    /// `None` for chunks written without a container extension
    pub extension: Option<String>,
}

/// `<sessionId>_<sequence:010>.<ext>.chunk`
pub fn chunk_file_name(session_id: &str, sequence: u64, extension: &str) -> String {
    format!("{}_{:010}.{}.{}", session_id, sequence, extension, CHUNK_EXTENSION)
}

pub fn parse_chunk_file_name(name: &str) -> Option<ChunkName> {
    let stem = name.strip_suffix(CHUNK_EXTENSION)?.strip_suffix('.')?;
    let (stem, extension) = match stem.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() && ext.bytes().all(|b| b.is_ascii_alphanumeric()) => {
            (stem, Some(ext.to_string()))
        }
        Some(_) => return None,
        None => (stem, None),
    };
    let (session_id, sequence) = stem.rsplit_once('_')?;
    if session_id.is_empty() || sequence.is_empty() || !sequence.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(ChunkName {
        session_id: session_id.to_string(),
        sequence: sequence.parse().ok()?,
        extension,
    })
}

/// Write one chunk durably; an existing chunk is never overwritten
///
/// On failure nothing is left at `path`, so the same sequence can be retried.
pub async fn write_chunk(path: &Path, bytes: &[u8]) -> MediaResult<()> {
    let file = OpenOptions::new().write(true).create_new(true).open(path).await?;
    if let Err(e) = write_durably(file, bytes).await {
        let _ = fs::remove_file(path).await;
        return Err(e.into());
    }
    Ok(())
}

/// Background writes report their errors on flush, not on `sync_data`
async fn write_durably(mut file: File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_data().await
}

/// Concatenate `chunks` in the given order into `output`
///
/// Bytes go to a `.partial` sibling first and are renamed into place, so `output`
/// either holds the complete concatenation or does not exist.
pub async fn concat_into(chunks: &[PathBuf], output: &Path) -> MediaResult<u64> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).await?;
    }
    let partial = partial_path(output);

    let result = async {
        let mut out = File::create(&partial).await?;
        let mut total = 0u64;
        for chunk in chunks {
            let mut input = File::open(chunk).await?;
            total += tokio::io::copy(&mut input, &mut out).await?;
        }
        out.flush().await?;
        out.sync_all().await?;
        Ok::<u64, std::io::Error>(total)
    }
    .await;

    match result {
        Ok(total) => {
            fs::rename(&partial, output).await?;
            Ok(total)
        }
        Err(e) => {
            let _ = fs::remove_file(&partial).await;
            Err(e.into())
        }
    }
}

/// Best-effort deletion; failures are logged
pub async fn remove_chunks(chunks: &[PathBuf]) {
    for chunk in chunks {
        if let Err(e) = fs::remove_file(chunk).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to delete chunk {}: {}", chunk.display(), e);
            }
        }
    }
}

pub fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    output.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_chunk_names_round_trip() {
        let name = chunk_file_name("5f0c7a2e-1b7d-4c1e-9a51-0e0cf1a2b3c4", 42, "webm");
        assert_eq!(name, "5f0c7a2e-1b7d-4c1e-9a51-0e0cf1a2b3c4_0000000042.webm.chunk");
        assert_eq!(
            parse_chunk_file_name(&name),
            Some(ChunkName {
                session_id: "5f0c7a2e-1b7d-4c1e-9a51-0e0cf1a2b3c4".to_string(),
                sequence: 42,
                extension: Some("webm".to_string()),
            })
        );
    }

    #[test]
    fn test_foreign_names_are_ignored() {
        assert_eq!(parse_chunk_file_name("notes.txt"), None);
        assert_eq!(parse_chunk_file_name("_0000000001.chunk"), None);
        assert_eq!(parse_chunk_file_name("abc_.chunk"), None);
        assert_eq!(parse_chunk_file_name("abc_12x.chunk"), None);
        assert_eq!(parse_chunk_file_name("abc_1.chunk.partial"), None);
        assert_eq!(parse_chunk_file_name("abcchunk"), None);
        assert_eq!(parse_chunk_file_name("abc_1..chunk"), None);
        assert_eq!(parse_chunk_file_name("abc_1.we/bm.chunk"), None);
    }

    #[test]
    fn test_chunk_without_extension_still_parses() {
        let parsed = parse_chunk_file_name("abc_0000000003.chunk").unwrap();
        assert_eq!(parsed.session_id, "abc");
        assert_eq!(parsed.sequence, 3);
        assert_eq!(parsed.extension, None);
    }

    #[test]
    fn test_sequence_beyond_padding_still_parses() {
        let name = chunk_file_name("s", 12_345_678_901, "mp4");
        assert_eq!(parse_chunk_file_name(&name).map(|c| c.sequence), Some(12_345_678_901));
    }

    #[tokio::test]
    async fn test_write_chunk_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(chunk_file_name("s", 0, "webm"));
        write_chunk(&path, b"first").await.unwrap();
        assert!(write_chunk(&path, b"second").await.is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"first");
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_write_leaves_no_chunk() {
        if !testing::under_file_size_limit() {
            testing::rerun_under_file_size_limit("chunks::tests::test_failed_write_leaves_no_chunk");
            return;
        }

        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join(chunk_file_name("s", 0, "webm"));

            let oversized = vec![9u8; testing::FILE_SIZE_LIMIT * 4];
            assert!(write_chunk(&path, &oversized).await.is_err(), "a short write must be reported");
            assert!(!path.exists(), "the truncated chunk must be removed");

            // The same sequence can be written again
            write_chunk(&path, b"retry").await.unwrap();
            assert_eq!(std::fs::read(&path).unwrap(), b"retry");
        });
    }

    #[tokio::test]
    async fn test_concat_into_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut chunks = Vec::new();
        for (i, part) in [&b"abc"[..], &b""[..], &b"defg"[..]].iter().enumerate() {
            let path = dir.path().join(chunk_file_name("s", i as u64, "webm"));
            write_chunk(&path, part).await.unwrap();
            chunks.push(path);
        }

        let output = dir.path().join("out/joined.webm");
        assert_eq!(concat_into(&chunks, &output).await.unwrap(), 7);
        assert_eq!(std::fs::read(&output).unwrap(), b"abcdefg");
        assert!(!partial_path(&output).exists());
    }

    #[tokio::test]
    async fn test_concat_failure_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let missing = vec![dir.path().join(chunk_file_name("s", 0, "webm"))];
        let output = dir.path().join("joined.webm");

        assert!(concat_into(&missing, &output).await.is_err());
        assert!(!output.exists());
        assert!(!partial_path(&output).exists());
    }
}
