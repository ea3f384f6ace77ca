//! Serves registered media and thumbnails by media id.
//!
//! Responses are plain values so the HTTP layer only has to copy status,
//! headers and body across. Every failure inside a request becomes an error
//! response; nothing here propagates to the caller.

use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use log::{debug, error, warn};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use crate::error::{MediaError, MediaResult};
use crate::library::MediaIdRegistry;
use crate::remux::RemuxCache;
use crate::thumbnail::ThumbnailGenerator;

pub const CONTENT_TYPE_WEBM: &str = "video/webm";
pub const CONTENT_TYPE_MP4: &str = "video/mp4";
pub const CONTENT_TYPE_JPEG: &str = "image/jpeg";

const CORS_HEADERS: &[(&str, &str)] = &[
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, OPTIONS"),
    ("Access-Control-Allow-Headers", "Range"),
    ("Access-Control-Expose-Headers", "Content-Length, Content-Range, Accept-Ranges"),
];

pub enum ResponseBody {
    Empty,
    Bytes(Vec<u8>),
    /// File positioned at the first byte to send, limited to the span length
    File(Take<File>),
}

pub struct MediaResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl MediaResponse {
    fn new(status: u16, body: ResponseBody) -> Self {
        let headers = CORS_HEADERS
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        MediaResponse { status, headers, body }
    }

    fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Empty 204 answering a CORS preflight
    pub fn preflight() -> Self {
        MediaResponse::new(204, ResponseBody::Empty).header("Access-Control-Max-Age", "86400")
    }

    /// Error response carrying `message` as a plain-text body
    pub fn error(status: u16, message: &str) -> Self {
        let body = message.as_bytes().to_vec();
        MediaResponse::new(status, ResponseBody::Empty)
            .header("Content-Type", "text/plain; charset=utf-8")
            .header("Content-Length", body.len().to_string())
            .with_body(ResponseBody::Bytes(body))
    }

    fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = body;
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Drain the body into memory
    pub async fn read_body(self) -> std::io::Result<Vec<u8>> {
        match self.body {
            ResponseBody::Empty => Ok(Vec::new()),
            ResponseBody::Bytes(bytes) => Ok(bytes),
            ResponseBody::File(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await?;
                Ok(buf)
            }
        }
    }
}

impl From<MediaError> for MediaResponse {
    fn from(e: MediaError) -> Self {
        MediaResponse::error(e.status_code(), &e.to_string())
    }
}

/// Media bytes and thumbnail endpoints over the id registry
#[derive(Clone)]
pub struct MediaDeliveryServer {
    registry: Arc<dyn MediaIdRegistry>,
    remux: Arc<RemuxCache>,
    thumbnails: Arc<dyn ThumbnailGenerator>,
}

impl MediaDeliveryServer {
    pub fn new(
        registry: Arc<dyn MediaIdRegistry>,
        remux: Arc<RemuxCache>,
        thumbnails: Arc<dyn ThumbnailGenerator>,
    ) -> Self {
        MediaDeliveryServer {
            registry,
            remux,
            thumbnails,
        }
    }

    /// `media_ref` is a media id with an optional extension-like suffix
    pub async fn serve_media(&self, media_ref: &str, range: Option<&str>) -> MediaResponse {
        match self.media_response(media_ref, range).await {
            Ok(response) => response,
            Err(e) => {
                log_failure(media_ref, &e);
                e.into()
            }
        }
    }

    pub async fn serve_thumbnail(&self, media_ref: &str) -> MediaResponse {
        let id = strip_media_suffix(media_ref);
        let Some(path) = self.registry.resolve(id) else {
            debug!("Thumbnail requested for unknown media {}", id);
            return MediaError::AssetNotFound(id.to_string()).into();
        };

        let Some(thumbnail) = self.thumbnails.generate(&path).await else {
            return MediaResponse::error(500, "Thumbnail generation failed");
        };

        match tokio::fs::read(&thumbnail).await {
            Ok(bytes) => MediaResponse::new(200, ResponseBody::Empty)
                .header("Content-Type", CONTENT_TYPE_JPEG)
                .header("Content-Length", bytes.len().to_string())
                .with_body(ResponseBody::Bytes(bytes)),
            Err(e) => {
                warn!("Cannot read thumbnail {}: {}", thumbnail.display(), e);
                MediaResponse::error(404, "Thumbnail not found")
            }
        }
    }

    async fn media_response(&self, media_ref: &str, range: Option<&str>) -> MediaResult<MediaResponse> {
        let id = strip_media_suffix(media_ref);
        let path = self
            .registry
            .resolve(id)
            .ok_or_else(|| MediaError::AssetNotFound(id.to_string()))?;

        check_regular_file(&path).await?;

        let content_type = content_type_for(&path);
        let served = if content_type == CONTENT_TYPE_WEBM {
            self.remux.ensure_playable(&path).await
        } else {
            path
        };

        let file_size = check_regular_file(&served).await?;
        let mut file = File::open(&served).await?;

        let Some((start, end)) = range.and_then(|r| parse_range(r, file_size)) else {
            if let Some(r) = range {
                debug!("Ignoring unusable Range {:?} for {} ({} bytes)", r, served.display(), file_size);
            }
            return Ok(MediaResponse::new(200, ResponseBody::Empty)
                .header("Content-Type", content_type)
                .header("Content-Length", file_size.to_string())
                .header("Accept-Ranges", "bytes")
                .with_body(ResponseBody::File(file.take(file_size))));
        };

        let chunk_size = end - start + 1;
        file.seek(SeekFrom::Start(start)).await?;

        Ok(MediaResponse::new(206, ResponseBody::Empty)
            .header("Content-Type", content_type)
            .header("Content-Length", chunk_size.to_string())
            .header("Content-Range", format!("bytes {}-{}/{}", start, end, file_size))
            .header("Accept-Ranges", "bytes")
            .with_body(ResponseBody::File(file.take(chunk_size))))
    }
}

fn log_failure(media_ref: &str, e: &MediaError) {
    match e.status_code() {
        500.. => error!("❌ Serving {} failed: {}", media_ref, e),
        _ => debug!("Serving {}: {}", media_ref, e),
    }
}

/// Size of `path` if it is a regular file
async fn check_regular_file(path: &Path) -> MediaResult<u64> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| MediaError::PathNotAccessible(path.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(MediaError::NotAFile(path.to_path_buf()));
    }
    Ok(metadata.len())
}

/// `abc.webm` -> `abc`; only the final suffix is dropped
pub fn strip_media_suffix(media_ref: &str) -> &str {
    match media_ref.rsplit_once('.') {
        Some((id, _)) if !id.is_empty() => id,
        _ => media_ref,
    }
}

pub fn content_type_for(path: &Path) -> &'static str {
    let is_webm = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("webm"));
    if is_webm {
        CONTENT_TYPE_WEBM
    } else {
        CONTENT_TYPE_MP4
    }
}

/// Inclusive byte span for `bytes=<start>-[<end>]`
///
/// A missing end means the last byte. An end past the file is clamped. Anything
/// else unusable (other units, multiple ranges, suffix ranges, a start outside
/// the file) yields `None` so the caller serves the whole file.
pub fn parse_range(header: &str, file_size: u64) -> Option<(u64, u64)> {
    let spec = header.trim().strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;

    let start: u64 = parse_digits(start)?;
    if start >= file_size {
        return None;
    }

    let last = file_size - 1;
    let end = if end.trim().is_empty() {
        last
    } else {
        parse_digits(end)?.min(last)
    };

    (start <= end).then_some((start, end))
}

fn parse_digits(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}
