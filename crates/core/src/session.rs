use std::path::{Path, PathBuf};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use humansize::{format_size, DECIMAL};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;
use crate::chunks::{self, chunk_file_name};
use crate::error::{MediaError, MediaResult};
use crate::library::{AssetCatalog, MediaAsset};

/// Options sent by the capture frontend when a recording starts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Container extension of the captured stream, e.g. "webm"
    pub extension: Option<String>,
    pub label: Option<String>,
}

/// The one in-progress recording
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub next_sequence: u64,
    /// Container extension, also recorded in each chunk name for recovery
    pub extension: String,
    pub destination: PathBuf,
}

impl RecordingSession {
    fn chunk_paths(&self, chunk_dir: &Path) -> Vec<PathBuf> {
        (0..self.next_sequence)
            .map(|seq| chunk_dir.join(chunk_file_name(&self.session_id, seq, &self.extension)))
            .collect()
    }
}

#[derive(Debug)]
enum SessionState {
    Idle,
    Active(RecordingSession),
}

/// Accepts the chunk stream of a single active recording and turns it into a media file
pub struct RecordingSessionManager {
    chunk_dir: PathBuf,
    recordings_dir: PathBuf,
    default_extension: String,
    catalog: Arc<AssetCatalog>,
    state: Mutex<SessionState>,
}

impl RecordingSessionManager {
    pub fn new(
        chunk_dir: PathBuf,
        recordings_dir: PathBuf,
        default_extension: String,
        catalog: Arc<AssetCatalog>,
    ) -> Self {
        RecordingSessionManager {
            chunk_dir,
            recordings_dir,
            default_extension,
            catalog,
            state: Mutex::new(SessionState::Idle),
        }
    }

    pub async fn active_session(&self) -> Option<RecordingSession> {
        match &*self.state.lock().await {
            SessionState::Active(session) => Some(session.clone()),
            SessionState::Idle => None,
        }
    }

    /// Begin a new recording; fails with `SessionConflict` while one is active
    pub async fn start(&self, config: SessionConfig) -> MediaResult<String> {
        let mut state = self.state.lock().await;
        if let SessionState::Active(active) = &*state {
            warn!("Refusing to start: session {} is still recording", active.session_id);
            return Err(MediaError::SessionConflict(active.session_id.clone()));
        }

        tokio::fs::create_dir_all(&self.chunk_dir).await?;

        let session_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let extension = sanitize_extension(config.extension.as_deref())
            .unwrap_or(&self.default_extension)
            .to_string();
        let destination = self.recordings_dir.join(format!(
            "vlog-{}-{}.{}",
            started_at.format("%Y%m%d-%H%M%S"),
            &session_id[..8],
            extension
        ));

        info!(
            "🎙️ Started session {} ({}) -> {}",
            session_id,
            config.label.as_deref().unwrap_or("untitled"),
            destination.display()
        );

        *state = SessionState::Active(RecordingSession {
            session_id: session_id.clone(),
            started_at,
            next_sequence: 0,
            extension,
            destination,
        });
        Ok(session_id)
    }

    /// Persist the next chunk; returns its sequence number
    ///
    /// Chunks must arrive in send order, nothing is reordered here.
    pub async fn append(&self, session_id: &str, bytes: &[u8]) -> MediaResult<u64> {
        let mut state = self.state.lock().await;
        let session = match &mut *state {
            SessionState::Active(session) if session.session_id == session_id => session,
            _ => return Err(MediaError::SessionNotFound(session_id.to_string())),
        };

        let sequence = session.next_sequence;
        let path = self.chunk_dir.join(chunk_file_name(session_id, sequence, &session.extension));
        chunks::write_chunk(&path, bytes).await?;
        session.next_sequence += 1;

        debug!("Session {}: chunk {} ({} bytes)", session_id, sequence, bytes.len());
        Ok(sequence)
    }

    /// Concatenate the session's chunks into its destination and register it
    ///
    /// The manager is `Idle` afterwards whatever the outcome. When the
    /// concatenation itself fails the chunks stay on disk for crash recovery.
    pub async fn finalize(&self, session_id: &str) -> MediaResult<MediaAsset> {
        let mut state = self.state.lock().await;
        let session = take_session(&mut state, session_id)?;

        if session.next_sequence == 0 {
            warn!("Session {} finished without any chunks, nothing to save", session_id);
            return Err(MediaError::EmptySession(session_id.to_string()));
        }

        let chunk_paths = session.chunk_paths(&self.chunk_dir);
        let total = match chunks::concat_into(&chunk_paths, &session.destination).await {
            Ok(total) => total,
            Err(e) => {
                error!(
                    "❌ Failed to finalize session {}: {} (chunks kept for recovery)",
                    session_id, e
                );
                return Err(e);
            }
        };
        chunks::remove_chunks(&chunk_paths).await;
        drop(state);

        let elapsed = Utc::now() - session.started_at;
        info!(
            "✅ Finalized session {}: {} chunks, {} over {}s -> {}",
            session_id,
            chunk_paths.len(),
            format_size(total, DECIMAL),
            elapsed.num_seconds(),
            session.destination.display()
        );

        self.catalog.register(&session.destination).await
    }

    /// Stop the session and discard everything it captured
    pub async fn cancel(&self, session_id: &str) -> MediaResult<()> {
        let mut state = self.state.lock().await;
        let session = take_session(&mut state, session_id)?;

        let chunk_paths = session.chunk_paths(&self.chunk_dir);
        chunks::remove_chunks(&chunk_paths).await;

        info!("🗑️  Cancelled session {}, discarded {} chunk(s)", session_id, chunk_paths.len());
        Ok(())
    }
}

/// Move the matching active session out, leaving `Idle`
fn take_session(state: &mut SessionState, session_id: &str) -> MediaResult<RecordingSession> {
    match std::mem::replace(state, SessionState::Idle) {
        SessionState::Active(session) if session.session_id == session_id => Ok(session),
        other => {
            *state = other;
            Err(MediaError::SessionNotFound(session_id.to_string()))
        }
    }
}

fn sanitize_extension(extension: Option<&str>) -> Option<&str> {
    let ext = extension?.trim().trim_start_matches('.');
    if ext.is_empty() || ext.len() > 8 || !ext.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext)
}
