use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the capture-and-delivery pipeline
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("A recording session is already active: {0}")]
    SessionConflict(String),

    #[error("No active recording session with id: {0}")]
    SessionNotFound(String),

    #[error("Recording session {0} has no chunks, nothing to save")]
    EmptySession(String),

    #[error("Media tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("{tool} failed (exit code {exit_code}): {stderr}")]
    ToolFailed {
        tool: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("{tool} timed out after {secs} seconds and was killed")]
    ToolTimedOut { tool: String, secs: u64 },

    #[error("Remux failed for {path}: {reason}")]
    RemuxFailure { path: PathBuf, reason: String },

    #[error("Vlog not found")]
    AssetNotFound(String),

    #[error("File not found: {0}")]
    PathNotAccessible(PathBuf),

    #[error("Not a file: {0}")]
    NotAFile(PathBuf),

    #[error("Invalid probe output: {0}")]
    InvalidProbeOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// HTTP-style status code used when this error reaches a response
    pub fn status_code(&self) -> u16 {
        match self {
            MediaError::SessionConflict(_) => 409,
            MediaError::SessionNotFound(_) => 404,
            MediaError::EmptySession(_) => 422,
            MediaError::AssetNotFound(_) => 404,
            MediaError::PathNotAccessible(_) => 404,
            MediaError::NotAFile(_) => 400,
            MediaError::ToolUnavailable(_) => 503,
            _ => 500,
        }
    }

    /// Stable machine-readable code for structured error bodies
    pub fn code(&self) -> &'static str {
        match self {
            MediaError::SessionConflict(_) => "SESSION_CONFLICT",
            MediaError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            MediaError::EmptySession(_) => "EMPTY_SESSION",
            MediaError::ToolUnavailable(_) => "TOOL_UNAVAILABLE",
            MediaError::ToolFailed { .. } => "TOOL_FAILED",
            MediaError::ToolTimedOut { .. } => "TOOL_TIMED_OUT",
            MediaError::RemuxFailure { .. } => "REMUX_FAILURE",
            MediaError::AssetNotFound(_) => "ASSET_NOT_FOUND",
            MediaError::PathNotAccessible(_) => "PATH_NOT_ACCESSIBLE",
            MediaError::NotAFile(_) => "NOT_A_FILE",
            MediaError::InvalidProbeOutput(_) => "INVALID_PROBE_OUTPUT",
            MediaError::Io(_) => "IO_ERROR",
        }
    }
}

pub type MediaResult<T> = Result<T, MediaError>;
