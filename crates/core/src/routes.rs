use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use log::{error, warn};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::delivery::{MediaDeliveryServer, MediaResponse, ResponseBody};
use crate::error::MediaError;
use crate::library::MediaAsset;
use crate::session::{RecordingSessionManager, SessionConfig};

/// Shared handles for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RecordingSessionManager>,
    pub delivery: MediaDeliveryServer,
    /// Largest chunk body `append` accepts
    pub max_chunk_bytes: usize,
}

/// Chunk ingestion and media delivery endpoints
pub fn router(state: AppState) -> Router {
    let chunk_limit = DefaultBodyLimit::max(state.max_chunk_bytes);
    Router::new()
        // Recording ingestion
        .route("/sessions", post(start_session_handler))
        .route("/sessions/{id}", delete(cancel_session_handler))
        .route("/sessions/{id}/chunks", post(append_chunk_handler).layer(chunk_limit))
        .route("/sessions/{id}/finalize", post(finalize_session_handler))
        // Delivery
        .route("/media/{media}", get(media_handler).options(preflight_handler))
        .route("/thumbnails/{media}", get(thumbnail_handler).options(preflight_handler))
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionResponse {
    pub session_id: String,
}

/// Start a recording. The body is an optional JSON `SessionConfig`.
async fn start_session_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<StartSessionResponse>, ApiError> {
    let config = if body.iter().all(u8::is_ascii_whitespace) {
        SessionConfig::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(format!("Invalid session config: {}", e)))?
    };

    let session_id = state.sessions.start(config).await?;
    Ok(Json(StartSessionResponse { session_id }))
}

async fn append_chunk_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    state.sessions.append(&id, &body).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn finalize_session_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<MediaAsset>, ApiError> {
    let asset = state.sessions.finalize(&id).await?;
    Ok(Json(asset))
}

async fn cancel_session_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.sessions.cancel(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Serve media bytes, honoring a `Range` header
async fn media_handler(
    Path(media): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let delivery = state.delivery.clone();
    let task = tokio::spawn(async move { delivery.serve_media(&media, range.as_deref()).await });
    settle(task).await
}

async fn thumbnail_handler(Path(media): Path<String>, State(state): State<AppState>) -> Response {
    let delivery = state.delivery.clone();
    let task = tokio::spawn(async move { delivery.serve_thumbnail(&media).await });
    settle(task).await
}

async fn preflight_handler() -> Response {
    into_http_response(MediaResponse::preflight())
}

/// A panicking delivery task becomes a 500 instead of taking the connection down
async fn settle(task: tokio::task::JoinHandle<MediaResponse>) -> Response {
    match task.await {
        Ok(response) => into_http_response(response),
        Err(e) => {
            error!("❌ Delivery task failed: {}", e);
            into_http_response(MediaResponse::error(500, "Internal error"))
        }
    }
}

pub fn into_http_response(response: MediaResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = match response.body {
        ResponseBody::Empty => Body::empty(),
        ResponseBody::Bytes(bytes) => Body::from(bytes),
        ResponseBody::File(reader) => Body::from_stream(ReaderStream::new(reader)),
    };

    let mut builder = Response::builder().status(status);
    for (name, value) in &response.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder.body(body).unwrap_or_else(|e| {
        error!("Invalid response headers: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}

/// Error response wrapper rendering `{code, message}`
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(message: String) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST",
            message,
        }
    }
}

impl From<MediaError> for ApiError {
    fn from(e: MediaError) -> Self {
        let status = match &e {
            MediaError::SessionConflict(_) => StatusCode::CONFLICT,
            MediaError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            MediaError::EmptySession(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError {
            status,
            code: e.code(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("API error: {}", self.message);
        } else {
            warn!("API error: {}", self.message);
        }

        let body = json!({ "code": self.code, "message": self.message });
        (self.status, Json(body)).into_response()
    }
}
