//! Command Execution API - /api/exec
//!
//! POST /api/exec                     - Run a command to completion
//! POST /api/exec/stream              - Run a command with SSE output frames
//! GET  /api/exec/sessions            - List live streaming sessions
//! POST /api/exec/sessions/{id}/stop  - Stop a streaming session

use axum::{
    extract::State,
    http::HeaderMap,
    response::sse::{Event, Sse},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;

use shellflow_core::process::{CommandExecution, ExecRequest, StreamingExecutionSession};

use super::{default_working_directory, id_header};
use crate::error::ServerError;
use crate::state::AppState;

type SseStream = Pin<Box<dyn tokio_stream::Stream<Item = Result<Event, Infallible>> + Send>>;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(execute))
        .route("/stream", post(stream))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}/stop", post(stop_session))
}

async fn execute(
    State(state): State<AppState>,
    Json(body): Json<ExecRequest>,
) -> Result<Json<CommandExecution>, ServerError> {
    if body.command.trim().is_empty() {
        return Err(ServerError::BadRequest("command is required".to_string()));
    }
    tracing::info!("[Exec API] run: {}", body.command);
    Ok(Json(state.runner.run(&body).await))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamRequest {
    command: String,
    working_directory: Option<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    timeout_ms: Option<u64>,
}

async fn stream(
    State(state): State<AppState>,
    Json(body): Json<StreamRequest>,
) -> Result<(HeaderMap, Sse<SseStream>), ServerError> {
    if body.command.trim().is_empty() {
        return Err(ServerError::BadRequest("command is required".to_string()));
    }

    let working_directory = body
        .working_directory
        .filter(|d| !d.is_empty())
        .unwrap_or_else(default_working_directory);

    let mut session = StreamingExecutionSession::new(body.command, working_directory, &state.config)
        .with_env(body.env);
    if let Some(ms) = body.timeout_ms {
        session = session.with_timeout(Duration::from_millis(ms));
    }

    let (handle, mut rx) = state.sessions.spawn(session).await;
    tracing::info!("[Exec API] stream session {} started", handle.id());
    let headers = id_header("x-session-id", handle.id())?;

    // Dropping the receiver (client went away) stops the session.
    let frames = async_stream::stream! {
        while let Some(frame) = rx.recv().await {
            let data = serde_json::to_string(&frame).unwrap_or_default();
            yield Ok::<_, Infallible>(Event::default().data(data));
            if frame.is_exit() {
                break;
            }
        }
    };

    let stream: SseStream = Box::pin(frames);
    Ok((headers, Sse::new(stream)))
}

async fn list_sessions(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions = state.sessions.list().await;
    Json(serde_json::json!({ "sessions": sessions }))
}

async fn stop_session(
    State(state): State<AppState>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    if !state.sessions.stop(&id).await {
        return Err(ServerError::NotFound(format!("Session {} not found", id)));
    }
    tracing::info!("[Exec API] stop requested for session {}", id);
    Ok(Json(serde_json::json!({ "stopped": true, "sessionId": id })))
}
