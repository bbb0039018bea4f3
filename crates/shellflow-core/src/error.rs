//! Core error types for Shellflow.
//!
//! `ServerError` is used at the API boundary (stores, HTTP handlers, CLI).
//! When the `axum` feature is enabled, it also implements `IntoResponse`
//! so it can be used directly as an axum handler error type.
//!
//! Command failures, timeouts and condition errors are *not* errors here:
//! they are reported inside `CommandExecution`, `WorkflowStepResult` and
//! progress frames.

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Problems with a workflow definition as authored.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("step at position {0} has an empty id")]
    EmptyStepId(usize),

    #[error("duplicate step id '{0}'")]
    DuplicateStepId(String),

    #[error("failed to parse workflow: {0}")]
    Parse(String),

    #[error("failed to read workflow file '{path}': {message}")]
    Io { path: String, message: String },
}

impl From<WorkflowError> for ServerError {
    fn from(err: WorkflowError) -> Self {
        ServerError::BadRequest(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// axum integration (opt-in via feature flag)
// ---------------------------------------------------------------------------

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let (status, message) = match &self {
            ServerError::Database(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ServerError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ServerError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}
