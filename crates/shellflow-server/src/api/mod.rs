pub mod exec;
pub mod workflows;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all sub-routes.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/api/exec", exec::router())
        .nest("/api/workflows", workflows::router())
}

/// Working directory used when a request leaves it out.
pub(crate) fn default_working_directory() -> String {
    std::env::current_dir()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| ".".to_string())
}

/// Response headers carrying an id the client needs for stop/cancel calls.
pub(crate) fn id_header(
    name: &'static str,
    id: &str,
) -> Result<axum::http::HeaderMap, crate::error::ServerError> {
    let mut headers = axum::http::HeaderMap::new();
    let value = axum::http::HeaderValue::from_str(id)
        .map_err(|e| crate::error::ServerError::Internal(format!("Invalid header value: {}", e)))?;
    headers.insert(name, value);
    Ok(headers)
}
