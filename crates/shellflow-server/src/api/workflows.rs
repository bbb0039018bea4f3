//! Workflow API - /api/workflows
//!
//! GET    /api/workflows                  - List stored definitions
//! POST   /api/workflows                  - Create a definition
//! GET    /api/workflows/{id}             - Get a definition
//! PUT    /api/workflows/{id}             - Replace a definition
//! DELETE /api/workflows/{id}             - Delete a definition
//! POST   /api/workflows/run              - Run steps, streaming progress as SSE
//! GET    /api/workflows/runs             - List finished runs (?workflowId=)
//! GET    /api/workflows/runs/{id}        - Get a finished run
//! POST   /api/workflows/runs/{id}/cancel - Cancel an in-flight run

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::sse::{Event, Sse},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::convert::Infallible;
use std::pin::Pin;
use tokio::sync::mpsc;

use shellflow_core::workflow::{
    validate_steps, RunRequest, SpawnedRun, WorkflowDefinition, WorkflowEvent, WorkflowRun,
};

use super::{default_working_directory, id_header};
use crate::error::ServerError;
use crate::state::AppState;

type SseStream = Pin<Box<dyn tokio_stream::Stream<Item = Result<Event, Infallible>> + Send>>;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_workflows).post(create_workflow))
        .route("/run", post(run_workflow))
        .route("/runs", get(list_runs))
        .route("/runs/{id}", get(get_run))
        .route("/runs/{id}/cancel", post(cancel_run))
        .route(
            "/{id}",
            get(get_workflow).put(update_workflow).delete(delete_workflow),
        )
}

async fn list_workflows(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let workflows = state.workflow_store.list().await?;
    Ok(Json(serde_json::json!({ "workflows": workflows })))
}

async fn get_workflow(
    State(state): State<AppState>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Result<Json<WorkflowDefinition>, ServerError> {
    state
        .workflow_store
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("Workflow {} not found", id)))
}

async fn create_workflow(
    State(state): State<AppState>,
    Json(mut body): Json<WorkflowDefinition>,
) -> Result<Json<serde_json::Value>, ServerError> {
    if body.id.trim().is_empty() {
        body.id = uuid::Uuid::new_v4().to_string();
    } else if state.workflow_store.get(&body.id).await?.is_some() {
        return Err(ServerError::Conflict(format!(
            "Workflow {} already exists",
            body.id
        )));
    }

    let now = chrono::Utc::now();
    body.created_at = Some(now);
    body.updated_at = Some(now);

    state.workflow_store.save(&body).await?;
    tracing::info!("[Workflow API] created {} ({})", body.id, body.name);
    Ok(Json(serde_json::json!({ "workflow": body })))
}

async fn update_workflow(
    State(state): State<AppState>,
    axum::extract::Path(id): axum::extract::Path<String>,
    Json(mut body): Json<WorkflowDefinition>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let existing = state
        .workflow_store
        .get(&id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("Workflow {} not found", id)))?;

    body.id = id;
    body.created_at = existing.created_at;
    body.updated_at = Some(chrono::Utc::now());

    state.workflow_store.save(&body).await?;
    Ok(Json(serde_json::json!({ "workflow": body })))
}

async fn delete_workflow(
    State(state): State<AppState>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    if !state.workflow_store.delete(&id).await? {
        return Err(ServerError::NotFound(format!("Workflow {} not found", id)));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn run_workflow(
    State(state): State<AppState>,
    Json(body): Json<RunRequest>,
) -> Result<(HeaderMap, Sse<SseStream>), ServerError> {
    validate_steps(&body.steps)?;

    let working_directory = body
        .working_directory
        .filter(|d| !d.is_empty())
        .unwrap_or_else(default_working_directory);

    let SpawnedRun {
        handle,
        mut events,
        join,
    } = state
        .engine
        .spawn(&body.workflow_id, body.steps, working_directory);
    let run_id = handle.run_id().to_string();
    state.runs.register(handle.clone()).await;
    let headers = id_header("x-run-id", &run_id)?;

    tracing::info!(
        "[Workflow API] run {} started for workflow {}",
        run_id,
        body.workflow_id
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<WorkflowEvent>();
    let forward_state = state.clone();
    tokio::spawn(async move {
        // run-complete is held back until the run has been persisted.
        let mut terminal = None;
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) if event.is_terminal() => terminal = Some(event),
                    Some(event) => {
                        if tx.send(event).is_err() {
                            handle.cancel();
                        }
                    }
                    None => break,
                },
                _ = tx.closed(), if !handle.is_cancelled() => {
                    tracing::info!(
                        "[Workflow API] client left run {}, cancelling",
                        handle.run_id()
                    );
                    handle.cancel();
                }
            }
        }

        match join.await {
            Ok(run) => persist_run(&forward_state, &run).await,
            Err(e) => tracing::error!("[Workflow API] run {} task failed: {}", handle.run_id(), e),
        }
        if let Some(event) = terminal {
            let _ = tx.send(event);
        }
        forward_state.runs.remove(handle.run_id()).await;
    });

    let frames = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            yield Ok::<_, Infallible>(
                Event::default().event(event.name()).data(event.data().to_string())
            );
            if terminal {
                break;
            }
        }
    };

    let stream: SseStream = Box::pin(frames);
    Ok((headers, Sse::new(stream)))
}

async fn persist_run(state: &AppState, run: &WorkflowRun) {
    if let Err(e) = state.run_store.save(run).await {
        tracing::error!("[Workflow API] failed to save run {}: {}", run.id, e);
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListRunsQuery {
    workflow_id: Option<String>,
}

async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let runs = match query.workflow_id.as_deref() {
        Some(workflow_id) if !workflow_id.is_empty() => {
            state.run_store.list_by_workflow(workflow_id).await?
        }
        _ => state.run_store.list().await?,
    };
    let active = state.runs.active().await;
    Ok(Json(serde_json::json!({ "runs": runs, "active": active })))
}

async fn get_run(
    State(state): State<AppState>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Result<Json<WorkflowRun>, ServerError> {
    state
        .run_store
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("Run {} not found", id)))
}

async fn cancel_run(
    State(state): State<AppState>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    if !state.runs.cancel(&id).await {
        return Err(ServerError::NotFound(format!("Run {} not found", id)));
    }
    tracing::info!("[Workflow API] cancel requested for run {}", id);
    Ok(Json(serde_json::json!({ "cancelled": true, "runId": id })))
}
