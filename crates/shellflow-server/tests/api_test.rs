//! HTTP-level tests for the shellflow server.
//!
//! Each test starts a server on an ephemeral port backed by an in-memory
//! SQLite database and talks to it with `reqwest`.

#![cfg(unix)]

use std::sync::Arc;

use shellflow_core::state::{AppState, AppStateInner};
use shellflow_core::{Database, EngineConfig};
use shellflow_server::{start_server_with_state, ServerConfig};

async fn start() -> String {
    let db = Database::open(":memory:").expect("Failed to open in-memory database");
    let engine = EngineConfig {
        stop_grace_period_ms: 300,
        ..EngineConfig::default()
    };
    let state: AppState = Arc::new(AppStateInner::new(db, engine.clone()));
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        db_path: ":memory:".to_string(),
        engine,
    };
    let addr = start_server_with_state(config, state)
        .await
        .expect("server should start");
    format!("http://{}", addr)
}

fn tmp_dir() -> String {
    std::env::temp_dir().to_string_lossy().to_string()
}

/// Split an SSE body into `(event name, data)` pairs.
fn sse_events(body: &str) -> Vec<(Option<String>, serde_json::Value)> {
    body.split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .filter_map(|block| {
            let mut name = None;
            let mut data = None;
            for line in block.lines() {
                if let Some(v) = line.strip_prefix("event:") {
                    name = Some(v.trim().to_string());
                } else if let Some(v) = line.strip_prefix("data:") {
                    data = serde_json::from_str(v.trim()).ok();
                }
            }
            data.map(|d| (name, d))
        })
        .collect()
}

#[tokio::test]
async fn test_health() {
    let base = start().await;
    let body: serde_json::Value = reqwest::get(format!("{}/api/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["server"], "shellflow-server");
}

#[tokio::test]
async fn test_exec_returns_execution() {
    let base = start().await;
    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/api/exec", base))
        .json(&serde_json::json!({
            "command": "echo hi; echo oops 1>&2; exit 3",
            "workingDirectory": tmp_dir(),
        }))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["state"], "failed");
    assert_eq!(body["exitCode"], 3);
    assert_eq!(body["stdout"], "hi\n");
    assert_eq!(body["stderr"], "oops\n");
}

#[tokio::test]
async fn test_exec_rejects_empty_command() {
    let base = start().await;
    let res = reqwest::Client::new()
        .post(format!("{}/api/exec", base))
        .json(&serde_json::json!({ "command": "  ", "workingDirectory": tmp_dir() }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stream_ends_with_single_exit_frame() {
    let base = start().await;
    let res = reqwest::Client::new()
        .post(format!("{}/api/exec/stream", base))
        .json(&serde_json::json!({
            "command": "echo one; echo two 1>&2",
            "workingDirectory": tmp_dir(),
        }))
        .send()
        .await
        .unwrap();
    assert!(res.headers().contains_key("x-session-id"));

    let frames = sse_events(&res.text().await.unwrap());
    let exits: Vec<_> = frames.iter().filter(|(_, f)| f["type"] == "exit").collect();
    assert_eq!(exits.len(), 1);
    assert_eq!(exits[0].1["code"], 0);
    assert_eq!(frames.last().unwrap().1["type"], "exit");

    let stdout: String = frames
        .iter()
        .filter(|(_, f)| f["type"] == "stdout")
        .filter_map(|(_, f)| f["text"].as_str())
        .collect();
    assert_eq!(stdout, "one\n");
}

#[tokio::test]
async fn test_stream_stop_by_id() {
    let base = start().await;
    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/api/exec/stream", base))
        .json(&serde_json::json!({ "command": "sleep 5", "workingDirectory": tmp_dir() }))
        .send()
        .await
        .unwrap();
    let session_id = res.headers()["x-session-id"].to_str().unwrap().to_string();

    let stop = client
        .post(format!("{}/api/exec/sessions/{}/stop", base, session_id))
        .send()
        .await
        .unwrap();
    assert!(stop.status().is_success());

    let frames = sse_events(&res.text().await.unwrap());
    let (_, exit) = frames.last().unwrap();
    assert_eq!(exit["type"], "exit");
    assert_eq!(exit["code"], 130);
}

#[tokio::test]
async fn test_stop_and_cancel_unknown_ids() {
    let base = start().await;
    let client = reqwest::Client::new();
    let stop = client
        .post(format!("{}/api/exec/sessions/nope/stop", base))
        .send()
        .await
        .unwrap();
    assert_eq!(stop.status(), reqwest::StatusCode::NOT_FOUND);

    let cancel = client
        .post(format!("{}/api/workflows/runs/nope/cancel", base))
        .send()
        .await
        .unwrap();
    assert_eq!(cancel.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_workflow_crud() {
    let base = start().await;
    let client = reqwest::Client::new();

    let created: serde_json::Value = client
        .post(format!("{}/api/workflows", base))
        .json(&serde_json::json!({
            "name": "Build",
            "steps": [{ "id": "a", "type": "command", "command": "echo A" }],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["workflow"]["id"].as_str().unwrap().to_string();
    assert!(!id.is_empty());

    let updated = client
        .put(format!("{}/api/workflows/{}", base, id))
        .json(&serde_json::json!({
            "name": "Build and test",
            "steps": [
                { "id": "a", "type": "command", "command": "echo A" },
                { "id": "b", "type": "command", "command": "echo B" },
            ],
        }))
        .send()
        .await
        .unwrap();
    assert!(updated.status().is_success());

    let fetched: serde_json::Value = client
        .get(format!("{}/api/workflows/{}", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["name"], "Build and test");
    assert_eq!(fetched["steps"].as_array().unwrap().len(), 2);

    let list: serde_json::Value = client
        .get(format!("{}/api/workflows", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["workflows"].as_array().unwrap().len(), 1);

    let deleted = client
        .delete(format!("{}/api/workflows/{}", base, id))
        .send()
        .await
        .unwrap();
    assert!(deleted.status().is_success());

    let missing = client
        .get(format!("{}/api/workflows/{}", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_workflow_rejects_duplicate_step_ids() {
    let base = start().await;
    let res = reqwest::Client::new()
        .post(format!("{}/api/workflows", base))
        .json(&serde_json::json!({
            "name": "Dup",
            "steps": [
                { "id": "a", "type": "command", "command": "true" },
                { "id": "a", "type": "command", "command": "true" },
            ],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_run_streams_events_and_persists_run() {
    let base = start().await;
    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/api/workflows/run", base))
        .json(&serde_json::json!({
            "workflowId": "wf-1",
            "workingDirectory": tmp_dir(),
            "steps": [
                { "id": "a", "type": "command", "command": "echo A" },
                { "id": "b", "type": "command", "command": "echo {{previousOutput}}B" },
            ],
        }))
        .send()
        .await
        .unwrap();
    let run_id = res.headers()["x-run-id"].to_str().unwrap().to_string();

    let events = sse_events(&res.text().await.unwrap());
    let names: Vec<&str> = events
        .iter()
        .filter_map(|(name, _)| name.as_deref())
        .collect();
    assert_eq!(
        names,
        vec!["step-start", "step-complete", "step-start", "step-complete", "run-complete"]
    );
    assert_eq!(events[3].1["output"], "AB");
    assert_eq!(events[4].1["status"], "completed");
    assert_eq!(events[4].1["runId"], run_id.as_str());

    let run: serde_json::Value = client
        .get(format!("{}/api/workflows/runs/{}", base, run_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(run["status"], "completed");
    assert_eq!(run["workflowId"], "wf-1");

    let runs: serde_json::Value = client
        .get(format!("{}/api/workflows/runs?workflowId=wf-1", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(runs["runs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_run_cancel_by_id() {
    let base = start().await;
    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/api/workflows/run", base))
        .json(&serde_json::json!({
            "workflowId": "wf-slow",
            "workingDirectory": tmp_dir(),
            "steps": [
                { "id": "a", "type": "command", "command": "sleep 5" },
                { "id": "b", "type": "command", "command": "echo never" },
            ],
        }))
        .send()
        .await
        .unwrap();
    let run_id = res.headers()["x-run-id"].to_str().unwrap().to_string();

    let cancel = client
        .post(format!("{}/api/workflows/runs/{}/cancel", base, run_id))
        .send()
        .await
        .unwrap();
    assert!(cancel.status().is_success());

    let events = sse_events(&res.text().await.unwrap());
    let (name, data) = events.last().unwrap();
    assert_eq!(name.as_deref(), Some("run-complete"));
    assert_eq!(data["status"], "cancelled");
    assert!(!events
        .iter()
        .any(|(name, data)| name.as_deref() == Some("step-start") && data["stepId"] == "b"));
}

#[tokio::test]
async fn test_run_client_disconnect_cancels_run() {
    let base = start().await;
    let client = reqwest::Client::new();
    let mut res = client
        .post(format!("{}/api/workflows/run", base))
        .json(&serde_json::json!({
            "workflowId": "wf-left",
            "workingDirectory": tmp_dir(),
            "steps": [
                { "id": "a", "type": "command", "command": "sleep 10" },
                { "id": "b", "type": "command", "command": "echo never" },
            ],
        }))
        .send()
        .await
        .unwrap();
    let run_id = res.headers()["x-run-id"].to_str().unwrap().to_string();

    let mut seen = String::new();
    while !seen.contains("step-start") {
        let chunk = res.chunk().await.unwrap().expect("stream ended early");
        seen.push_str(&String::from_utf8_lossy(&chunk));
    }
    drop(res);

    let started = std::time::Instant::now();
    let status = loop {
        let res = client
            .get(format!("{}/api/workflows/runs/{}", base, run_id))
            .send()
            .await
            .unwrap();
        if res.status().is_success() {
            let run: serde_json::Value = res.json().await.unwrap();
            break run["status"].as_str().unwrap_or_default().to_string();
        }
        assert!(
            started.elapsed() < std::time::Duration::from_secs(5),
            "run was not persisted after the client left"
        );
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    };
    assert_eq!(status, "cancelled");
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
}
