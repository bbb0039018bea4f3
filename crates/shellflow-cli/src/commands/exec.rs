//! `shellflow exec` — Run one command to completion.

use std::collections::HashMap;

use shellflow_core::process::{CommandExecution, ExecRequest};
use shellflow_core::state::AppState;

use super::print_json;

/// Parse a `KEY=VALUE` pair given to `--env`.
pub fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

pub async fn execute(
    state: &AppState,
    command: &str,
    cwd: &str,
    timeout_ms: Option<u64>,
    env: Vec<(String, String)>,
) -> CommandExecution {
    let request = ExecRequest {
        command: command.to_string(),
        working_directory: cwd.to_string(),
        timeout_ms,
        env: env.into_iter().collect::<HashMap<_, _>>(),
    };
    state.runner.run(&request).await
}

/// Print the execution record and return its exit code.
pub async fn run(
    state: &AppState,
    command: &str,
    cwd: &str,
    timeout_ms: Option<u64>,
    env: Vec<(String, String)>,
) -> Result<i32, String> {
    let execution = execute(state, command, cwd, timeout_ms, env).await;
    let value = serde_json::to_value(&execution)
        .map_err(|e| format!("Failed to encode execution: {}", e))?;
    print_json(&value);
    Ok(execution.exit_code.unwrap_or(1))
}
