//! ProcessRunner — run one shell command to completion under a deadline.
//!
//! The deadline timer, natural completion and (optional) cancellation race
//! in a single `select!`; the losing futures are dropped, so exactly one
//! terminal state is ever produced for an execution.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::group::{self, ProcessGroup, StopSignal};
use super::{
    drain_readers, exit_code_of, settle_readers, shell_command, CappedText, Drain, Utf8Chunker,
};
use crate::config::{
    EngineConfig, CANCELLED_EXIT_CODE, SPAWN_FAILURE_EXIT_CODE, TIMEOUT_EXIT_CODE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionState {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Killed,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionState::Pending | ExecutionState::Running)
    }
}

/// A command execution request as received from a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecRequest {
    pub command: String,
    pub working_directory: String,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Record of one command execution, owned by whoever requested it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandExecution {
    pub id: String,
    pub command: String,
    pub working_directory: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    pub timeout_ms: u64,
    pub state: ExecutionState,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl CommandExecution {
    pub fn new(
        command: &str,
        working_directory: &str,
        env: &HashMap<String, String>,
        timeout: Duration,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            command: command.to_string(),
            working_directory: working_directory.to_string(),
            env: env.clone(),
            timeout_ms: timeout.as_millis() as u64,
            state: ExecutionState::Pending,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            started_at: None,
            ended_at: None,
            duration_ms: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == ExecutionState::Succeeded
    }

    /// stdout, with stderr appended on a new line when there is any
    /// (even if stdout is empty).
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    fn finish(&mut self, state: ExecutionState, exit_code: i32, started: Instant) {
        self.state = state;
        self.exit_code = Some(exit_code);
        self.ended_at = Some(Utc::now());
        self.duration_ms = Some(started.elapsed().as_millis() as u64);
    }
}

enum Race {
    Exited(std::io::Result<std::process::ExitStatus>),
    Deadline,
    Cancelled,
}

type SharedText = Arc<Mutex<CappedText>>;

/// Runs shell commands to completion.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    config: EngineConfig,
}

impl ProcessRunner {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute a request, falling back to the configured default timeout.
    pub async fn run(&self, request: &ExecRequest) -> CommandExecution {
        let timeout = request
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.default_exec_timeout());
        self.execute(
            &request.command,
            &request.working_directory,
            &request.env,
            timeout,
        )
        .await
    }

    pub async fn execute(
        &self,
        command: &str,
        working_directory: &str,
        env: &HashMap<String, String>,
        timeout: Duration,
    ) -> CommandExecution {
        self.execute_with_cancel(
            command,
            working_directory,
            env,
            timeout,
            &CancellationToken::new(),
        )
        .await
    }

    /// Like [`execute`](Self::execute), but `cancel` stops the command with an
    /// interrupt, a grace period and then a kill; the result is `Killed`.
    pub async fn execute_with_cancel(
        &self,
        command: &str,
        working_directory: &str,
        env: &HashMap<String, String>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> CommandExecution {
        let mut execution = CommandExecution::new(command, working_directory, env, timeout);
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + timeout;
        execution.state = ExecutionState::Running;
        execution.started_at = Some(Utc::now());

        tracing::debug!(
            "[ProcessRunner] Executing `{}` in {} (timeout: {}ms)",
            command,
            working_directory,
            timeout.as_millis()
        );

        let mut child = match shell_command(&self.config.shell, command, working_directory, env)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("[ProcessRunner] Failed to spawn `{}`: {}", command, e);
                execution.stderr = e.to_string();
                execution.finish(ExecutionState::Failed, SPAWN_FAILURE_EXIT_CODE, started);
                return execution;
            }
        };
        let group = ProcessGroup::of(&child);

        let stdout_buf: SharedText = Arc::new(Mutex::new(CappedText::new(self.config.stdout_cap)));
        let stderr_buf: SharedText = Arc::new(Mutex::new(CappedText::new(self.config.stderr_cap)));
        let readers = vec![
            spawn_capture(child.stdout.take(), stdout_buf.clone()),
            spawn_capture(child.stderr.take(), stderr_buf.clone()),
        ];

        let race = tokio::select! {
            status = child.wait() => Race::Exited(status),
            _ = tokio::time::sleep_until(deadline) => Race::Deadline,
            _ = cancel.cancelled() => Race::Cancelled,
        };

        let (state, exit_code, notice) = match race {
            Race::Exited(Ok(status)) => {
                // Descendants may still hold the pipes open; they get until
                // the deadline unless the caller cancels first.
                let drain = drain_readers(
                    readers,
                    &mut child,
                    group,
                    deadline,
                    cancel.cancelled(),
                    self.config.stop_grace_period(),
                )
                .await;
                if drain == Drain::Interrupted {
                    tracing::info!(
                        "[ProcessRunner] `{}` cancelled, stopped leftover processes",
                        command
                    );
                    (ExecutionState::Killed, CANCELLED_EXIT_CODE, None)
                } else {
                    let code = exit_code_of(&status);
                    let state = if status.success() {
                        ExecutionState::Succeeded
                    } else {
                        ExecutionState::Failed
                    };
                    (state, code, None)
                }
            }
            Race::Exited(Err(e)) => {
                let _ = group::kill_now(&mut child, group).await;
                settle_readers(readers).await;
                (
                    ExecutionState::Failed,
                    SPAWN_FAILURE_EXIT_CODE,
                    Some(format!("Failed to wait for command: {}", e)),
                )
            }
            Race::Deadline => {
                tracing::info!(
                    "[ProcessRunner] `{}` exceeded {}ms, killing process group",
                    command,
                    timeout.as_millis()
                );
                let _ = group::kill_now(&mut child, group).await;
                settle_readers(readers).await;
                (
                    ExecutionState::TimedOut,
                    TIMEOUT_EXIT_CODE,
                    Some(format!("Command timed out after {}ms", timeout.as_millis())),
                )
            }
            Race::Cancelled => {
                tracing::info!("[ProcessRunner] `{}` cancelled, stopping", command);
                let status =
                    group::stop_gracefully(&mut child, group, self.config.stop_grace_period())
                        .await;
                // The leader is gone; make sure the rest of its group is too.
                if let Some(g) = group {
                    g.signal(StopSignal::Kill);
                }
                settle_readers(readers).await;
                let code = status
                    .map(|s| exit_code_of(&s))
                    .unwrap_or(CANCELLED_EXIT_CODE);
                (ExecutionState::Killed, code, None)
            }
        };

        execution.stdout = take_text(&stdout_buf).await;
        execution.stderr = take_text(&stderr_buf).await;
        if let Some(notice) = notice {
            if !execution.stderr.is_empty() && !execution.stderr.ends_with('\n') {
                execution.stderr.push('\n');
            }
            execution.stderr.push_str(&notice);
        }
        execution.finish(state, exit_code, started);

        tracing::debug!(
            "[ProcessRunner] `{}` finished: {:?} (exit {}) in {}ms",
            command,
            execution.state,
            exit_code,
            execution.duration_ms.unwrap_or_default()
        );
        execution
    }
}

fn spawn_capture<R>(reader: Option<R>, buffer: SharedText) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut reader) = reader else { return };
        let mut chunker = Utf8Chunker::default();
        let mut buf = [0u8; 8192];
        // Keep reading past the cap so the child never blocks on a full pipe.
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let text = chunker.push(&buf[..n]);
                    buffer.lock().await.push(&text);
                }
            }
        }
        let rest = chunker.finish();
        buffer.lock().await.push(&rest);
    })
}

async fn take_text(buffer: &SharedText) -> String {
    let mut guard = buffer.lock().await;
    std::mem::replace(&mut *guard, CappedText::new(0)).into_string()
}
