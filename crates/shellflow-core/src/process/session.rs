//! Streaming execution sessions.
//!
//! A session runs one command and pushes [`ExecFrame`]s to an unbounded
//! channel as output arrives, ending with exactly one `Exit` frame. The
//! channel being unbounded means a slow observer never stalls the pipes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::group::{self, ProcessGroup, StopSignal};
use super::{drain_readers, exit_code_of, settle_readers, shell_command, Drain, Utf8Chunker};
use crate::config::{
    EngineConfig, CANCELLED_EXIT_CODE, SPAWN_FAILURE_EXIT_CODE, TIMEOUT_EXIT_CODE,
};

/// One record of the streaming protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExecFrame {
    Stdout { text: String },
    Stderr { text: String },
    /// Terminal frame. `duration` is in milliseconds.
    Exit { code: i32, duration: u64 },
}

impl ExecFrame {
    pub fn is_exit(&self) -> bool {
        matches!(self, ExecFrame::Exit { .. })
    }
}

/// Why the wait on the child ended.
enum Race {
    Exited(std::io::Result<std::process::ExitStatus>),
    Deadline,
    Stopped { disconnected: bool },
}

/// Cloneable stop handle for a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: String,
    stop: CancellationToken,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Request a two-phase stop. Idempotent.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }
}

pub struct StreamingExecutionSession {
    id: String,
    command: String,
    working_directory: String,
    env: HashMap<String, String>,
    timeout: Duration,
    config: EngineConfig,
    stop: CancellationToken,
}

impl StreamingExecutionSession {
    pub fn new(
        command: impl Into<String>,
        working_directory: impl Into<String>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            command: command.into(),
            working_directory: working_directory.into(),
            env: HashMap::new(),
            timeout: config.session_timeout(),
            config: config.clone(),
            stop: CancellationToken::new(),
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id.clone(),
            stop: self.stop.clone(),
        }
    }

    /// Run on a background task; returns the stop handle and the frame stream.
    pub fn spawn(self) -> (SessionHandle, UnboundedReceiver<ExecFrame>) {
        let handle = self.handle();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            self.run(tx).await;
        });
        (handle, rx)
    }

    /// Run to completion, pushing frames to `tx`. Returns the exit code that
    /// was sent in the terminal frame. Dropping the receiver stops the
    /// command the same way [`SessionHandle::stop`] does.
    pub async fn run(self, tx: UnboundedSender<ExecFrame>) -> i32 {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.timeout;
        let tag = short_id(&self.id);

        tracing::debug!(
            "[Session:{}] Starting `{}` in {}",
            tag,
            self.command,
            self.working_directory
        );

        let mut command = shell_command(
            &self.config.shell,
            &self.command,
            &self.working_directory,
            &self.env,
        );
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("[Session:{}] Failed to spawn: {}", tag, e);
                let _ = tx.send(ExecFrame::Stderr { text: e.to_string() });
                let _ = tx.send(ExecFrame::Exit {
                    code: SPAWN_FAILURE_EXIT_CODE,
                    duration: started.elapsed().as_millis() as u64,
                });
                return SPAWN_FAILURE_EXIT_CODE;
            }
        };
        let group = ProcessGroup::of(&child);

        let readers = vec![
            spawn_forwarder(child.stdout.take(), tx.clone(), |text| ExecFrame::Stdout { text }),
            spawn_forwarder(child.stderr.take(), tx.clone(), |text| ExecFrame::Stderr { text }),
        ];

        let race = tokio::select! {
            status = child.wait() => Race::Exited(status),
            _ = tokio::time::sleep_until(deadline) => Race::Deadline,
            _ = self.stop.cancelled() => Race::Stopped { disconnected: false },
            _ = tx.closed() => Race::Stopped { disconnected: true },
        };

        let code = match race {
            Race::Exited(Ok(status)) => {
                let stop = async {
                    tokio::select! {
                        _ = self.stop.cancelled() => {}
                        _ = tx.closed() => {}
                    }
                };
                let grace = self.config.stop_grace_period();
                match drain_readers(readers, &mut child, group, deadline, stop, grace).await {
                    Drain::Interrupted => {
                        tracing::info!("[Session:{}] Stopped with output still open", tag);
                        CANCELLED_EXIT_CODE
                    }
                    Drain::Finished => exit_code_of(&status),
                }
            }
            Race::Exited(Err(e)) => {
                tracing::warn!("[Session:{}] Wait failed: {}", tag, e);
                let _ = group::kill_now(&mut child, group).await;
                settle_readers(readers).await;
                SPAWN_FAILURE_EXIT_CODE
            }
            Race::Deadline => {
                tracing::info!("[Session:{}] Timed out after {}ms", tag, self.timeout.as_millis());
                let _ = tx.send(ExecFrame::Stderr {
                    text: format!("\nSession timed out after {}ms\n", self.timeout.as_millis()),
                });
                let _ = group::kill_now(&mut child, group).await;
                settle_readers(readers).await;
                TIMEOUT_EXIT_CODE
            }
            Race::Stopped { disconnected } => {
                if disconnected {
                    tracing::info!("[Session:{}] Observer disconnected, stopping", tag);
                } else {
                    tracing::info!("[Session:{}] Stop requested", tag);
                }
                let grace = self.config.stop_grace_period();
                let status = group::stop_gracefully(&mut child, group, grace).await;
                if let Some(g) = group {
                    g.signal(StopSignal::Kill);
                }
                settle_readers(readers).await;
                status.map(|s| exit_code_of(&s)).unwrap_or(CANCELLED_EXIT_CODE)
            }
        };

        let duration = started.elapsed().as_millis() as u64;
        tracing::debug!("[Session:{}] Exited with {} after {}ms", tag, code, duration);
        // Readers are joined, so nothing can follow this frame.
        let _ = tx.send(ExecFrame::Exit { code, duration });
        code
    }
}

fn spawn_forwarder<R, F>(
    reader: Option<R>,
    tx: UnboundedSender<ExecFrame>,
    frame: F,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    F: Fn(String) -> ExecFrame + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut reader) = reader else { return };
        let mut chunker = Utf8Chunker::default();
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let text = chunker.push(&buf[..n]);
                    if !text.is_empty() {
                        // A gone observer is handled by the session; keep draining.
                        let _ = tx.send(frame(text));
                    }
                }
            }
        }
        let rest = chunker.finish();
        if !rest.is_empty() {
            let _ = tx.send(frame(rest));
        }
    })
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Live sessions addressable by id, so a stop request can arrive on a
/// different connection from the stream itself.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, handle: SessionHandle) {
        self.sessions.write().await.insert(handle.id.clone(), handle);
    }

    pub async fn remove(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.write().await.remove(id)
    }

    /// Stop a live session. Returns `false` if no session has that id.
    pub async fn stop(&self, id: &str) -> bool {
        match self.sessions.read().await.get(id) {
            Some(handle) => {
                handle.stop();
                true
            }
            None => false,
        }
    }

    pub async fn list(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Register and run `session` in the background; it is removed from the
    /// registry once its exit frame has been sent.
    pub async fn spawn(
        &self,
        session: StreamingExecutionSession,
    ) -> (SessionHandle, UnboundedReceiver<ExecFrame>) {
        let handle = session.handle();
        self.register(handle.clone()).await;

        let (tx, rx) = mpsc::unbounded_channel();
        let sessions = self.sessions.clone();
        let id = handle.id.clone();
        tokio::spawn(async move {
            session.run(tx).await;
            sessions.write().await.remove(&id);
        });
        (handle, rx)
    }
}
