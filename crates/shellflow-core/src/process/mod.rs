//! Shell command execution.
//!
//! Every command runs through the configured shell as the leader of its own
//! process group, so a timeout or stop request reaches everything the
//! command spawned.
//!
//! - [`ProcessRunner`] — run to completion, return one [`CommandExecution`]
//! - [`StreamingExecutionSession`] — push [`ExecFrame`]s as output arrives
//! - [`SessionRegistry`] — live sessions addressable by id for stop requests

pub mod group;
pub mod runner;
pub mod session;

pub use group::{ProcessGroup, StopSignal};
pub use runner::{CommandExecution, ExecRequest, ExecutionState, ProcessRunner};
pub use session::{ExecFrame, SessionHandle, SessionRegistry, StreamingExecutionSession};

use std::collections::HashMap;
use std::future::Future;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// How long pipe readers get to reach EOF once the process group is dead.
const READER_SETTLE: Duration = Duration::from_millis(500);

/// Build the shell invocation for `command`, with piped output and no stdin.
pub(crate) fn shell_command(
    shell: &str,
    command: &str,
    working_directory: &str,
    env: &HashMap<String, String>,
) -> Command {
    let flag = if is_cmd_exe(shell) { "/C" } else { "-c" };
    let mut cmd = Command::new(shell);
    cmd.arg(flag)
        .arg(command)
        .current_dir(working_directory)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    group::isolate(&mut cmd);
    cmd
}

fn is_cmd_exe(shell: &str) -> bool {
    // Windows paths may reach here on any host, so split on both separators.
    let name = shell
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(shell)
        .to_ascii_lowercase();
    name == "cmd" || name == "cmd.exe"
}

/// Numeric exit code, using the shell convention `128 + signal` for signal deaths.
pub(crate) fn exit_code_of(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

/// How waiting on the pipe readers ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Drain {
    /// Output reached EOF, or the deadline passed and the group was killed.
    Finished,
    /// `interrupt` fired first and the rest of the group was stopped.
    Interrupted,
}

/// Wait for the pipe readers after the leader exited. Descendants that
/// still hold the pipes open get until `deadline`; past it the group is
/// killed. If `interrupt` resolves first, the group is stopped in two
/// phases: interrupt, `grace`, then kill.
pub(crate) async fn drain_readers<F>(
    readers: Vec<JoinHandle<()>>,
    child: &mut Child,
    group: Option<ProcessGroup>,
    deadline: tokio::time::Instant,
    interrupt: F,
    grace: Duration,
) -> Drain
where
    F: Future<Output = ()>,
{
    let aborts: Vec<_> = readers.iter().map(|h| h.abort_handle()).collect();
    let joined = join_all(readers);
    tokio::pin!(joined);
    tokio::pin!(interrupt);

    let drain = tokio::select! {
        _ = &mut joined => return Drain::Finished,
        _ = tokio::time::sleep_until(deadline) => {
            tracing::info!("[ProcessGroup] Output still open at deadline, killing remaining group");
            Drain::Finished
        }
        _ = &mut interrupt => {
            tracing::info!("[ProcessGroup] Stopped with output open, interrupting remaining group");
            group::send(child, group, StopSignal::Interrupt);
            if tokio::time::timeout(grace, &mut joined).await.is_ok() {
                group::send(child, group, StopSignal::Kill);
                return Drain::Interrupted;
            }
            Drain::Interrupted
        }
    };

    group::send(child, group, StopSignal::Kill);
    if tokio::time::timeout(READER_SETTLE, &mut joined).await.is_err() {
        aborts.iter().for_each(|a| a.abort());
    }
    drain
}

/// Readers after the group was killed: they should hit EOF almost at once.
pub(crate) async fn settle_readers(readers: Vec<JoinHandle<()>>) {
    let aborts: Vec<_> = readers.iter().map(|h| h.abort_handle()).collect();
    if tokio::time::timeout(READER_SETTLE, join_all(readers))
        .await
        .is_err()
    {
        aborts.iter().for_each(|a| a.abort());
    }
}

async fn join_all(readers: Vec<JoinHandle<()>>) {
    for reader in readers {
        let _ = reader.await;
    }
}

/// Decodes a byte stream into UTF-8 text chunk by chunk, holding back a
/// multi-byte sequence split across reads until it is complete.
#[derive(Debug, Default)]
pub(crate) struct Utf8Chunker {
    pending: Vec<u8>,
}

impl Utf8Chunker {
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let out = text.to_string();
                self.pending.clear();
                out
            }
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                let out = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
                self.pending.drain(..valid);
                out
            }
            Err(_) => {
                let out = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                out
            }
        }
    }

    pub fn finish(&mut self) -> String {
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }
}

/// Text accumulator that stops growing after `cap` characters.
#[derive(Debug)]
pub(crate) struct CappedText {
    text: String,
    chars: usize,
    cap: usize,
    truncated: bool,
}

impl CappedText {
    pub fn new(cap: usize) -> Self {
        Self {
            text: String::new(),
            chars: 0,
            cap,
            truncated: false,
        }
    }

    pub fn push(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        let room = self.cap.saturating_sub(self.chars);
        if room == 0 {
            self.truncated = true;
            return;
        }
        let count = chunk.chars().count();
        if count <= room {
            self.text.push_str(chunk);
            self.chars += count;
        } else {
            self.text.extend(chunk.chars().take(room));
            self.chars = self.cap;
            self.truncated = true;
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn into_string(self) -> String {
        self.text
    }
}
