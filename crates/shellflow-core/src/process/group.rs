//! Process-group signalling.
//!
//! On Unix a command is spawned with `process_group(0)`, making its pid the
//! group id; signalling the group reaches every descendant that did not
//! leave it. Elsewhere (or when the group signal cannot be delivered) the
//! direct child is signalled instead.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::{Child, Command};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// Polite request to stop (SIGINT).
    Interrupt,
    /// Forced termination (SIGKILL).
    Kill,
}

/// Make the spawned command the leader of a new process group.
pub(crate) fn isolate(cmd: &mut Command) {
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }
    #[cfg(not(unix))]
    {
        let _ = cmd;
    }
}

/// Handle to the process group led by a spawned child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessGroup {
    pid: u32,
}

impl ProcessGroup {
    /// Capture the group id at spawn time. `None` once the child was reaped.
    pub fn of(child: &Child) -> Option<Self> {
        child.id().map(|pid| Self { pid })
    }

    pub fn id(&self) -> u32 {
        self.pid
    }

    /// Signal every process in the group. Returns `false` when the signal
    /// could not be delivered and the caller should fall back to the child.
    #[cfg(unix)]
    pub fn signal(&self, signal: StopSignal) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let sig = match signal {
            StopSignal::Interrupt => Signal::SIGINT,
            StopSignal::Kill => Signal::SIGKILL,
        };
        match killpg(Pid::from_raw(self.pid as i32), sig) {
            Ok(()) => true,
            // Group already gone: nothing left to signal.
            Err(Errno::ESRCH) => true,
            Err(e) => {
                tracing::warn!(
                    "[ProcessGroup:{}] Group signal {:?} failed: {}",
                    self.pid,
                    signal,
                    e
                );
                false
            }
        }
    }

    #[cfg(not(unix))]
    pub fn signal(&self, _signal: StopSignal) -> bool {
        false
    }
}

/// Deliver `signal` to the child's process group, falling back to the
/// child itself when the group cannot be signalled.
pub fn send(child: &mut Child, group: Option<ProcessGroup>, signal: StopSignal) {
    if group.map(|g| g.signal(signal)).unwrap_or(false) {
        return;
    }
    match signal {
        StopSignal::Kill => {
            let _ = child.start_kill();
        }
        StopSignal::Interrupt => interrupt_child(child),
    }
}

#[cfg(unix)]
fn interrupt_child(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if kill(Pid::from_raw(pid as i32), Signal::SIGINT).is_err() {
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn interrupt_child(child: &mut Child) {
    // No interrupt signal to send; stopping means terminating.
    let _ = child.start_kill();
}

/// Two-phase stop: interrupt, wait up to `grace`, then force-kill.
pub async fn stop_gracefully(
    child: &mut Child,
    group: Option<ProcessGroup>,
    grace: Duration,
) -> io::Result<ExitStatus> {
    send(child, group, StopSignal::Interrupt);
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            tracing::info!(
                "[ProcessGroup:{}] Still running after {}ms grace, killing",
                group.map(|g| g.id()).unwrap_or_default(),
                grace.as_millis()
            );
            send(child, group, StopSignal::Kill);
            child.wait().await
        }
    }
}

/// Immediate stop: force-kill the group and reap the child.
pub async fn kill_now(child: &mut Child, group: Option<ProcessGroup>) -> io::Result<ExitStatus> {
    send(child, group, StopSignal::Kill);
    child.wait().await
}
