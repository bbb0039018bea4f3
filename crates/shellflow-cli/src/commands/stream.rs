//! `shellflow stream` — Run a command, printing output frames as JSON lines.
//!
//! Ctrl-C asks the session to stop; frames keep flowing until its exit frame.

use shellflow_core::process::{ExecFrame, StreamingExecutionSession};
use shellflow_core::state::AppState;

use super::print_json_line;

pub async fn run(state: &AppState, command: &str, cwd: &str) -> Result<i32, String> {
    let session = StreamingExecutionSession::new(command, cwd, &state.config);
    let (handle, mut rx) = state.sessions.spawn(session).await;
    tracing::info!("[stream] session {} started", handle.id());

    let mut stop_sent = false;
    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(frame) => {
                    print_json_line(&frame);
                    if let ExecFrame::Exit { code, .. } = frame {
                        return Ok(code);
                    }
                }
                None => return Err("session ended without an exit frame".to_string()),
            },
            _ = tokio::signal::ctrl_c(), if !stop_sent => {
                tracing::info!("[stream] interrupt, stopping session {}", handle.id());
                handle.stop();
                stop_sent = true;
            }
        }
    }
}
