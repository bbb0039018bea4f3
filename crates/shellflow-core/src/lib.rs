//! Shellflow Core — command execution and workflow orchestration.
//!
//! This crate runs shell commands as isolated process groups, streams their
//! output, and interprets workflows of command, prompt and condition steps.
//! It has **no HTTP framework dependency** by default, making it suitable
//! for use in:
//!
//! - HTTP servers (via `shellflow-server`)
//! - CLI tools (via `shellflow-cli`)
//!
//! # Feature Flags
//!
//! - `axum` — Enables `IntoResponse` impl on `ServerError` for use in axum handlers.

pub mod condition;
pub mod config;
pub mod db;
pub mod error;
pub mod process;
pub mod state;
pub mod store;
pub mod workflow;

// Convenience re-exports
pub use condition::ConditionEvaluator;
pub use config::EngineConfig;
pub use db::Database;
pub use error::{ServerError, WorkflowError};
pub use process::{CommandExecution, ExecFrame, ProcessRunner, StreamingExecutionSession};
pub use state::{AppState, AppStateInner};
pub use workflow::{WorkflowEngine, WorkflowEvent};
