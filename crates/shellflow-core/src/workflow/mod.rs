//! Workflow engine: typed steps, jump-based control flow, progress frames.
//!
//! ```text
//! WorkflowDefinition.steps ──► WorkflowEngine ──► WorkflowEvent stream
//!                                 │
//!             command ──► ProcessRunner
//!             prompt  ──► PromptCompleter
//!           condition ──► ConditionEvaluator ──► jump / fall through
//! ```

pub mod engine;
pub mod events;
pub mod prompt;
pub mod registry;
pub mod schema;

pub use engine::{render, SpawnedRun, WorkflowEngine, PREVIOUS_OUTPUT_TOKEN};
pub use events::WorkflowEvent;
pub use prompt::{EchoPromptCompleter, PromptCompleter, PromptError};
pub use registry::{RunHandle, RunRegistry};
pub use schema::{
    lint_steps, validate_steps, RunRequest, RunStatus, StepKind, StepStatus, StepType,
    WorkflowDefinition, WorkflowRun, WorkflowStep, WorkflowStepResult,
};
