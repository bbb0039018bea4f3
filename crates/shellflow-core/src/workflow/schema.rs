//! Schema types for workflow definitions and runs.
//!
//! A definition is an ordered list of typed steps. Order only decides the
//! default fallthrough; condition steps can jump to any step id.
//!
//! ```yaml
//! name: "Release check"
//! steps:
//!   - id: build
//!     type: command
//!     name: Build
//!     command: cargo build 2>&1 && echo BUILD PASSED
//!     timeout: 600000
//!   - id: gate
//!     type: condition
//!     name: Did it pass?
//!     condition: previousOutput.includes("PASSED")
//!     onTrue: notify
//!     onFalse: report
//!   - id: report
//!     type: prompt
//!     name: Summarise failure
//!     prompt: "Explain this build failure: {{previousOutput}}"
//!   - id: notify
//!     type: command
//!     name: Notify
//!     command: echo shipped
//!     continueOnError: true
//! ```

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::condition::ConditionEvaluator;
use crate::error::WorkflowError;

/// Discriminant of a step, as reported in `step-start` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Command,
    Prompt,
    Condition,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Command => "command",
            StepType::Prompt => "prompt",
            StepType::Condition => "condition",
        }
    }
}

/// The type-specific payload of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepKind {
    Command {
        command: String,
    },
    Prompt {
        prompt: String,
    },
    Condition {
        condition: String,
        #[serde(default, rename = "onTrue", skip_serializing_if = "Option::is_none")]
        on_true: Option<String>,
        #[serde(default, rename = "onFalse", skip_serializing_if = "Option::is_none")]
        on_false: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub kind: StepKind,
    /// Per-step timeout in milliseconds (command steps).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub continue_on_error: bool,
}

impl WorkflowStep {
    pub fn step_type(&self) -> StepType {
        match self.kind {
            StepKind::Command { .. } => StepType::Command,
            StepKind::Prompt { .. } => StepType::Prompt,
            StepKind::Condition { .. } => StepType::Condition,
        }
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub fn command(id: &str, command: &str) -> Self {
        Self::new(id, StepKind::Command { command: command.to_string() })
    }

    pub fn prompt(id: &str, prompt: &str) -> Self {
        Self::new(id, StepKind::Prompt { prompt: prompt.to_string() })
    }

    pub fn condition(
        id: &str,
        condition: &str,
        on_true: Option<&str>,
        on_false: Option<&str>,
    ) -> Self {
        Self::new(
            id,
            StepKind::Condition {
                condition: condition.to_string(),
                on_true: on_true.map(str::to_string),
                on_false: on_false.map(str::to_string),
            },
        )
    }

    fn new(id: &str, kind: StepKind) -> Self {
        Self {
            id: id.to_string(),
            name: String::new(),
            kind,
            timeout: None,
            continue_on_error: false,
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    pub fn continuing_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }
}

/// Reject step lists the engine cannot address unambiguously.
pub fn validate_steps(steps: &[WorkflowStep]) -> Result<(), WorkflowError> {
    let mut seen = HashSet::new();
    for (index, step) in steps.iter().enumerate() {
        if step.id.trim().is_empty() {
            return Err(WorkflowError::EmptyStepId(index));
        }
        if !seen.insert(step.id.as_str()) {
            return Err(WorkflowError::DuplicateStepId(step.id.clone()));
        }
    }
    Ok(())
}

/// Non-fatal findings: jumps that will fall through and conditions that
/// will always evaluate to `false`.
pub fn lint_steps(steps: &[WorkflowStep]) -> Vec<String> {
    let ids: HashSet<&str> = steps.iter().map(|s| s.id.as_str()).collect();
    let evaluator = ConditionEvaluator::new();
    let mut warnings = Vec::new();

    for step in steps {
        if let StepKind::Condition {
            condition,
            on_true,
            on_false,
        } = &step.kind
        {
            if let Err(e) = evaluator.check(condition) {
                warnings.push(format!("step '{}': condition is always false ({})", step.id, e));
            }
            for (label, target) in [("onTrue", on_true), ("onFalse", on_false)] {
                if let Some(target) = target {
                    if !ids.contains(target.as_str()) {
                        warnings.push(format!(
                            "step '{}': {} target '{}' does not exist, will fall through",
                            step.id, label, target
                        ));
                    }
                }
            }
        }
    }
    warnings
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkflowDefinition {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        validate_steps(&self.steps)
    }

    pub fn lint(&self) -> Vec<String> {
        lint_steps(&self.steps)
    }

    /// Parse a definition from YAML (JSON is accepted too, being a YAML subset).
    pub fn from_yaml(yaml: &str) -> Result<Self, WorkflowError> {
        let def: Self =
            serde_yaml::from_str(yaml).map_err(|e| WorkflowError::Parse(e.to_string()))?;
        def.validate()?;
        Ok(def)
    }

    pub fn from_file(path: &str) -> Result<Self, WorkflowError> {
        let content = std::fs::read_to_string(path).map_err(|e| WorkflowError::Io {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml(&content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failure,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStepResult {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

impl WorkflowStepResult {
    pub fn pending(step_id: &str) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Pending,
            output: None,
            error: None,
            duration: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub id: String,
    pub workflow_id: String,
    pub status: RunStatus,
    pub current_step_index: usize,
    pub step_results: Vec<WorkflowStepResult>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    /// A fresh run with one pending result per step.
    pub fn new(workflow_id: &str, steps: &[WorkflowStep]) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            status: RunStatus::Running,
            current_step_index: 0,
            step_results: steps.iter().map(|s| WorkflowStepResult::pending(&s.id)).collect(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Body of a run request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub workflow_id: String,
    #[serde(default)]
    pub working_directory: Option<String>,
    pub steps: Vec<WorkflowStep>,
}
