//! Progress frames emitted by a workflow run.

use serde::{Deserialize, Serialize};

use super::schema::{RunStatus, StepType, WorkflowStepResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum WorkflowEvent {
    #[serde(rename_all = "camelCase")]
    StepStart {
        step_id: String,
        index: usize,
        name: String,
        #[serde(rename = "type")]
        step_type: StepType,
    },
    StepComplete {
        index: usize,
        #[serde(flatten)]
        result: WorkflowStepResult,
    },
    #[serde(rename_all = "camelCase")]
    RunComplete { run_id: String, status: RunStatus },
}

impl WorkflowEvent {
    /// Event name on the wire (`step-start`, `step-complete`, `run-complete`).
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::StepStart { .. } => "step-start",
            WorkflowEvent::StepComplete { .. } => "step-complete",
            WorkflowEvent::RunComplete { .. } => "run-complete",
        }
    }

    /// The event payload without the name envelope.
    pub fn data(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut map)) => map.remove("data").unwrap_or_default(),
            _ => serde_json::Value::Null,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowEvent::RunComplete { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::schema::StepStatus;

    #[test]
    fn test_event_payloads() {
        let start = WorkflowEvent::StepStart {
            step_id: "a".into(),
            index: 0,
            name: "Build".into(),
            step_type: StepType::Command,
        };
        assert_eq!(start.name(), "step-start");
        assert_eq!(
            start.data(),
            serde_json::json!({"stepId": "a", "index": 0, "name": "Build", "type": "command"})
        );

        let complete = WorkflowEvent::StepComplete {
            index: 1,
            result: WorkflowStepResult {
                step_id: "b".into(),
                status: StepStatus::Success,
                output: Some("B".into()),
                error: None,
                duration: Some(3),
            },
        };
        assert_eq!(
            complete.data(),
            serde_json::json!({
                "index": 1,
                "stepId": "b",
                "status": "success",
                "output": "B",
                "duration": 3
            })
        );

        let done = WorkflowEvent::RunComplete {
            run_id: "r".into(),
            status: RunStatus::Cancelled,
        };
        assert!(done.is_terminal());
        assert_eq!(
            serde_json::to_value(&done).unwrap(),
            serde_json::json!({
                "event": "run-complete",
                "data": {"runId": "r", "status": "cancelled"}
            })
        );
    }
}
