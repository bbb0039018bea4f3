//! WorkflowEngine — interprets a step list as a directed step graph.
//!
//! Steps run strictly one at a time. A single rolling `previousOutput`
//! value is threaded between them; condition steps may redirect control to
//! any step id. Jump cycles are not detected: a workflow that loops runs
//! until a step times out, a step fails, or the run is cancelled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::events::WorkflowEvent;
use super::prompt::{EchoPromptCompleter, PromptCompleter};
use super::registry::RunHandle;
use super::schema::{
    RunStatus, StepKind, StepStatus, WorkflowRun, WorkflowStep, WorkflowStepResult,
};
use crate::condition::ConditionEvaluator;
use crate::process::{ExecutionState, ProcessRunner};

/// Template token replaced with the previous step's output.
pub const PREVIOUS_OUTPUT_TOKEN: &str = "{{previousOutput}}";

const CANCELLED_MESSAGE: &str = "Step cancelled";

/// What one step produced, before it is written into the run.
struct StepOutcome {
    status: StepStatus,
    output: Option<String>,
    error: Option<String>,
    /// New `previousOutput`, if the step replaces it.
    carry: Option<String>,
    /// Resolved jump target, for condition steps.
    jump: Option<usize>,
    cancelled: bool,
}

impl StepOutcome {
    fn cancelled() -> Self {
        Self {
            status: StepStatus::Failure,
            output: None,
            error: Some(CANCELLED_MESSAGE.to_string()),
            carry: None,
            jump: None,
            cancelled: true,
        }
    }
}

/// A run started with [`WorkflowEngine::spawn`].
pub struct SpawnedRun {
    pub handle: RunHandle,
    pub events: UnboundedReceiver<WorkflowEvent>,
    pub join: JoinHandle<WorkflowRun>,
}

pub struct WorkflowEngine {
    runner: ProcessRunner,
    evaluator: ConditionEvaluator,
    prompts: Arc<dyn PromptCompleter>,
}

impl WorkflowEngine {
    /// An engine whose prompt steps echo the rendered prompt.
    pub fn new(runner: ProcessRunner) -> Self {
        Self {
            runner,
            evaluator: ConditionEvaluator::new(),
            prompts: Arc::new(EchoPromptCompleter),
        }
    }

    pub fn with_prompt_completer(mut self, prompts: Arc<dyn PromptCompleter>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    /// Run `steps` to completion, pushing progress frames to `events`.
    pub async fn run(
        &self,
        workflow_id: &str,
        steps: &[WorkflowStep],
        working_directory: &str,
        events: &UnboundedSender<WorkflowEvent>,
        cancel: &CancellationToken,
    ) -> WorkflowRun {
        let run = WorkflowRun::new(workflow_id, steps);
        self.execute(run, steps, working_directory, events, cancel)
            .await
    }

    /// Start a run on a background task. The run id is known before the
    /// first frame is produced.
    pub fn spawn(
        self: &Arc<Self>,
        workflow_id: &str,
        steps: Vec<WorkflowStep>,
        working_directory: String,
    ) -> SpawnedRun {
        let run = WorkflowRun::new(workflow_id, &steps);
        let handle = RunHandle::new(&run.id);
        let cancel = handle.token();
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Arc::clone(self);
        let join = tokio::spawn(async move {
            engine
                .execute(run, &steps, &working_directory, &tx, &cancel)
                .await
        });
        SpawnedRun {
            handle,
            events: rx,
            join,
        }
    }

    /// Drive an already-created run. `run.step_results` must line up with `steps`.
    pub async fn execute(
        &self,
        mut run: WorkflowRun,
        steps: &[WorkflowStep],
        working_directory: &str,
        events: &UnboundedSender<WorkflowEvent>,
        cancel: &CancellationToken,
    ) -> WorkflowRun {
        let tag = run.id.get(..8).unwrap_or(&run.id).to_string();
        tracing::info!(
            "[WorkflowEngine:{}] Starting workflow '{}' with {} steps",
            tag,
            run.workflow_id,
            steps.len()
        );

        if run.step_results.len() != steps.len() {
            run.step_results = steps
                .iter()
                .map(|s| WorkflowStepResult::pending(&s.id))
                .collect();
        }

        let emit = |event: WorkflowEvent| {
            // A departed observer does not stop the run; cancellation does.
            let _ = events.send(event);
        };

        let mut previous_output = String::new();
        let mut index = 0usize;

        let status = loop {
            if index >= steps.len() {
                break RunStatus::Completed;
            }
            if cancel.is_cancelled() {
                break RunStatus::Cancelled;
            }

            let step = &steps[index];
            run.current_step_index = index;
            // Re-entry through a jump cycle starts the slot over.
            run.step_results[index] = WorkflowStepResult {
                status: StepStatus::Running,
                ..WorkflowStepResult::pending(&step.id)
            };
            emit(WorkflowEvent::StepStart {
                step_id: step.id.clone(),
                index,
                name: step.display_name().to_string(),
                step_type: step.step_type(),
            });
            tracing::debug!(
                "[WorkflowEngine:{}] Step {} '{}' ({:?})",
                tag,
                index,
                step.id,
                step.step_type()
            );

            let started = Instant::now();
            let outcome = match &step.kind {
                StepKind::Command { command } => {
                    self.run_command(step, command, &previous_output, working_directory, cancel)
                        .await
                }
                StepKind::Prompt { prompt } => {
                    self.run_prompt(prompt, &previous_output, working_directory, cancel)
                        .await
                }
                StepKind::Condition {
                    condition,
                    on_true,
                    on_false,
                } => self.run_condition(
                    &tag,
                    steps,
                    condition,
                    on_true.as_deref(),
                    on_false.as_deref(),
                    &previous_output,
                ),
            };

            let result = WorkflowStepResult {
                step_id: step.id.clone(),
                status: outcome.status,
                output: outcome.output,
                error: outcome.error,
                duration: Some(started.elapsed().as_millis() as u64),
            };
            run.step_results[index] = result.clone();
            emit(WorkflowEvent::StepComplete { index, result });

            if let Some(carry) = outcome.carry {
                previous_output = carry;
            }
            if outcome.cancelled {
                break RunStatus::Cancelled;
            }
            if outcome.status == StepStatus::Failure && !step.continue_on_error {
                tracing::info!(
                    "[WorkflowEngine:{}] Step '{}' failed, stopping run",
                    tag,
                    step.id
                );
                break RunStatus::Failed;
            }

            index = outcome.jump.unwrap_or(index + 1);
            // Keeps condition-only cycles cancellable on a single-threaded runtime.
            tokio::task::yield_now().await;
        };

        for result in run.step_results.iter_mut() {
            if result.status == StepStatus::Pending {
                result.status = StepStatus::Skipped;
            }
        }
        run.status = status;
        run.completed_at = Some(Utc::now());

        tracing::info!(
            "[WorkflowEngine:{}] Run finished: {}",
            tag,
            status.as_str()
        );
        emit(WorkflowEvent::RunComplete {
            run_id: run.id.clone(),
            status,
        });
        run
    }

    async fn run_command(
        &self,
        step: &WorkflowStep,
        command: &str,
        previous_output: &str,
        working_directory: &str,
        cancel: &CancellationToken,
    ) -> StepOutcome {
        let rendered = render(command, previous_output);
        let timeout = step
            .timeout
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.runner.config().default_step_timeout());

        let execution = self
            .runner
            .execute_with_cancel(&rendered, working_directory, &HashMap::new(), timeout, cancel)
            .await;

        if execution.state == ExecutionState::Killed {
            return StepOutcome::cancelled();
        }

        let output = execution.combined_output().trim().to_string();
        let exit_code = execution.exit_code.unwrap_or(-1);
        let (status, error) = match execution.state {
            ExecutionState::Succeeded => (StepStatus::Success, None),
            ExecutionState::TimedOut => (
                StepStatus::Failure,
                Some(format!("Command timed out after {}ms", timeout.as_millis())),
            ),
            _ => (
                StepStatus::Failure,
                Some(format!("Command exited with code {}", exit_code)),
            ),
        };

        StepOutcome {
            status,
            output: Some(output.clone()),
            error,
            carry: Some(output),
            jump: None,
            cancelled: false,
        }
    }

    async fn run_prompt(
        &self,
        prompt: &str,
        previous_output: &str,
        working_directory: &str,
        cancel: &CancellationToken,
    ) -> StepOutcome {
        let rendered = render(prompt, previous_output);
        let completion = tokio::select! {
            result = self.prompts.complete(&rendered, working_directory) => result,
            _ = cancel.cancelled() => return StepOutcome::cancelled(),
        };

        match completion {
            Ok(text) => StepOutcome {
                status: StepStatus::Success,
                output: Some(text.clone()),
                error: None,
                carry: Some(text),
                jump: None,
                cancelled: false,
            },
            Err(e) => StepOutcome {
                status: StepStatus::Failure,
                output: None,
                error: Some(e.to_string()),
                carry: None,
                jump: None,
                cancelled: false,
            },
        }
    }

    fn run_condition(
        &self,
        tag: &str,
        steps: &[WorkflowStep],
        condition: &str,
        on_true: Option<&str>,
        on_false: Option<&str>,
        previous_output: &str,
    ) -> StepOutcome {
        let value = self.evaluator.evaluate(condition, previous_output);
        let target = if value { on_true } else { on_false };
        let jump = target.and_then(|id| {
            let position = steps.iter().position(|s| s.id == id);
            if position.is_none() {
                tracing::warn!(
                    "[WorkflowEngine:{}] Jump target '{}' not found, falling through",
                    tag,
                    id
                );
            }
            position
        });

        StepOutcome {
            status: StepStatus::Success,
            output: Some(format!("Condition evaluated to {}", value)),
            error: None,
            carry: None,
            jump,
            cancelled: false,
        }
    }
}

/// Replace every literal `{{previousOutput}}` in `template`.
pub fn render(template: &str, previous_output: &str) -> String {
    template.replace(PREVIOUS_OUTPUT_TOKEN, previous_output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_every_token() {
        assert_eq!(
            render("a {{previousOutput}} b {{previousOutput}}", "X"),
            "a X b X"
        );
        assert_eq!(render("{{ previousOutput }}", "X"), "{{ previousOutput }}");
    }
}

#[cfg(all(test, unix))]
mod scenario_tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::workflow::prompt::PromptError;
    use async_trait::async_trait;

    fn engine() -> WorkflowEngine {
        WorkflowEngine::new(ProcessRunner::new(EngineConfig {
            stop_grace_period_ms: 200,
            ..EngineConfig::default()
        }))
    }

    async fn run_steps(
        engine: &WorkflowEngine,
        steps: &[WorkflowStep],
    ) -> (WorkflowRun, Vec<WorkflowEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let run = engine
            .run("wf-test", steps, ".", &tx, &CancellationToken::new())
            .await;
        drop(tx);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (run, events)
    }

    fn started_ids(events: &[WorkflowEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::StepStart { step_id, .. } => Some(step_id.clone()),
                _ => None,
            })
            .collect()
    }

    fn completed(events: &[WorkflowEvent]) -> Vec<&WorkflowStepResult> {
        events
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::StepComplete { result, .. } => Some(result),
                _ => None,
            })
            .collect()
    }

    fn final_status(events: &[WorkflowEvent]) -> RunStatus {
        match events.last() {
            Some(WorkflowEvent::RunComplete { status, .. }) => *status,
            other => panic!("last event is not run-complete: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sequential_commands() {
        let steps = vec![
            WorkflowStep::command("a", "echo A"),
            WorkflowStep::command("b", "echo B"),
        ];
        let (run, events) = run_steps(&engine(), &steps).await;

        let names: Vec<_> = events.iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec!["step-start", "step-complete", "step-start", "step-complete", "run-complete"]
        );
        let results = completed(&events);
        assert_eq!(results[0].output.as_deref(), Some("A"));
        assert_eq!(results[1].output.as_deref(), Some("B"));
        assert!(results.iter().all(|r| r.status == StepStatus::Success));
        assert_eq!(final_status(&events), RunStatus::Completed);
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.current_step_index, 1);
        assert!(run.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_empty_steps_complete_immediately() {
        let (run, events) = run_steps(&engine(), &[]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(final_status(&events), RunStatus::Completed);
        assert!(run.step_results.is_empty());
    }

    #[tokio::test]
    async fn test_failure_halts_run() {
        let steps = vec![
            WorkflowStep::command("bad", "echo broken >&2; exit 3"),
            WorkflowStep::command("never", "echo never"),
        ];
        let (run, events) = run_steps(&engine(), &steps).await;

        assert_eq!(started_ids(&events), vec!["bad"]);
        assert_eq!(final_status(&events), RunStatus::Failed);
        let results = completed(&events);
        assert_eq!(results[0].status, StepStatus::Failure);
        assert_eq!(results[0].output.as_deref(), Some("broken"));
        assert_eq!(results[0].error.as_deref(), Some("Command exited with code 3"));
        assert_eq!(run.step_results[1].status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn test_continue_on_error_proceeds() {
        let steps = vec![
            WorkflowStep::command("bad", "exit 1").continuing_on_error(),
            WorkflowStep::command("next", "echo next"),
        ];
        let (run, events) = run_steps(&engine(), &steps).await;

        assert_eq!(started_ids(&events), vec!["bad", "next"]);
        assert_eq!(final_status(&events), RunStatus::Completed);
        assert_eq!(run.step_results[0].status, StepStatus::Failure);
        assert_eq!(run.step_results[1].status, StepStatus::Success);
    }

    #[tokio::test]
    async fn test_output_threading() {
        let steps = vec![
            WorkflowStep::command("produce", "printf '  hello world \\n\\n'"),
            WorkflowStep::command("consume", "echo \"got [{{previousOutput}}]\""),
            WorkflowStep::prompt("ask", "summarise {{previousOutput}}"),
            WorkflowStep::command("after", "echo '{{previousOutput}}'"),
        ];
        let (run, _) = run_steps(&engine(), &steps).await;

        assert_eq!(run.step_results[1].output.as_deref(), Some("got [hello world]"));
        assert_eq!(run.step_results[2].output.as_deref(), Some("summarise got [hello world]"));
        assert_eq!(run.step_results[3].output.as_deref(), Some("summarise got [hello world]"));
    }

    #[tokio::test]
    async fn test_stderr_joins_output_on_new_line() {
        let steps = vec![WorkflowStep::command("both", "echo out; echo err >&2")];
        let (run, _) = run_steps(&engine(), &steps).await;
        assert_eq!(run.step_results[0].output.as_deref(), Some("out\n\nerr"));
    }

    #[tokio::test]
    async fn test_condition_true_jumps() {
        let steps = vec![
            WorkflowStep::command("build", "echo 'BUILD PASSED'"),
            WorkflowStep::condition(
                "gate",
                "previousOutput.includes('PASS')",
                Some("ship"),
                Some("report"),
            ),
            WorkflowStep::command("report", "echo report"),
            WorkflowStep::command("ship", "echo ship"),
        ];
        let (run, events) = run_steps(&engine(), &steps).await;

        assert_eq!(started_ids(&events), vec!["build", "gate", "ship"]);
        assert_eq!(run.step_results[1].output.as_deref(), Some("Condition evaluated to true"));
        assert_eq!(run.step_results[2].status, StepStatus::Skipped);
        assert_eq!(final_status(&events), RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_invalid_condition_follows_on_false() {
        let steps = vec![
            WorkflowStep::command("build", "echo 'BUILD PASSED'"),
            WorkflowStep::condition(
                "gate",
                "previousOutput.includes(",
                Some("ship"),
                Some("report"),
            ),
            WorkflowStep::command("ship", "echo ship"),
            WorkflowStep::command("report", "echo report"),
        ];
        let (run, events) = run_steps(&engine(), &steps).await;

        assert_eq!(started_ids(&events), vec!["build", "gate", "report"]);
        assert_eq!(run.step_results[1].status, StepStatus::Success);
        assert_eq!(run.step_results[1].output.as_deref(), Some("Condition evaluated to false"));
    }

    #[tokio::test]
    async fn test_invalid_condition_without_on_false_falls_through() {
        let steps = vec![
            WorkflowStep::condition("gate", "((", Some("last"), None),
            WorkflowStep::command("middle", "echo middle"),
            WorkflowStep::command("last", "echo last"),
        ];
        let (_, events) = run_steps(&engine(), &steps).await;
        assert_eq!(started_ids(&events), vec!["gate", "middle", "last"]);
    }

    #[tokio::test]
    async fn test_empty_input_jumps_to_on_false() {
        let steps = vec![
            WorkflowStep::condition(
                "check",
                "previousOutput.length > 0",
                Some("stepC"),
                Some("stepD"),
            ),
            WorkflowStep::command("stepC", "echo C"),
            WorkflowStep::command("stepD", "echo D"),
        ];
        let (run, events) = run_steps(&engine(), &steps).await;

        assert_eq!(started_ids(&events), vec!["check", "stepD"]);
        assert_eq!(run.step_results[1].status, StepStatus::Skipped);
        assert_eq!(run.step_results[2].output.as_deref(), Some("D"));
    }

    #[tokio::test]
    async fn test_unresolved_jump_falls_through() {
        let steps = vec![
            WorkflowStep::condition("gate", "true", Some("typo"), None),
            WorkflowStep::command("next", "echo next"),
        ];
        let (run, events) = run_steps(&engine(), &steps).await;
        assert_eq!(started_ids(&events), vec!["gate", "next"]);
        assert_eq!(run.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_condition_keeps_previous_output() {
        let steps = vec![
            WorkflowStep::command("a", "echo kept"),
            WorkflowStep::condition("gate", "true", None, None),
            WorkflowStep::command("b", "echo {{previousOutput}}"),
        ];
        let (run, _) = run_steps(&engine(), &steps).await;
        assert_eq!(run.step_results[2].output.as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn test_step_timeout() {
        let steps = vec![
            WorkflowStep::command("slow", "sleep 5").with_timeout(100),
            WorkflowStep::command("never", "echo never"),
        ];
        let started = Instant::now();
        let (run, events) = run_steps(&engine(), &steps).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(run.step_results[0].status, StepStatus::Failure);
        assert_eq!(
            run.step_results[0].error.as_deref(),
            Some("Command timed out after 100ms")
        );
        assert_eq!(final_status(&events), RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancel_stops_in_flight_command() {
        let engine = Arc::new(engine());
        let steps = vec![
            WorkflowStep::command("long", "sleep 10"),
            WorkflowStep::command("never", "echo never"),
        ];
        let mut spawned = engine.spawn("wf", steps, ".".into());
        tokio::time::sleep(Duration::from_millis(150)).await;
        let started = Instant::now();
        spawned.handle.cancel();

        let run = spawned.join.await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(run.step_results[0].error.as_deref(), Some("Step cancelled"));
        assert_eq!(run.step_results[1].status, StepStatus::Skipped);

        let mut events = Vec::new();
        while let Some(event) = spawned.events.recv().await {
            events.push(event);
        }
        assert_eq!(started_ids(&events), vec!["long"]);
        assert_eq!(final_status(&events), RunStatus::Cancelled);
        assert_eq!(
            events.last(),
            Some(&WorkflowEvent::RunComplete {
                run_id: spawned.handle.run_id().to_string(),
                status: RunStatus::Cancelled
            })
        );
    }

    #[tokio::test]
    async fn test_cancel_with_background_child_holding_output() {
        let engine = Arc::new(engine());
        let steps = vec![WorkflowStep::command("a", "sleep 30 & echo started").with_timeout(6000)];
        let spawned = engine.spawn("wf", steps, ".".into());
        tokio::time::sleep(Duration::from_millis(300)).await;
        let started = Instant::now();
        spawned.handle.cancel();

        let run = spawned.join.await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(run.step_results[0].error.as_deref(), Some("Step cancelled"));
    }

    #[tokio::test]
    async fn test_jump_cycle_runs_until_cancelled() {
        let engine = Arc::new(engine());
        let steps = vec![
            WorkflowStep::command("tick", "echo tick"),
            WorkflowStep::condition("again", "true", Some("tick"), None),
        ];
        let spawned = engine.spawn("wf", steps, ".".into());
        tokio::time::sleep(Duration::from_millis(300)).await;
        spawned.handle.cancel();

        let run = tokio::time::timeout(Duration::from_secs(5), spawned.join)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
    }

    struct PendingCompleter;

    #[async_trait]
    impl PromptCompleter for PendingCompleter {
        async fn complete(&self, _prompt: &str, _cwd: &str) -> Result<String, PromptError> {
            std::future::pending().await
        }
    }

    struct FailingCompleter;

    #[async_trait]
    impl PromptCompleter for FailingCompleter {
        async fn complete(&self, _prompt: &str, _cwd: &str) -> Result<String, PromptError> {
            Err(PromptError::Unavailable("no model".into()))
        }
    }

    #[tokio::test]
    async fn test_cancel_during_prompt() {
        let engine = Arc::new(engine().with_prompt_completer(Arc::new(PendingCompleter)));
        let spawned = engine.spawn("wf", vec![WorkflowStep::prompt("p", "hi")], ".".into());
        tokio::time::sleep(Duration::from_millis(50)).await;
        spawned.handle.cancel();

        let run = spawned.join.await.unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_prompt_failure_fails_run() {
        let engine = engine().with_prompt_completer(Arc::new(FailingCompleter));
        let steps = vec![
            WorkflowStep::prompt("p", "hi"),
            WorkflowStep::command("never", "echo never"),
        ];
        let (run, events) = run_steps(&engine, &steps).await;
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.step_results[0].error.as_deref().unwrap().contains("no model"));
        assert_eq!(started_ids(&events), vec!["p"]);
    }

    #[tokio::test]
    async fn test_identical_inputs_identical_frames() {
        fn normalise(events: Vec<WorkflowEvent>) -> Vec<WorkflowEvent> {
            events
                .into_iter()
                .map(|e| match e {
                    WorkflowEvent::StepComplete { index, mut result } => {
                        result.duration = None;
                        WorkflowEvent::StepComplete { index, result }
                    }
                    WorkflowEvent::RunComplete { status, .. } => WorkflowEvent::RunComplete {
                        run_id: String::new(),
                        status,
                    },
                    other => other,
                })
                .collect()
        }

        let steps = vec![
            WorkflowStep::command("a", "echo PASS"),
            WorkflowStep::condition("c", "/pass/i.test(previousOutput)", Some("z"), None),
            WorkflowStep::command("b", "echo skipped"),
            WorkflowStep::command("z", "echo {{previousOutput}}; exit 1"),
        ];
        let engine = engine();
        let (first_run, first) = run_steps(&engine, &steps).await;
        let (second_run, second) = run_steps(&engine, &steps).await;

        assert_eq!(normalise(first), normalise(second));
        assert_eq!(first_run.status, RunStatus::Failed);
        assert_eq!(first_run.status, second_run.status);
    }
}
