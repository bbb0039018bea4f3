//! `shellflow workflow` — Run or validate YAML/JSON workflow definitions.

use std::path::Path;

use shellflow_core::state::AppState;
use shellflow_core::workflow::{
    RunStatus, SpawnedRun, WorkflowDefinition, WorkflowEvent, WorkflowRun,
};

use super::print_json_line;

/// Load a definition from disk. A definition without an id takes the file stem.
pub fn load(workflow_file: &str) -> Result<WorkflowDefinition, String> {
    let mut workflow = WorkflowDefinition::from_file(workflow_file).map_err(|e| e.to_string())?;
    if workflow.id.trim().is_empty() {
        workflow.id = Path::new(workflow_file)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "workflow".to_string());
    }
    Ok(workflow)
}

/// Run `workflow`, handing every progress frame to `on_event`. Ctrl-C
/// cancels the run. The finished run is saved to the run store.
pub async fn execute<F>(
    state: &AppState,
    workflow: &WorkflowDefinition,
    cwd: &str,
    mut on_event: F,
) -> Result<WorkflowRun, String>
where
    F: FnMut(&WorkflowEvent),
{
    let SpawnedRun {
        handle,
        mut events,
        join,
    } = state
        .engine
        .spawn(&workflow.id, workflow.steps.clone(), cwd.to_string());
    state.runs.register(handle.clone()).await;

    let interrupt = {
        let handle = handle.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("[workflow] interrupt, cancelling run {}", handle.run_id());
                handle.cancel();
            }
        })
    };

    while let Some(event) = events.recv().await {
        on_event(&event);
    }
    interrupt.abort();

    let run = join
        .await
        .map_err(|e| format!("Workflow task failed: {}", e))?;
    state.runs.remove(handle.run_id()).await;

    if let Err(e) = state.run_store.save(&run).await {
        tracing::warn!("[workflow] failed to save run {}: {}", run.id, e);
    }
    Ok(run)
}

/// Run a workflow file, printing frames as JSON lines. Exits non-zero
/// unless the run completed.
pub async fn run(state: &AppState, workflow_file: &str, cwd: &str) -> Result<i32, String> {
    let workflow = load(workflow_file)?;
    for warning in workflow.lint() {
        eprintln!("warning: {}", warning);
    }
    tracing::info!(
        "[workflow] running '{}' ({} step(s)) from {}",
        workflow.name,
        workflow.steps.len(),
        workflow_file
    );

    let run = execute(state, &workflow, cwd, |event: &WorkflowEvent| {
        print_json_line(event)
    })
    .await?;
    Ok(if run.status == RunStatus::Completed { 0 } else { 1 })
}

/// Validate a workflow file without executing it.
pub async fn validate(workflow_file: &str) -> Result<i32, String> {
    let workflow = load(workflow_file)?;

    println!("Workflow '{}' is valid", workflow.name);
    println!("   Steps: {}", workflow.steps.len());
    for (i, step) in workflow.steps.iter().enumerate() {
        println!(
            "   {}. {} ({})",
            i + 1,
            step.display_name(),
            step.step_type().as_str()
        );
    }

    for warning in workflow.lint() {
        println!("   warning: {}", warning);
    }
    Ok(0)
}
