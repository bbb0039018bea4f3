//! Shared application state for the axum server and the CLI.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::db::Database;
use crate::process::{ProcessRunner, SessionRegistry};
use crate::store::{RunStore, WorkflowStore};
use crate::workflow::{PromptCompleter, RunRegistry, WorkflowEngine};

/// Shared state accessible by all API handlers.
pub struct AppStateInner {
    pub db: Database,
    pub config: EngineConfig,
    pub workflow_store: WorkflowStore,
    pub run_store: RunStore,
    pub runner: ProcessRunner,
    pub engine: Arc<WorkflowEngine>,
    pub sessions: SessionRegistry,
    pub runs: RunRegistry,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    pub fn new(db: Database, config: EngineConfig) -> Self {
        let runner = ProcessRunner::new(config.clone());
        let engine = WorkflowEngine::new(runner.clone());
        Self::with_engine(db, config, runner, engine)
    }

    /// State whose prompt steps go to `prompts` instead of the echo stand-in.
    pub fn with_prompt_completer(
        db: Database,
        config: EngineConfig,
        prompts: Arc<dyn PromptCompleter>,
    ) -> Self {
        let runner = ProcessRunner::new(config.clone());
        let engine = WorkflowEngine::new(runner.clone()).with_prompt_completer(prompts);
        Self::with_engine(db, config, runner, engine)
    }

    fn with_engine(
        db: Database,
        config: EngineConfig,
        runner: ProcessRunner,
        engine: WorkflowEngine,
    ) -> Self {
        Self {
            workflow_store: WorkflowStore::new(db.clone()),
            run_store: RunStore::new(db.clone()),
            runner,
            engine: Arc::new(engine),
            sessions: SessionRegistry::new(),
            runs: RunRegistry::new(),
            config,
            db,
        }
    }
}
