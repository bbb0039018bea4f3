//! In-flight workflow runs, addressable by run id for cancellation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Cancellation handle for one run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    run_id: String,
    cancel: CancellationToken,
}

impl RunHandle {
    pub fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The token the engine watches.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[derive(Clone, Default)]
pub struct RunRegistry {
    runs: Arc<RwLock<HashMap<String, RunHandle>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, handle: RunHandle) {
        self.runs.write().await.insert(handle.run_id.clone(), handle);
    }

    pub async fn remove(&self, run_id: &str) -> Option<RunHandle> {
        self.runs.write().await.remove(run_id)
    }

    /// Cancel a live run. Returns `false` if the id is unknown.
    pub async fn cancel(&self, run_id: &str) -> bool {
        match self.runs.read().await.get(run_id) {
            Some(handle) => {
                tracing::info!("[RunRegistry] Cancelling run {}", run_id);
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn active(&self) -> Vec<String> {
        self.runs.read().await.keys().cloned().collect()
    }
}
