use rusqlite::OptionalExtension;

use super::json_column;
use crate::db::Database;
use crate::error::ServerError;
use crate::workflow::WorkflowRun;

pub struct RunStore {
    db: Database,
}

impl RunStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn save(&self, run: &WorkflowRun) -> Result<(), ServerError> {
        let run = run.clone();
        let body = serde_json::to_string(&run)
            .map_err(|e| ServerError::Internal(format!("Failed to encode run: {}", e)))?;
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO workflow_runs (id, workflow_id, status, run, started_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET
                       status = excluded.status,
                       run = excluded.run",
                    rusqlite::params![
                        run.id,
                        run.workflow_id,
                        run.status.as_str(),
                        body,
                        run.started_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<WorkflowRun>, ServerError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    "SELECT run FROM workflow_runs WHERE id = ?1",
                    rusqlite::params![id],
                    |row| json_column(row, 0),
                )
                .optional()
            })
            .await
    }

    pub async fn list(&self) -> Result<Vec<WorkflowRun>, ServerError> {
        self.db
            .with_conn_async(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT run FROM workflow_runs ORDER BY started_at DESC")?;
                let rows = stmt
                    .query_map([], |row| json_column(row, 0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn list_by_workflow(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<WorkflowRun>, ServerError> {
        let workflow_id = workflow_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT run FROM workflow_runs WHERE workflow_id = ?1 ORDER BY started_at DESC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![workflow_id], |row| json_column(row, 0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, ServerError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let n = conn.execute(
                    "DELETE FROM workflow_runs WHERE id = ?1",
                    rusqlite::params![id],
                )?;
                Ok(n > 0)
            })
            .await
    }
}
