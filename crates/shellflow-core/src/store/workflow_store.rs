use chrono::Utc;
use rusqlite::OptionalExtension;

use super::json_column;
use crate::db::Database;
use crate::error::ServerError;
use crate::workflow::WorkflowDefinition;

pub struct WorkflowStore {
    db: Database,
}

impl WorkflowStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or replace a definition. Step ids are validated first.
    pub async fn save(&self, workflow: &WorkflowDefinition) -> Result<(), ServerError> {
        workflow.validate()?;
        if workflow.id.trim().is_empty() {
            return Err(ServerError::BadRequest("Workflow id is required".into()));
        }

        let wf = workflow.clone();
        let definition = serde_json::to_string(&wf)
            .map_err(|e| ServerError::Internal(format!("Failed to encode workflow: {}", e)))?;
        let now = Utc::now().timestamp_millis();
        let created = wf.created_at.map(|t| t.timestamp_millis()).unwrap_or(now);
        let updated = wf.updated_at.map(|t| t.timestamp_millis()).unwrap_or(now);
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO workflows (id, name, definition, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET
                       name = excluded.name,
                       definition = excluded.definition,
                       updated_at = excluded.updated_at",
                    rusqlite::params![wf.id, wf.name, definition, created, updated],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<WorkflowDefinition>, ServerError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    "SELECT definition FROM workflows WHERE id = ?1",
                    rusqlite::params![id],
                    |row| json_column(row, 0),
                )
                .optional()
            })
            .await
    }

    pub async fn list(&self) -> Result<Vec<WorkflowDefinition>, ServerError> {
        self.db
            .with_conn_async(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT definition FROM workflows ORDER BY updated_at DESC")?;
                let rows = stmt
                    .query_map([], |row| json_column(row, 0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Returns `true` if a row was removed.
    pub async fn delete(&self, id: &str) -> Result<bool, ServerError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let n = conn.execute("DELETE FROM workflows WHERE id = ?1", rusqlite::params![id])?;
                Ok(n > 0)
            })
            .await
    }
}
