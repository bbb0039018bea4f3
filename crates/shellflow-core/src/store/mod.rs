pub mod run_store;
pub mod workflow_store;

pub use run_store::RunStore;
pub use workflow_store::WorkflowStore;

/// Map a JSON column decode failure into a rusqlite row error.
pub(crate) fn json_column<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> Result<T, rusqlite::Error> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
