//! Collection bootstrap using SurrealQL.

use crate::{Database, StoreError};

/// Reject table names that cannot be spliced into DEFINE/REMOVE statements.
pub(crate) fn validate_table_name(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::InvalidConfig(format!(
            "invalid collection name: {name:?}"
        )))
    }
}

/// Check whether a table is defined in the current database.
pub async fn table_exists(db: &Database, table: &str) -> Result<bool, StoreError> {
    let mut response = db.query("INFO FOR DB").await?;
    let info: Option<serde_json::Value> = response.take(0)?;

    Ok(info
        .as_ref()
        .and_then(|v| v.get("tables"))
        .and_then(|t| t.get(table))
        .is_some())
}

/// Define the queue table and its status index if missing.
///
/// Returns `true` if the table already existed.
pub async fn ensure_collection(db: &Database, table: &str) -> Result<bool, StoreError> {
    validate_table_name(table)?;

    if table_exists(db, table).await? {
        return Ok(true);
    }

    tracing::info!(collection = %table, "Creating jobqueue collection");

    // Timestamps stay serde strings, so the table is schemaless.
    db.query(format!(
        r#"
        DEFINE TABLE IF NOT EXISTS {table} SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS {table}_status ON {table} FIELDS status;
        "#
    ))
    .await?
    .check()?;

    Ok(false)
}

/// Remove the queue table and every record in it.
pub async fn remove_collection(db: &Database, table: &str) -> Result<bool, StoreError> {
    validate_table_name(table)?;

    if !table_exists(db, table).await? {
        return Ok(false);
    }

    db.query(format!("REMOVE TABLE {table};")).await?.check()?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names() {
        assert!(validate_table_name("jobqueue").is_ok());
        assert!(validate_table_name("_jobs_2").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("2jobs").is_err());
        assert!(validate_table_name("jobs; REMOVE DATABASE main").is_err());
    }
}
