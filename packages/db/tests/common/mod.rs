use db::{DbConfig, StoreError, SurrealStore};

/// Each `mem://` connection gets its own datastore, so tests don't share state.
pub async fn setup_store(capacity: Option<usize>) -> Result<SurrealStore, StoreError> {
    let config = DbConfig::memory()
        .with_collection("jobqueue")
        .with_capacity(capacity);
    SurrealStore::connect(&config).await
}
