//! Store error taxonomy.

use thiserror::Error;

/// Errors raised by store adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport or connection failure; the store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The store rejected an insert or upsert.
    #[error("write rejected: {0}")]
    Write(String),
    /// Store or collection configuration is unusable.
    #[error("invalid store config: {0}")]
    InvalidConfig(String),
    /// A stored record could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub(crate) fn write(err: impl std::fmt::Display) -> Self {
        StoreError::Write(err.to_string())
    }

    /// Whether the failure was a write rejection rather than an outage.
    pub fn is_write(&self) -> bool {
        matches!(self, StoreError::Write(_))
    }
}

impl From<surrealdb::Error> for StoreError {
    fn from(err: surrealdb::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Whether a SurrealDB error is a retryable transaction conflict, which the
/// claim protocol treats as a lost race.
pub(crate) fn is_conflict(err: &surrealdb::Error) -> bool {
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("conflict") || msg.contains("can be retried")
}
