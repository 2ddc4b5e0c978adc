//! Error types for queue operations.

use chrono::{DateTime, Utc};
use db::StoreError;
use queue_core::{ConfigError, JobId, JobStatus};
use thiserror::Error;

/// Errors surfaced by [`JobQueue`](crate::JobQueue) and its consumers.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The store could not be reached.
    #[error(transparent)]
    StoreUnavailable(StoreError),

    /// The store rejected an insert or upsert.
    #[error(transparent)]
    StoreWrite(StoreError),

    /// Nothing is waiting. Expected, not exceptional.
    #[error("queue is empty")]
    QueueEmpty,

    /// A claim was held past the stale threshold and taken back by
    /// [`JobQueue::requeue_stale`](crate::JobQueue::requeue_stale).
    #[error("job {id} stuck in working since {started}")]
    StuckJob { id: JobId, started: DateTime<Utc> },

    /// The record is gone (evicted or cleared).
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// The record's status does not allow the requested move.
    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    /// The consumer hit its consecutive failure limit.
    #[error("giving up after {consecutive} consecutive failures: {source}")]
    Escalated {
        consecutive: u32,
        #[source]
        source: Box<QueueError>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<StoreError> for QueueError {
    fn from(err: StoreError) -> Self {
        if err.is_write() {
            QueueError::StoreWrite(err)
        } else {
            QueueError::StoreUnavailable(err)
        }
    }
}

impl QueueError {
    /// Whether retrying after a backoff may succeed. Consumers escalate
    /// anything else right away.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::StoreUnavailable(_) | QueueError::QueueEmpty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_classified() {
        let write: QueueError = StoreError::Write("duplicate".into()).into();
        assert!(matches!(write, QueueError::StoreWrite(_)));
        assert!(!write.is_transient());

        let down: QueueError = StoreError::Unavailable("refused".into()).into();
        assert!(matches!(down, QueueError::StoreUnavailable(_)));
        assert!(down.is_transient());
    }

    #[test]
    fn escalation_keeps_the_cause() {
        let err = QueueError::Escalated {
            consecutive: 3,
            source: Box::new(StoreError::Unavailable("refused".into()).into()),
        };
        assert_eq!(
            err.to_string(),
            "giving up after 3 consecutive failures: store unavailable: refused"
        );
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let id = JobId::new();
        let err = QueueError::InvalidTransition {
            id,
            from: JobStatus::Waiting,
            to: JobStatus::Done,
        };
        assert_eq!(err.to_string(), format!("job {id} cannot move from waiting to done"));
        assert!(!err.is_transient());
    }
}
