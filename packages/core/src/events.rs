//! Event types for observing queue activity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JobId;

/// Events emitted by a queue handle and its consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    // Producer events
    /// A new job was inserted.
    JobPublished {
        queue: String,
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
    /// A waiting job with identical payload was overwritten in place.
    JobReplaced {
        queue: String,
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },

    // Consumer events
    /// A job moved from waiting to working.
    JobClaimed {
        queue: String,
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
    /// A job was marked done. The duration is known when the claimed
    /// record was at hand.
    JobCompleted {
        queue: String,
        job_id: JobId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        timestamp: DateTime<Utc>,
    },
    /// Processing failed; the job stays working until it is requeued.
    JobAbandoned {
        queue: String,
        job_id: JobId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// A stale working job was put back to waiting.
    JobRequeued {
        queue: String,
        job_id: JobId,
        stale_for_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A claim attempt found nothing waiting.
    QueueIdle {
        queue: String,
        timestamp: DateTime<Utc>,
    },
    /// A store operation failed inside the consumption loop.
    StoreFailure {
        queue: String,
        error: String,
        consecutive: u32,
        timestamp: DateTime<Utc>,
    },

    // Administrative events
    /// The whole collection was dropped.
    QueueCleared {
        queue: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobPublished { timestamp, .. } => *timestamp,
            JobEvent::JobReplaced { timestamp, .. } => *timestamp,
            JobEvent::JobClaimed { timestamp, .. } => *timestamp,
            JobEvent::JobCompleted { timestamp, .. } => *timestamp,
            JobEvent::JobAbandoned { timestamp, .. } => *timestamp,
            JobEvent::JobRequeued { timestamp, .. } => *timestamp,
            JobEvent::QueueIdle { timestamp, .. } => *timestamp,
            JobEvent::StoreFailure { timestamp, .. } => *timestamp,
            JobEvent::QueueCleared { timestamp, .. } => *timestamp,
        }
    }

    /// Get the queue name the event belongs to.
    pub fn queue(&self) -> &str {
        match self {
            JobEvent::JobPublished { queue, .. }
            | JobEvent::JobReplaced { queue, .. }
            | JobEvent::JobClaimed { queue, .. }
            | JobEvent::JobCompleted { queue, .. }
            | JobEvent::JobAbandoned { queue, .. }
            | JobEvent::JobRequeued { queue, .. }
            | JobEvent::QueueIdle { queue, .. }
            | JobEvent::StoreFailure { queue, .. }
            | JobEvent::QueueCleared { queue, .. } => queue,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            JobEvent::JobPublished { job_id, .. } => Some(*job_id),
            JobEvent::JobReplaced { job_id, .. } => Some(*job_id),
            JobEvent::JobClaimed { job_id, .. } => Some(*job_id),
            JobEvent::JobCompleted { job_id, .. } => Some(*job_id),
            JobEvent::JobAbandoned { job_id, .. } => Some(*job_id),
            JobEvent::JobRequeued { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobPublished { job_id, .. } => format!("Job {} published", job_id),
            JobEvent::JobReplaced { job_id, .. } => format!("Job {} replaced", job_id),
            JobEvent::JobClaimed { job_id, .. } => format!("Job {} claimed", job_id),
            JobEvent::JobCompleted {
                job_id,
                duration_ms: Some(ms),
                ..
            } => format!("Job {} completed in {}ms", job_id, ms),
            JobEvent::JobCompleted { job_id, .. } => format!("Job {} completed", job_id),
            JobEvent::JobAbandoned { job_id, error, .. } => {
                format!("Job {} abandoned: {}", job_id, error)
            }
            JobEvent::JobRequeued {
                job_id,
                stale_for_ms,
                ..
            } => format!("Job {} requeued after {}ms", job_id, stale_for_ms),
            JobEvent::QueueIdle { queue, .. } => format!("Queue '{}' is empty", queue),
            JobEvent::StoreFailure {
                queue,
                error,
                consecutive,
                ..
            } => format!(
                "Queue '{}' store failure #{}: {}",
                queue, consecutive, error
            ),
            JobEvent::QueueCleared { queue, .. } => format!("Queue '{}' cleared", queue),
        }
    }
}
