//! Job record model: identity, status lifecycle and timestamps.

use std::sync::{LazyLock, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::{Generator, Ulid};

/// Process-wide monotonic generator so ids sort in insertion order even
/// within the same millisecond.
static GENERATOR: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID, strictly greater than any ID previously
    /// generated in this process.
    pub fn new() -> Self {
        let mut generator = GENERATOR.lock().unwrap_or_else(|e| e.into_inner());
        // Overflow only happens after 2^80 ids in one millisecond.
        Self(generator.generate().unwrap_or_else(|_| Ulid::new()))
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current status of a job in its lifecycle.
///
/// The forward path is `Waiting -> Working -> Done`. The only backward edge
/// is `Working -> Waiting`, taken when a stale job is requeued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Published but not yet claimed by any consumer.
    #[default]
    Waiting,
    /// Claimed by exactly one consumer, not yet marked complete.
    Working,
    /// Processing has been marked complete.
    Done,
}

impl JobStatus {
    pub const ALL: [JobStatus; 3] = [JobStatus::Waiting, JobStatus::Working, JobStatus::Done];

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done)
    }

    /// Check whether moving from `self` to `next` is a legal transition.
    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Waiting, JobStatus::Working)
                | (JobStatus::Working, JobStatus::Done)
                | (JobStatus::Working, JobStatus::Waiting)
        )
    }

    /// Statuses a record may be in to legally move to `next`.
    pub fn sources_of(next: JobStatus) -> Vec<JobStatus> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_advance_to(next))
            .collect()
    }

    /// Get a simple status string for display and queries.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Working => "working",
            JobStatus::Done => "done",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle timestamps of a job.
///
/// All three are set at publish time. `started` and `done` are placeholders
/// until the status reaches the matching stage; read them through
/// [`Job::started_at`] and [`Job::done_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub created: DateTime<Utc>,
    pub started: DateTime<Utc>,
    pub done: DateTime<Utc>,
}

impl Timestamps {
    /// All timestamps set to `at`.
    pub fn placeholder(at: DateTime<Utc>) -> Self {
        Self {
            created: at,
            started: at,
            done: at,
        }
    }
}

/// A job represents a unit of work stored in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier, immutable once inserted.
    pub id: JobId,
    /// Current status.
    pub status: JobStatus,
    /// Lifecycle timestamps.
    pub ts: Timestamps,
    /// Application data, opaque to the queue.
    pub payload: serde_json::Value,
}

impl Job {
    /// Create a new waiting job.
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            id: JobId::new(),
            status: JobStatus::Waiting,
            ts: Timestamps::placeholder(Utc::now()),
            payload,
        }
    }

    /// When the job was claimed, if it has been.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            JobStatus::Waiting => None,
            JobStatus::Working | JobStatus::Done => Some(self.ts.started),
        }
    }

    /// When the job was marked complete, if it has been.
    pub fn done_at(&self) -> Option<DateTime<Utc>> {
        self.status.is_terminal().then_some(self.ts.done)
    }

    /// How long the job has been in `Working`, measured against `now`.
    pub fn working_for(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        match self.status {
            JobStatus::Working => Some(now - self.ts.started),
            _ => None,
        }
    }
}
