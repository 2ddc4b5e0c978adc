//! Store adapter interface.
//!
//! A [`Store`] is one bounded collection of job records. Every coordination
//! guarantee of the queue rests on [`Store::atomic_claim`] being indivisible:
//! two callers racing for the same record must never both observe it.

use std::future::Future;

use chrono::{DateTime, Utc};
use queue_core::{Job, JobId, JobStatus, ReturnDocument, Timestamps};

use crate::StoreError;

/// Predicate over job records. Unset fields match anything.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct JobFilter {
    pub id: Option<JobId>,
    pub status: Option<JobStatus>,
    /// Status must be one of these.
    pub status_in: Option<Vec<JobStatus>>,
    pub payload: Option<serde_json::Value>,
    /// Exact `ts.started` match, used to make requeues compare-and-set.
    pub started: Option<DateTime<Utc>>,
}

impl JobFilter {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn id(id: JobId) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    /// Only records whose status may legally move to `next`.
    pub fn advancing_to(mut self, next: JobStatus) -> Self {
        self.status_in = Some(JobStatus::sources_of(next));
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_started(mut self, started: DateTime<Utc>) -> Self {
        self.started = Some(started);
        self
    }

    /// Evaluate the predicate against a record.
    pub fn matches(&self, job: &Job) -> bool {
        self.id.is_none_or(|id| job.id == id)
            && self.status.is_none_or(|s| job.status == s)
            && self.status_in.as_ref().is_none_or(|s| s.contains(&job.status))
            && self.payload.as_ref().is_none_or(|p| &job.payload == p)
            && self.started.is_none_or(|t| job.ts.started == t)
    }
}

/// Field assignments applied by an update.
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub started: Option<DateTime<Utc>>,
    pub done: Option<DateTime<Utc>>,
    /// Replace all timestamps (used by requeue and upsert-replace).
    pub reset_ts: Option<Timestamps>,
}

impl JobUpdate {
    /// waiting -> working, stamping `started`.
    pub fn claim(now: DateTime<Utc>) -> Self {
        Self {
            status: JobStatus::Working,
            started: Some(now),
            done: None,
            reset_ts: None,
        }
    }

    /// working -> done, stamping `done`.
    pub fn complete(now: DateTime<Utc>) -> Self {
        Self {
            status: JobStatus::Done,
            started: None,
            done: Some(now),
            reset_ts: None,
        }
    }

    /// working -> waiting, keeping `created` and resetting the placeholders.
    pub fn requeue(created: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            status: JobStatus::Waiting,
            started: None,
            done: None,
            reset_ts: Some(Timestamps {
                created,
                started: now,
                done: now,
            }),
        }
    }

    /// Apply the assignments to an in-memory record.
    pub fn apply(&self, job: &mut Job) {
        job.status = self.status;
        if let Some(ts) = self.reset_ts {
            job.ts = ts;
        }
        if let Some(started) = self.started {
            job.ts.started = started;
        }
        if let Some(done) = self.done {
            job.ts.done = done;
        }
    }
}

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    /// An existing record was overwritten in place.
    Replaced(JobId),
    /// No record matched; a new one was inserted.
    Inserted(JobId),
}

impl Upserted {
    pub fn id(&self) -> JobId {
        match self {
            Upserted::Replaced(id) | Upserted::Inserted(id) => *id,
        }
    }
}

/// Result of a guarded update by id.
#[derive(Debug, Clone, PartialEq)]
pub enum Updated {
    /// The update was applied; the record as it is now.
    Applied(Job),
    /// The record exists but failed the guard; the record as it is.
    Rejected(Job),
    /// No record with that id.
    Missing,
}

/// Trait for bounded job collections.
///
/// Implementations must make [`Store::atomic_claim`] indivisible across all
/// handles to the same collection. When `capacity()` is `Some(n)`, inserting
/// the `n + 1`th record evicts the oldest record by insertion order,
/// whatever its status. Evicted jobs are lost silently; that is the only
/// backpressure a bounded store offers.
pub trait Store: Send + Sync + 'static {
    /// Collection name.
    fn name(&self) -> &str;

    /// Maximum number of records, `None` when unbounded.
    fn capacity(&self) -> Option<usize>;

    /// Make sure the collection exists.
    ///
    /// Returns `true` when it already existed, `false` when it was created.
    fn ensure(&self) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Find the oldest record matching `filter`, apply `update` and return the
    /// record as it was before or after the update.
    ///
    /// Returns `Ok(None)` when nothing matches.
    fn atomic_claim(
        &self,
        filter: &JobFilter,
        update: &JobUpdate,
        returning: ReturnDocument,
    ) -> impl Future<Output = Result<Option<Job>, StoreError>> + Send;

    /// Apply `update` to the record with `id`, as one indivisible step, if
    /// the record matches `guard` and its status may advance to
    /// `update.status`.
    fn update_by_id(
        &self,
        id: JobId,
        guard: &JobFilter,
        update: &JobUpdate,
    ) -> impl Future<Output = Result<Updated, StoreError>> + Send;

    /// Insert a new record.
    fn insert(&self, job: &Job) -> impl Future<Output = Result<JobId, StoreError>> + Send;

    /// Overwrite the oldest record matching `filter` with `job`'s status,
    /// timestamps and payload, or insert `job` if none matches.
    fn upsert(
        &self,
        filter: &JobFilter,
        job: &Job,
    ) -> impl Future<Output = Result<Upserted, StoreError>> + Send;

    /// Count records matching `filter`.
    fn count_matching(
        &self,
        filter: &JobFilter,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// All records matching `filter`, oldest first.
    fn find(&self, filter: &JobFilter)
    -> impl Future<Output = Result<Vec<Job>, StoreError>> + Send;

    /// Remove the whole collection. Returns `true` if it existed.
    fn drop_all(&self) -> impl Future<Output = Result<bool, StoreError>> + Send;
}
