//! The claim protocol.
//!
//! A claim is a single [`Store::atomic_claim`] with predicate
//! `status = waiting` and update `status = working, started = now`. The store
//! guarantees that two racing claimers never both observe the same record.
//!
//! Candidates are taken oldest-first by insertion order. That is a
//! best-effort ordering across consumers, not a FIFO promise: a slow consumer
//! may finish an older job after a fast one finishes a newer job.

use chrono::{DateTime, Utc};
use db::{JobFilter, JobUpdate, Store, StoreError};
use queue_core::{Job, JobStatus, ReturnDocument};

/// Claim one waiting job, or `None` if nothing is waiting.
pub(crate) async fn claim_waiting<S: Store>(
    store: &S,
    returning: ReturnDocument,
) -> Result<Option<Job>, StoreError> {
    store
        .atomic_claim(
            &JobFilter::status(JobStatus::Waiting),
            &JobUpdate::claim(Utc::now()),
            returning,
        )
        .await
}

/// Put a stale job back to waiting, but only if it is still exactly the
/// claim we observed (same id, still working, same `started`).
pub(crate) async fn requeue_if_unchanged<S: Store>(
    store: &S,
    observed: &Job,
    now: DateTime<Utc>,
) -> Result<Option<Job>, StoreError> {
    let filter = JobFilter {
        id: Some(observed.id),
        status: Some(JobStatus::Working),
        started: Some(observed.ts.started),
        ..Default::default()
    };

    store
        .atomic_claim(
            &filter,
            &JobUpdate::requeue(observed.ts.created, now),
            ReturnDocument::After,
        )
        .await
}
