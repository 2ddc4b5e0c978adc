//! Persistent job queue over a bounded document store.
//!
//! Producers [`publish`](JobQueue::publish) JSON payloads; consumers claim
//! them one at a time through a single atomic find-and-update, so any number
//! of processes can share one collection without a coordinator.
//!
//! ```ignore
//! let queue = JobQueue::open(MemoryStore::new("jobs"), QueueConfig::default()).await?;
//! queue.publish(json!({"task": "A"})).await?;
//!
//! let mut consumer = queue.consume();
//! let job = consumer.next().await?;
//! process(job.payload());
//! job.complete().await?;
//! ```
//!
//! Delivery is at-most-once per claim. A job whose consumer dies stays
//! `working` until [`JobQueue::requeue_stale`] puts it back.

mod claim;
mod consumer;
mod error;
mod handle;

pub use consumer::{ClaimedJob, Consumer, FailureTracker, PollOutcome};
pub use error::QueueError;
pub use handle::JobQueue;

pub use db::{MemoryStore, Store, StoreError, SurrealStore, Upserted};
pub use queue_core::{Job, JobEvent, JobId, JobStatus, QueueConfig, ReturnDocument, Timestamps};
