//! The consumption loop.
//!
//! A [`Consumer`] repeatedly runs the claim protocol. When nothing is waiting,
//! or the store fails, it sleeps for the configured backoff before trying
//! again, so it never busy-loops and still picks up jobs published later.
//! The loop has no natural end; stop pulling to stop consuming.

use std::fmt;

use db::Store;
use futures_util::Stream;
use futures_util::stream;
use queue_core::{Job, JobId};

use crate::error::QueueError;
use crate::handle::JobQueue;

/// Outcome of one classified claim attempt.
#[derive(Debug)]
pub enum PollOutcome {
    /// A job was claimed and is now `working`.
    Claimed(Job),
    /// Nothing was waiting.
    Empty,
    /// A transient store failure, below the escalation limit.
    Failed(QueueError),
}

/// Counts consecutive store failures for escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureTracker {
    consecutive: u32,
    max: Option<u32>,
}

impl FailureTracker {
    /// `max = None` never escalates.
    pub fn new(max: Option<u32>) -> Self {
        Self {
            consecutive: 0,
            max,
        }
    }

    /// Record a failure, returning the new streak length.
    pub fn record(&mut self) -> u32 {
        self.consecutive = self.consecutive.saturating_add(1);
        self.consecutive
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn is_exhausted(&self) -> bool {
        self.max.is_some_and(|max| self.consecutive >= max)
    }
}

/// Pull-based consumption loop over a [`JobQueue`].
pub struct Consumer<'q, S> {
    queue: &'q JobQueue<S>,
    failures: FailureTracker,
}

impl<'q, S: Store> Consumer<'q, S> {
    pub(crate) fn new(queue: &'q JobQueue<S>) -> Self {
        Self {
            queue,
            failures: FailureTracker::new(queue.config().max_consecutive_failures),
        }
    }

    /// Current streak of store failures.
    pub fn consecutive_failures(&self) -> u32 {
        self.failures.consecutive()
    }

    /// Wait for the next job.
    ///
    /// Backs off while the queue is empty or the store is failing. Returns
    /// [`QueueError::Escalated`] once the store has failed
    /// `max_consecutive_failures` times in a row; calling `next` again starts
    /// a fresh streak.
    pub async fn next(&mut self) -> Result<ClaimedJob<'q, S>, QueueError> {
        loop {
            match self.queue.poll(&mut self.failures).await? {
                PollOutcome::Claimed(job) => return Ok(ClaimedJob::new(self.queue, job)),
                PollOutcome::Empty | PollOutcome::Failed(_) => {
                    tokio::time::sleep(self.queue.config().backoff()).await;
                }
            }
        }
    }

    /// The same loop as an endless stream.
    pub fn into_stream(self) -> impl Stream<Item = Result<ClaimedJob<'q, S>, QueueError>> {
        stream::unfold(self, |mut consumer| async move {
            let item = consumer.next().await;
            Some((item, consumer))
        })
    }
}

/// A job claimed by a [`Consumer`].
///
/// Settle it with [`ClaimedJob::complete`] or [`ClaimedJob::abandon`]. An
/// unsettled job stays `working` until the stale-job sweep requeues it.
#[must_use = "a claimed job stays working until it is completed or abandoned"]
pub struct ClaimedJob<'q, S: Store> {
    queue: &'q JobQueue<S>,
    job: Job,
    settled: bool,
}

impl<'q, S: Store> ClaimedJob<'q, S> {
    fn new(queue: &'q JobQueue<S>, job: Job) -> Self {
        Self {
            queue,
            job,
            settled: false,
        }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn id(&self) -> JobId {
        self.job.id
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.job.payload
    }

    /// Mark the job done. Fails with [`QueueError::StuckJob`] if the claim
    /// was requeued as stuck before this call.
    pub async fn complete(mut self) -> Result<(), QueueError> {
        self.settled = true;
        self.queue.complete_job(&self.job).await
    }

    /// Report a processing failure. The record stays `working`.
    pub fn abandon(mut self, reason: impl fmt::Display) {
        self.settled = true;
        self.queue.abandon(self.job.id, reason);
    }
}

impl<S: Store> fmt::Debug for ClaimedJob<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimedJob")
            .field("queue", &self.queue.name())
            .field("job", &self.job)
            .field("settled", &self.settled)
            .finish()
    }
}

impl<S: Store> Drop for ClaimedJob<'_, S> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(
                queue = %self.queue.name(),
                job_id = %self.job.id,
                "Claimed job dropped without completion; it stays working"
            );
        }
    }
}
