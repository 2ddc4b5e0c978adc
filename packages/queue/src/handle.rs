//! The queue handle applications use.

use std::time::Duration;

use chrono::{DateTime, Utc};
use db::{JobFilter, JobUpdate, Store, Updated, Upserted};
use queue_core::{Job, JobEvent, JobId, JobStatus, QueueConfig};
use tokio::sync::broadcast;

use crate::claim::{claim_waiting, requeue_if_unchanged};
use crate::consumer::{Consumer, FailureTracker, PollOutcome};
use crate::error::QueueError;

/// Capacity of the event channel; slow subscribers lose the oldest events.
const EVENT_BUFFER: usize = 1024;

/// Handle to one logical queue stored in one bounded collection.
///
/// Handles hold no shared in-process state besides the event channel: any
/// number of handles, in any number of processes, may point at the same
/// collection. All coordination happens in the store.
///
/// # Data loss
///
/// When the store is bounded, producers that outpace consumers cause the
/// oldest records to be evicted, including jobs that were never claimed.
/// Publishing never fails because the collection is full.
#[derive(Clone)]
pub struct JobQueue<S> {
    store: S,
    config: QueueConfig,
    events: broadcast::Sender<JobEvent>,
}

impl<S: Store> JobQueue<S> {
    /// Open a queue on `store`, creating the collection if needed.
    pub async fn open(store: S, config: QueueConfig) -> Result<Self, QueueError> {
        config.validate()?;

        if !store.ensure().await? {
            tracing::info!(
                queue = %store.name(),
                capacity = ?store.capacity(),
                "Created queue collection"
            );
        }

        let (events, _) = broadcast::channel(EVENT_BUFFER);

        Ok(Self {
            store,
            config,
            events,
        })
    }

    /// Queue (collection) name.
    pub fn name(&self) -> &str {
        self.store.name()
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether the underlying collection evicts old records when full.
    pub fn is_capped(&self) -> bool {
        self.store.capacity().is_some()
    }

    /// Subscribe to queue events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Publish a new waiting job.
    ///
    /// All three timestamps are set to now; `started` and `done` are
    /// placeholders until the status moves on.
    pub async fn publish(&self, payload: serde_json::Value) -> Result<JobId, QueueError> {
        let job = Job::new(payload);
        let id = self.store.insert(&job).await?;

        tracing::debug!(queue = %self.name(), job_id = %id, "Job published");
        self.emit(JobEvent::JobPublished {
            queue: self.name().to_string(),
            job_id: id,
            timestamp: job.ts.created,
        });

        Ok(id)
    }

    /// Publish a job unless an identical payload is already waiting, in which
    /// case that record is overwritten in place with fresh timestamps.
    ///
    /// Two producers racing with the same payload may still both insert; the
    /// store offers no unique constraint on payloads.
    pub async fn publish_unique(&self, payload: serde_json::Value) -> Result<Upserted, QueueError> {
        let job = Job::new(payload);
        let filter = JobFilter::status(JobStatus::Waiting).with_payload(job.payload.clone());
        let outcome = self.store.upsert(&filter, &job).await?;

        let queue = self.name().to_string();
        match outcome {
            Upserted::Inserted(job_id) => {
                tracing::debug!(queue = %queue, job_id = %job_id, "Job published");
                self.emit(JobEvent::JobPublished {
                    queue,
                    job_id,
                    timestamp: job.ts.created,
                });
            }
            Upserted::Replaced(job_id) => {
                tracing::debug!(queue = %queue, job_id = %job_id, "Waiting job replaced");
                self.emit(JobEvent::JobReplaced {
                    queue,
                    job_id,
                    timestamp: job.ts.created,
                });
            }
        }

        Ok(outcome)
    }

    /// Run one claim attempt.
    ///
    /// Returns `Ok(None)` when nothing is waiting. The claimed job stays
    /// `working` until [`JobQueue::complete`] is called.
    pub async fn claim_next(&self) -> Result<Option<Job>, QueueError> {
        let claimed = claim_waiting(&self.store, self.config.returning).await?;

        if let Some(job) = &claimed {
            tracing::debug!(queue = %self.name(), job_id = %job.id, "Job claimed");
            self.emit(JobEvent::JobClaimed {
                queue: self.name().to_string(),
                job_id: job.id,
                timestamp: Utc::now(),
            });
        }

        Ok(claimed)
    }

    /// Like [`JobQueue::claim_next`], with an empty queue reported as
    /// [`QueueError::QueueEmpty`].
    pub async fn try_claim(&self) -> Result<Job, QueueError> {
        self.claim_next().await?.ok_or(QueueError::QueueEmpty)
    }

    /// Mark a claimed job done.
    ///
    /// Only a `working` record can finish. Fails with
    /// [`QueueError::InvalidTransition`] when the record is waiting or
    /// already done, and with [`QueueError::JobNotFound`] when it was evicted
    /// or the queue cleared while the job was being processed.
    pub async fn complete(&self, id: JobId) -> Result<(), QueueError> {
        self.mark_done(id, None).await
    }

    /// [`JobQueue::complete`] for a claimed record at hand. The record must
    /// still be this exact claim, and the completion event carries the
    /// processing time.
    ///
    /// Fails with [`QueueError::StuckJob`] when the claim was requeued by
    /// [`JobQueue::requeue_stale`] in the meantime, whether or not another
    /// consumer has picked the job up since.
    pub async fn complete_job(&self, job: &Job) -> Result<(), QueueError> {
        self.mark_done(job.id, job.started_at()).await
    }

    /// Report that processing a claimed job failed.
    ///
    /// Nothing is written: the record stays `working` until
    /// [`JobQueue::requeue_stale`] picks it up.
    pub fn abandon(&self, id: JobId, reason: impl std::fmt::Display) {
        let error = reason.to_string();

        tracing::error!(queue = %self.name(), job_id = %id, error = %error, "Job processing failed");
        self.emit(JobEvent::JobAbandoned {
            queue: self.name().to_string(),
            job_id: id,
            error,
            timestamp: Utc::now(),
        });
    }

    async fn mark_done(
        &self,
        id: JobId,
        started: Option<DateTime<Utc>>,
    ) -> Result<(), QueueError> {
        let now = Utc::now();
        let guard = JobFilter {
            started,
            ..Default::default()
        };

        match self
            .store
            .update_by_id(id, &guard, &JobUpdate::complete(now))
            .await?
        {
            Updated::Applied(_) => {}
            Updated::Missing => {
                tracing::warn!(
                    queue = %self.name(),
                    job_id = %id,
                    "Job vanished before completion (evicted or cleared)"
                );
                return Err(QueueError::JobNotFound(id));
            }
            Updated::Rejected(current) => {
                let err = match started {
                    Some(started) if current.ts.started != started => {
                        QueueError::StuckJob { id, started }
                    }
                    _ => QueueError::InvalidTransition {
                        id,
                        from: current.status,
                        to: JobStatus::Done,
                    },
                };
                tracing::warn!(queue = %self.name(), error = %err, "Completion refused");
                return Err(err);
            }
        }

        let duration_ms = started.map(|s| (now - s).num_milliseconds().max(0) as u64);

        tracing::debug!(queue = %self.name(), job_id = %id, ?duration_ms, "Job completed");
        self.emit(JobEvent::JobCompleted {
            queue: self.name().to_string(),
            job_id: id,
            duration_ms,
            timestamp: now,
        });

        Ok(())
    }

    /// Number of waiting jobs. Approximate while others publish or claim.
    pub async fn count(&self) -> Result<u64, QueueError> {
        self.count_by_status(JobStatus::Waiting).await
    }

    /// Number of jobs in `status`.
    pub async fn count_by_status(&self, status: JobStatus) -> Result<u64, QueueError> {
        Ok(self.store.count_matching(&JobFilter::status(status)).await?)
    }

    /// Look up a job by id.
    pub async fn get(&self, id: JobId) -> Result<Option<Job>, QueueError> {
        Ok(self.store.find(&JobFilter::id(id)).await?.into_iter().next())
    }

    /// Drop the whole collection, every record in every status.
    pub async fn clear(&self) -> Result<(), QueueError> {
        let existed = self.store.drop_all().await?;

        tracing::info!(queue = %self.name(), existed, "Queue cleared");
        self.emit(JobEvent::QueueCleared {
            queue: self.name().to_string(),
            timestamp: Utc::now(),
        });

        Ok(())
    }

    /// Start a consumption loop over this queue.
    pub fn consume(&self) -> Consumer<'_, S> {
        Consumer::new(self)
    }

    /// Jobs that have been `working` for at least `older_than`.
    pub async fn stuck_jobs(&self, older_than: Duration) -> Result<Vec<Job>, QueueError> {
        let threshold = chrono::Duration::from_std(older_than).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();

        let working = self
            .store
            .find(&JobFilter::status(JobStatus::Working))
            .await?;

        Ok(working
            .into_iter()
            .filter(|job| job.working_for(now).is_some_and(|d| d >= threshold))
            .collect())
    }

    /// Put jobs stuck in `working` for at least `older_than` back to waiting.
    ///
    /// Each requeue is a compare-and-set on `(id, working, started)`, so a job
    /// completed or re-claimed in the meantime is left alone.
    pub async fn requeue_stale(&self, older_than: Duration) -> Result<Vec<JobId>, QueueError> {
        let stuck = self.stuck_jobs(older_than).await?;
        let mut requeued = Vec::with_capacity(stuck.len());

        for job in stuck {
            tracing::warn!(
                queue = %self.name(),
                job_id = %job.id,
                started = %job.ts.started,
                "Requeueing stuck job"
            );

            let now = Utc::now();
            if requeue_if_unchanged(&self.store, &job, now).await?.is_some() {
                let stale_for_ms = (now - job.ts.started).num_milliseconds().max(0) as u64;
                self.emit(JobEvent::JobRequeued {
                    queue: self.name().to_string(),
                    job_id: job.id,
                    stale_for_ms,
                    timestamp: now,
                });
                requeued.push(job.id);
            } else {
                tracing::debug!(
                    queue = %self.name(),
                    job_id = %job.id,
                    "Stuck job changed before requeue"
                );
            }
        }

        if !requeued.is_empty() {
            tracing::info!(queue = %self.name(), count = requeued.len(), "Requeued stuck jobs");
        }

        Ok(requeued)
    }

    /// One classified claim attempt, shared by [`Consumer`] and the worker
    /// actor.
    ///
    /// Empty queue and store failures both mean "back off", but only store
    /// failures count toward escalation. When the tracker is exhausted, or
    /// the failure is not one a retry can fix, it is returned as
    /// [`QueueError::Escalated`] and the tracker resets.
    pub async fn poll(&self, failures: &mut FailureTracker) -> Result<PollOutcome, QueueError> {
        match self.claim_next().await {
            Ok(Some(job)) => {
                failures.reset();
                Ok(PollOutcome::Claimed(job))
            }
            Ok(None) => {
                failures.reset();
                if self.config.silent {
                    tracing::debug!(queue = %self.name(), "Queue empty");
                } else {
                    tracing::info!(queue = %self.name(), "waiting");
                }
                self.emit(JobEvent::QueueIdle {
                    queue: self.name().to_string(),
                    timestamp: Utc::now(),
                });
                Ok(PollOutcome::Empty)
            }
            Err(err) => {
                let consecutive = failures.record();
                tracing::warn!(
                    queue = %self.name(),
                    error = %err,
                    consecutive,
                    "Claim attempt failed"
                );
                self.emit(JobEvent::StoreFailure {
                    queue: self.name().to_string(),
                    error: err.to_string(),
                    consecutive,
                    timestamp: Utc::now(),
                });

                if failures.is_exhausted() || !err.is_transient() {
                    failures.reset();
                    tracing::error!(
                        queue = %self.name(),
                        consecutive,
                        transient = err.is_transient(),
                        "Claim failures will not clear, escalating"
                    );
                    return Err(QueueError::Escalated {
                        consecutive,
                        source: Box::new(err),
                    });
                }

                Ok(PollOutcome::Failed(err))
            }
        }
    }
}
