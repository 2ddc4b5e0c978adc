//! Worker actor for executing jobs.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use jobqueue::{FailureTracker, Job, JobQueue, PollOutcome, QueueError, Store};
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::handler::JobHandler;
use crate::messages::{WorkerMessage, WorkerStats};

/// Default per-job processing limit.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(300);

/// State for the worker actor.
pub struct WorkerActorState<S> {
    /// Unique worker ID.
    pub worker_id: String,
    /// Queue this worker drains.
    pub queue: JobQueue<S>,
    /// Handler for claimed jobs.
    pub handler: Arc<dyn JobHandler>,
    /// Per-job processing limit.
    pub job_timeout: Duration,
    /// Consecutive store failures.
    pub failures: FailureTracker,
    pub stats: WorkerStats,
    /// Whether the worker should continue running.
    pub running: bool,
}

/// Worker actor arguments.
pub struct WorkerArgs<S> {
    pub worker_id: String,
    pub queue: JobQueue<S>,
    pub handler: Arc<dyn JobHandler>,
    pub job_timeout: Duration,
}

impl<S: Store> WorkerArgs<S> {
    pub fn new(worker_id: impl Into<String>, queue: JobQueue<S>, handler: impl JobHandler) -> Self {
        Self {
            worker_id: worker_id.into(),
            queue,
            handler: Arc::new(handler),
            job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }
}

/// Worker actor that claims jobs from a queue and runs them.
///
/// Each `Poll` runs one claim attempt. After a job the next poll is
/// immediate; after an empty queue or a store failure it waits for the
/// queue's backoff. When the store keeps failing past the configured limit
/// the actor stops with the escalated error as its reason.
pub struct WorkerActor<S> {
    _store: PhantomData<fn() -> S>,
}

impl<S> Default for WorkerActor<S> {
    fn default() -> Self {
        Self {
            _store: PhantomData,
        }
    }
}

fn schedule_poll(myself: &ActorRef<WorkerMessage>, delay: Duration) {
    if delay.is_zero() {
        let _ = myself.send_message(WorkerMessage::Poll);
        return;
    }

    let myself = myself.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = myself.send_message(WorkerMessage::Poll);
    });
}

async fn process<S: Store>(state: &mut WorkerActorState<S>, job: Job) {
    state.stats.claimed += 1;

    let outcome = tokio::time::timeout(state.job_timeout, state.handler.handle(&job)).await;

    match outcome {
        Ok(Ok(())) => match state.queue.complete_job(&job).await {
            Ok(()) => state.stats.completed += 1,
            Err(QueueError::JobNotFound(_) | QueueError::StuckJob { .. }) => {
                // Evicted, cleared or requeued while running; already logged by the queue.
            }
            Err(e) => {
                tracing::warn!(
                    worker = %state.worker_id,
                    job_id = %job.id,
                    error = %e,
                    "Failed to mark job done"
                );
            }
        },
        Ok(Err(error)) => {
            state.stats.abandoned += 1;
            state.queue.abandon(job.id, error);
        }
        Err(_) => {
            state.stats.abandoned += 1;
            state.queue.abandon(
                job.id,
                format!("Job timed out after {}ms", state.job_timeout.as_millis()),
            );
        }
    }
}

impl<S: Store> Actor for WorkerActor<S> {
    type Msg = WorkerMessage;
    type State = WorkerActorState<S>;
    type Arguments = WorkerArgs<S>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(worker = %args.worker_id, queue = %args.queue.name(), "Starting worker");

        let failures = FailureTracker::new(args.queue.config().max_consecutive_failures);

        Ok(WorkerActorState {
            worker_id: args.worker_id,
            queue: args.queue,
            handler: args.handler,
            job_timeout: args.job_timeout,
            failures,
            stats: WorkerStats::default(),
            running: true,
        })
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        myself.send_message(WorkerMessage::Poll)?;
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Poll => {
                if !state.running {
                    return Ok(());
                }

                let backoff = state.queue.config().backoff();
                match state.queue.poll(&mut state.failures).await {
                    Ok(PollOutcome::Claimed(job)) => {
                        process(state, job).await;
                        schedule_poll(&myself, Duration::ZERO);
                    }
                    Ok(PollOutcome::Empty | PollOutcome::Failed(_)) => {
                        schedule_poll(&myself, backoff);
                    }
                    Err(err) => {
                        tracing::error!(
                            worker = %state.worker_id,
                            error = %err,
                            "Worker stopping after repeated store failures"
                        );
                        state.running = false;
                        myself.stop(Some(err.to_string()));
                    }
                }
            }

            WorkerMessage::GetStats { reply } => {
                let _ = reply.send(state.stats);
            }

            WorkerMessage::Shutdown => {
                tracing::info!(worker = %state.worker_id, "Shutting down worker");
                state.running = false;
                myself.stop(None);
            }
        }

        Ok(())
    }
}
