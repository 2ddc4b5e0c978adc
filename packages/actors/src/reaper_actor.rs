//! Reaper actor that puts stuck jobs back to waiting.

use std::marker::PhantomData;
use std::time::Duration;

use jobqueue::{JobQueue, Store};
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::messages::ReaperMessage;

/// Reaper actor arguments.
pub struct ReaperArgs<S> {
    pub queue: JobQueue<S>,
    /// Time between sweeps.
    pub interval: Duration,
    /// How long a job may stay `working` before it is requeued.
    pub stale_after: Duration,
}

impl<S: Store> ReaperArgs<S> {
    /// Sweep every `interval`, using the queue's configured stale threshold.
    pub fn new(queue: JobQueue<S>, interval: Duration) -> Self {
        let stale_after = queue.config().stale_after();
        Self {
            queue,
            interval,
            stale_after,
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }
}

/// State for the reaper actor.
pub struct ReaperActorState<S> {
    pub queue: JobQueue<S>,
    pub stale_after: Duration,
    /// Jobs requeued since start.
    pub requeued: u64,
}

/// Periodically requeues jobs whose consumer never completed them.
pub struct ReaperActor<S> {
    _store: PhantomData<fn() -> S>,
}

impl<S> Default for ReaperActor<S> {
    fn default() -> Self {
        Self {
            _store: PhantomData,
        }
    }
}

impl<S: Store> Actor for ReaperActor<S> {
    type Msg = ReaperMessage;
    type State = ReaperActorState<S>;
    type Arguments = ReaperArgs<S>;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            queue = %args.queue.name(),
            interval_ms = args.interval.as_millis() as u64,
            stale_after_secs = args.stale_after.as_secs(),
            "Starting reaper"
        );

        // Start periodic tick
        let interval = args.interval;
        let myself_clone = myself.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if myself_clone.send_message(ReaperMessage::Tick).is_err() {
                    break;
                }
            }
        });

        Ok(ReaperActorState {
            queue: args.queue,
            stale_after: args.stale_after,
            requeued: 0,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ReaperMessage::Tick => match state.queue.requeue_stale(state.stale_after).await {
                Ok(ids) => state.requeued += ids.len() as u64,
                Err(e) => {
                    tracing::warn!(queue = %state.queue.name(), error = %e, "Stale job sweep failed");
                }
            },

            ReaperMessage::RunNow { reply } => {
                let result = state.queue.requeue_stale(state.stale_after).await;
                if let Ok(ids) = &result {
                    state.requeued += ids.len() as u64;
                }
                let _ = reply.send(result);
            }

            ReaperMessage::Shutdown => {
                tracing::info!(
                    queue = %state.queue.name(),
                    requeued = state.requeued,
                    "Shutting down reaper"
                );
                myself.stop(None);
            }
        }

        Ok(())
    }
}
