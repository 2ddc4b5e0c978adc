//! Message types for actor communication.

use jobqueue::{JobId, QueueError};
use ractor::RpcReplyPort;

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Run one claim attempt and process what it yields.
    Poll,

    /// Get the worker's counters.
    GetStats { reply: RpcReplyPort<WorkerStats> },

    /// Shutdown the worker.
    Shutdown,
}

/// Messages for the ReaperActor.
#[derive(Debug)]
pub enum ReaperMessage {
    /// Periodic sweep.
    Tick,

    /// Sweep now and report what was requeued.
    RunNow {
        reply: RpcReplyPort<Result<Vec<JobId>, QueueError>>,
    },

    /// Shutdown the reaper.
    Shutdown,
}

/// Counters kept by a worker since it started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub claimed: u64,
    pub completed: u64,
    pub abandoned: u64,
}

/// Error type for actor operations.
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    #[error("Failed to spawn actor: {0}")]
    Spawn(#[from] ractor::SpawnErr),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
