//! Actor system for the job queue.
//!
//! This crate drives a [`JobQueue`] with Ractor actors.
//!
//! # Architecture
//!
//! - `WorkerActor` - Claims jobs, runs a [`JobHandler`] and marks them done
//! - `ReaperActor` - Requeues jobs stuck in `working` after their consumer died
//!
//! # Usage
//!
//! ```ignore
//! use actors::{WorkerArgs, job_handler, start_worker};
//!
//! let handler = job_handler!(|job| {
//!     println!("processing {}", job.payload);
//!     Ok(())
//! });
//! let (worker, handle) = start_worker(WorkerArgs::new("worker-1", queue.clone(), handler)).await?;
//! ```

mod handler;
mod messages;
mod reaper_actor;
mod worker_actor;

pub use handler::{FnHandler, HandlerFuture, HandlerResult, JobHandler};
pub use messages::{ActorError, ReaperMessage, WorkerMessage, WorkerStats};
pub use reaper_actor::{ReaperActor, ReaperArgs};
pub use worker_actor::{DEFAULT_JOB_TIMEOUT, WorkerActor, WorkerArgs};

pub use jobqueue::{Job, JobQueue, Store};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort};

/// Start a worker. The first poll runs as soon as it is up.
///
/// The actor is registered as `worker-<queue>-<worker_id>`, so worker ids
/// must be unique per queue within a process.
pub async fn start_worker<S: Store>(
    args: WorkerArgs<S>,
) -> Result<(ActorRef<WorkerMessage>, tokio::task::JoinHandle<()>), ActorError> {
    let name = format!("worker-{}-{}", args.queue.name(), args.worker_id);
    let (actor, handle) = Actor::spawn(Some(name), WorkerActor::<S>::default(), args).await?;

    Ok((actor, handle))
}

/// Start a reaper for one queue. Reapers are unnamed; several processes may
/// sweep the same collection.
pub async fn start_reaper<S: Store>(
    args: ReaperArgs<S>,
) -> Result<(ActorRef<ReaperMessage>, tokio::task::JoinHandle<()>), ActorError> {
    let (actor, handle) = Actor::spawn(None, ReaperActor::<S>::default(), args).await?;

    Ok((actor, handle))
}
