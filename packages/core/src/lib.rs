//! Core domain types for the capped job queue.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobStatus and Timestamps for queued work
//! - QueueConfig for handle and consumer behavior
//! - Events for observing queue activity

mod events;
mod job;
mod queue;

pub use events::JobEvent;
pub use job::{Job, JobId, JobStatus, Timestamps};
pub use queue::{ConfigError, QueueConfig, ReturnDocument};
