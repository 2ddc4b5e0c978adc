#![allow(dead_code)]

use std::time::Duration;

use jobqueue::{JobQueue, MemoryStore, QueueConfig, QueueError};

/// Short backoff so idle loops spin a few times within a test.
pub const BACKOFF: Duration = Duration::from_millis(40);

pub fn test_config() -> QueueConfig {
    QueueConfig::default()
        .with_backoff(BACKOFF)
        .with_silent(true)
}

pub async fn memory_queue() -> Result<(JobQueue<MemoryStore>, MemoryStore), QueueError> {
    let store = MemoryStore::new("jobqueue");
    let queue = JobQueue::open(store.clone(), test_config()).await?;
    Ok((queue, store))
}

pub async fn capped_queue(
    capacity: usize,
) -> Result<(JobQueue<MemoryStore>, MemoryStore), QueueError> {
    let store = MemoryStore::with_capacity("jobqueue", capacity)?;
    let queue = JobQueue::open(store.clone(), test_config()).await?;
    Ok((queue, store))
}
