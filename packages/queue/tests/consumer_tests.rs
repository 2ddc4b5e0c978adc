mod common;

use std::error::Error;
use std::time::Duration;

use futures_util::StreamExt;
use jobqueue::{
    FailureTracker, JobEvent, JobQueue, JobStatus, MemoryStore, PollOutcome, QueueError,
};
use serde_json::json;

fn drain(events: &mut tokio::sync::broadcast::Receiver<JobEvent>) -> Vec<JobEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn test_empty_queue_backs_off() -> Result<(), Box<dyn Error>> {
    let (queue, store) = common::memory_queue().await?;
    let mut events = queue.subscribe();
    let mut consumer = queue.consume();

    let waited = tokio::time::timeout(Duration::from_millis(150), consumer.next()).await;
    assert!(waited.is_err(), "nothing was published");

    let idle: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            JobEvent::QueueIdle { timestamp, .. } => Some(timestamp),
            _ => None,
        })
        .collect();

    // One attempt per backoff period, not a busy loop.
    assert!(idle.len() >= 2, "got {} attempts", idle.len());
    assert!(idle.len() <= 5, "got {} attempts", idle.len());
    for pair in idle.windows(2) {
        assert!(pair[1] - pair[0] >= chrono::Duration::milliseconds(35));
    }

    // Empty polling never writes.
    assert!(store.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn test_picks_up_later_arrivals() -> Result<(), Box<dyn Error>> {
    let (queue, _store) = common::memory_queue().await?;

    let producer = queue.clone();
    let publish = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        producer.publish(json!({"task": "late"})).await
    });

    let mut consumer = queue.consume();
    let job = tokio::time::timeout(Duration::from_secs(2), consumer.next()).await??;
    let id = publish.await??;

    assert_eq!(job.id(), id);
    assert_eq!(job.payload(), &json!({"task": "late"}));
    job.complete().await?;

    assert_eq!(queue.count_by_status(JobStatus::Done).await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_completion_event_carries_duration() -> Result<(), Box<dyn Error>> {
    let (queue, _store) = common::memory_queue().await?;
    queue.publish(json!({"task": "A"})).await?;
    let mut events = queue.subscribe();

    let mut consumer = queue.consume();
    let job = consumer.next().await?;
    let id = job.id();
    job.complete().await?;

    let completed = drain(&mut events).into_iter().find_map(|e| match e {
        JobEvent::JobCompleted {
            job_id,
            duration_ms,
            ..
        } => Some((job_id, duration_ms)),
        _ => None,
    });
    assert!(matches!(completed, Some((job_id, Some(_))) if job_id == id));
    Ok(())
}

#[tokio::test]
async fn test_store_failures_escalate() -> Result<(), Box<dyn Error>> {
    let store = MemoryStore::new("jobqueue");
    let config = common::test_config()
        .with_backoff(Duration::from_millis(10))
        .with_max_consecutive_failures(Some(3));
    let queue = JobQueue::open(store.clone(), config).await?;
    let mut events = queue.subscribe();

    store.set_offline(true);
    let mut consumer = queue.consume();
    let err = tokio::time::timeout(Duration::from_secs(2), consumer.next())
        .await?
        .err()
        .ok_or("expected escalation")?;

    match err {
        QueueError::Escalated {
            consecutive,
            source,
        } => {
            assert_eq!(consecutive, 3);
            assert!(matches!(*source, QueueError::StoreUnavailable(_)));
        }
        other => return Err(format!("unexpected error: {other}").into()),
    }
    assert_eq!(consumer.consecutive_failures(), 0);

    let failures = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, JobEvent::StoreFailure { .. }))
        .count();
    assert_eq!(failures, 3);

    // Recovery after the store comes back.
    store.set_offline(false);
    queue.publish(json!({"task": "A"})).await?;
    let job = tokio::time::timeout(Duration::from_secs(2), consumer.next()).await??;
    job.complete().await?;
    Ok(())
}

#[tokio::test]
async fn test_poll_keeps_empty_and_failure_apart() -> Result<(), Box<dyn Error>> {
    let (queue, store) = common::memory_queue().await?;
    let mut tracker = FailureTracker::new(Some(5));

    store.set_offline(true);
    assert!(matches!(
        queue.poll(&mut tracker).await?,
        PollOutcome::Failed(QueueError::StoreUnavailable(_))
    ));
    assert!(matches!(queue.poll(&mut tracker).await?, PollOutcome::Failed(_)));
    assert_eq!(tracker.consecutive(), 2);

    store.set_offline(false);
    assert!(matches!(queue.poll(&mut tracker).await?, PollOutcome::Empty));
    assert_eq!(tracker.consecutive(), 0);

    queue.publish(json!(1)).await?;
    assert!(matches!(queue.poll(&mut tracker).await?, PollOutcome::Claimed(_)));
    Ok(())
}

#[tokio::test]
async fn test_rejected_claims_escalate_at_once() -> Result<(), Box<dyn Error>> {
    let (queue, store) = common::memory_queue().await?;
    let mut tracker = FailureTracker::new(Some(5));
    queue.publish(json!(1)).await?;

    store.reject_writes(true);
    match queue.poll(&mut tracker).await {
        Err(QueueError::Escalated {
            consecutive,
            source,
        }) => {
            assert_eq!(consecutive, 1);
            assert!(matches!(*source, QueueError::StoreWrite(_)));
        }
        other => return Err(format!("unexpected outcome: {other:?}").into()),
    }
    assert_eq!(tracker.consecutive(), 0);

    store.reject_writes(false);
    assert!(matches!(queue.poll(&mut tracker).await?, PollOutcome::Claimed(_)));
    Ok(())
}

#[tokio::test]
async fn test_abandoned_job_is_requeued_by_sweep() -> Result<(), Box<dyn Error>> {
    let (queue, _store) = common::memory_queue().await?;
    let id = queue.publish(json!({"task": "A"})).await?;
    let mut events = queue.subscribe();

    let mut consumer = queue.consume();
    let job = consumer.next().await?;
    job.abandon("handler exploded");

    assert_eq!(queue.count_by_status(JobStatus::Working).await?, 1);
    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        JobEvent::JobAbandoned { job_id, error, .. } if *job_id == id && error == "handler exploded"
    )));

    // Not stale yet.
    assert!(queue.requeue_stale(Duration::from_secs(3600)).await?.is_empty());

    let stuck = queue.stuck_jobs(Duration::ZERO).await?;
    assert_eq!(stuck.len(), 1);

    let requeued = queue.requeue_stale(Duration::ZERO).await?;
    assert_eq!(requeued, vec![id]);
    assert_eq!(queue.count().await?, 1);

    let stored = queue.get(id).await?.ok_or("job missing")?;
    assert_eq!(stored.status, JobStatus::Waiting);
    assert_eq!(stored.ts.created, stuck[0].ts.created);

    let again = consumer.next().await?;
    assert_eq!(again.id(), id);
    again.complete().await?;
    assert_eq!(queue.count_by_status(JobStatus::Done).await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_requeued_claim_cannot_be_completed() -> Result<(), Box<dyn Error>> {
    let (queue, _store) = common::memory_queue().await?;
    let id = queue.publish(json!({"task": "A"})).await?;
    let mut consumer = queue.consume();

    let slow = consumer.next().await?;
    assert_eq!(queue.requeue_stale(Duration::ZERO).await?, vec![id]);

    let fresh = consumer.next().await?;
    assert_eq!(fresh.id(), id);

    // The first claim was taken back; only the fresh one may finish.
    assert!(matches!(
        slow.complete().await,
        Err(QueueError::StuckJob { id: stuck, .. }) if stuck == id
    ));
    assert_eq!(queue.count_by_status(JobStatus::Working).await?, 1);

    fresh.complete().await?;
    assert_eq!(queue.count_by_status(JobStatus::Done).await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_sweep_skips_completed_jobs() -> Result<(), Box<dyn Error>> {
    let (queue, _store) = common::memory_queue().await?;
    queue.publish(json!(1)).await?;

    let job = queue.try_claim().await?;
    queue.complete(job.id).await?;

    assert!(queue.requeue_stale(Duration::ZERO).await?.is_empty());
    assert_eq!(queue.count_by_status(JobStatus::Done).await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_stream_yields_jobs_in_order() -> Result<(), Box<dyn Error>> {
    let (queue, _store) = common::memory_queue().await?;
    let mut published = Vec::new();
    for i in 0..3 {
        published.push(queue.publish(json!({"n": i})).await?);
    }

    let mut stream = std::pin::pin!(queue.consume().into_stream());
    let mut seen = Vec::new();
    for _ in 0..3 {
        let job = stream.next().await.ok_or("stream ended")??;
        seen.push(job.id());
        job.complete().await?;
    }

    assert_eq!(seen, published);
    assert_eq!(queue.count().await?, 0);
    Ok(())
}
