//! In-memory store for tests and single-process embedding.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use queue_core::{Job, JobId, ReturnDocument};
use tokio::sync::Mutex;

use crate::StoreError;
use crate::store::{JobFilter, JobUpdate, Store, Updated, Upserted};

#[derive(Debug, Default)]
struct Collection {
    exists: bool,
    /// Oldest record at the front.
    records: VecDeque<Job>,
}

#[derive(Debug, Default)]
struct Faults {
    offline: AtomicBool,
    reject_writes: AtomicBool,
}

/// In-memory bounded job collection.
///
/// Every operation runs under one async mutex, which makes
/// [`Store::atomic_claim`] trivially indivisible.
///
/// # Cloning
///
/// Cloning creates a new handle to the **same** underlying collection.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    name: Arc<str>,
    capacity: Option<usize>,
    inner: Arc<Mutex<Collection>>,
    faults: Arc<Faults>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("jobqueue")
    }
}

impl MemoryStore {
    /// Create an unbounded collection.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            capacity: None,
            inner: Arc::new(Mutex::new(Collection::default())),
            faults: Arc::new(Faults::default()),
        }
    }

    /// Create a collection holding at most `capacity` records.
    ///
    /// A capacity of zero is rejected, as it is for [`SurrealStore`](crate::SurrealStore).
    pub fn with_capacity(name: impl AsRef<str>, capacity: usize) -> Result<Self, StoreError> {
        if capacity == 0 {
            return Err(StoreError::InvalidConfig(
                "capacity must be greater than 0".into(),
            ));
        }
        Ok(Self {
            capacity: Some(capacity),
            ..Self::new(name)
        })
    }

    /// Simulate a lost connection: every operation fails with
    /// [`StoreError::Unavailable`] until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.faults.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every write (insert, upsert, claim, update) fail with
    /// [`StoreError::Write`].
    pub fn reject_writes(&self, reject: bool) {
        self.faults.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Number of records of any status.
    #[must_use = "this returns the count, it doesn't modify the collection"]
    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    /// Check if the collection holds no records.
    #[must_use = "this returns a boolean, it doesn't modify the collection"]
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.records.is_empty()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.faults.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "memory store '{}' is offline",
                self.name
            )));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        self.check_online()?;
        if self.faults.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write(format!(
                "memory store '{}' rejects writes",
                self.name
            )));
        }
        Ok(())
    }

    fn push(&self, coll: &mut Collection, job: Job) -> JobId {
        let id = job.id;
        coll.exists = true;
        coll.records.push_back(job);

        if let Some(capacity) = self.capacity {
            while coll.records.len() > capacity {
                if let Some(evicted) = coll.records.pop_front() {
                    tracing::debug!(
                        collection = %self.name,
                        job_id = %evicted.id,
                        status = %evicted.status,
                        "Evicted oldest record over capacity"
                    );
                }
            }
        }

        id
    }
}

impl Store for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    async fn ensure(&self) -> Result<bool, StoreError> {
        self.check_online()?;
        let mut coll = self.inner.lock().await;
        let existed = coll.exists;
        coll.exists = true;
        Ok(existed)
    }

    async fn atomic_claim(
        &self,
        filter: &JobFilter,
        update: &JobUpdate,
        returning: ReturnDocument,
    ) -> Result<Option<Job>, StoreError> {
        self.check_writable()?;
        let mut coll = self.inner.lock().await;

        let Some(job) = coll.records.iter_mut().find(|j| filter.matches(j)) else {
            return Ok(None);
        };

        let before = job.clone();
        update.apply(job);

        Ok(Some(match returning {
            ReturnDocument::Before => before,
            ReturnDocument::After => job.clone(),
        }))
    }

    async fn update_by_id(
        &self,
        id: JobId,
        guard: &JobFilter,
        update: &JobUpdate,
    ) -> Result<Updated, StoreError> {
        self.check_writable()?;
        let mut coll = self.inner.lock().await;

        let Some(job) = coll.records.iter_mut().find(|j| j.id == id) else {
            return Ok(Updated::Missing);
        };

        if !guard.matches(job) || !job.status.can_advance_to(update.status) {
            return Ok(Updated::Rejected(job.clone()));
        }

        update.apply(job);
        Ok(Updated::Applied(job.clone()))
    }

    async fn insert(&self, job: &Job) -> Result<JobId, StoreError> {
        self.check_writable()?;
        let mut coll = self.inner.lock().await;

        if coll.records.iter().any(|j| j.id == job.id) {
            return Err(StoreError::Write(format!("duplicate job id {}", job.id)));
        }

        Ok(self.push(&mut coll, job.clone()))
    }

    async fn upsert(&self, filter: &JobFilter, job: &Job) -> Result<Upserted, StoreError> {
        self.check_writable()?;
        let mut coll = self.inner.lock().await;

        if let Some(existing) = coll.records.iter_mut().find(|j| filter.matches(j)) {
            existing.status = job.status;
            existing.ts = job.ts;
            existing.payload = job.payload.clone();
            return Ok(Upserted::Replaced(existing.id));
        }

        Ok(Upserted::Inserted(self.push(&mut coll, job.clone())))
    }

    async fn count_matching(&self, filter: &JobFilter) -> Result<u64, StoreError> {
        self.check_online()?;
        let coll = self.inner.lock().await;
        Ok(coll.records.iter().filter(|j| filter.matches(j)).count() as u64)
    }

    async fn find(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError> {
        self.check_online()?;
        let coll = self.inner.lock().await;
        Ok(coll
            .records
            .iter()
            .filter(|j| filter.matches(j))
            .cloned()
            .collect())
    }

    async fn drop_all(&self) -> Result<bool, StoreError> {
        self.check_online()?;
        let mut coll = self.inner.lock().await;
        let existed = coll.exists || !coll.records.is_empty();
        *coll = Collection::default();
        Ok(existed)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use queue_core::JobStatus;
    use serde_json::json;

    fn waiting() -> JobFilter {
        JobFilter::status(JobStatus::Waiting)
    }

    #[tokio::test]
    async fn ensure_reports_existing_collection() -> Result<(), StoreError> {
        let store = MemoryStore::new("jobs");
        assert!(!store.ensure().await?);
        assert!(store.ensure().await?);
        assert!(store.drop_all().await?);
        assert!(!store.ensure().await?);
        Ok(())
    }

    #[tokio::test]
    async fn claim_picks_oldest_waiting() -> Result<(), StoreError> {
        let store = MemoryStore::new("jobs");
        let first = store.insert(&Job::new(json!(1))).await?;
        store.insert(&Job::new(json!(2))).await?;

        let claimed = store
            .atomic_claim(&waiting(), &JobUpdate::claim(Utc::now()), ReturnDocument::After)
            .await?;
        let claimed = claimed.ok_or_else(|| StoreError::Unavailable("empty".into()))?;
        assert_eq!(claimed.id, first);
        assert_eq!(claimed.status, JobStatus::Working);
        Ok(())
    }

    #[tokio::test]
    async fn claim_can_return_previous_version() -> Result<(), StoreError> {
        let store = MemoryStore::new("jobs");
        store.insert(&Job::new(json!(1))).await?;

        let before = store
            .atomic_claim(&waiting(), &JobUpdate::claim(Utc::now()), ReturnDocument::Before)
            .await?;
        assert_eq!(before.map(|j| j.status), Some(JobStatus::Waiting));
        assert_eq!(store.count_matching(&waiting()).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn capacity_evicts_oldest_regardless_of_status() -> Result<(), StoreError> {
        let store = MemoryStore::with_capacity("jobs", 2)?;
        let oldest = store.insert(&Job::new(json!("a"))).await?;
        store
            .atomic_claim(&waiting(), &JobUpdate::claim(Utc::now()), ReturnDocument::After)
            .await?;
        store.insert(&Job::new(json!("b"))).await?;
        store.insert(&Job::new(json!("c"))).await?;

        assert_eq!(store.len().await, 2);
        assert!(store.find(&JobFilter::id(oldest)).await?.is_empty());
        Ok(())
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            MemoryStore::with_capacity("jobs", 0),
            Err(StoreError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn update_by_id_refuses_illegal_transitions() -> Result<(), StoreError> {
        let store = MemoryStore::new("jobs");
        let id = store.insert(&Job::new(json!(1))).await?;
        let guard = JobFilter::default();

        let outcome = store
            .update_by_id(id, &guard, &JobUpdate::complete(Utc::now()))
            .await?;
        assert!(matches!(outcome, Updated::Rejected(ref job) if job.status == JobStatus::Waiting));
        assert_eq!(store.count_matching(&waiting()).await?, 1);

        store
            .atomic_claim(&waiting(), &JobUpdate::claim(Utc::now()), ReturnDocument::After)
            .await?;
        let outcome = store
            .update_by_id(id, &guard, &JobUpdate::complete(Utc::now()))
            .await?;
        assert!(matches!(outcome, Updated::Applied(ref job) if job.status == JobStatus::Done));

        let ghost = JobId::new();
        let outcome = store
            .update_by_id(ghost, &guard, &JobUpdate::complete(Utc::now()))
            .await?;
        assert_eq!(outcome, Updated::Missing);
        Ok(())
    }

    #[tokio::test]
    async fn upsert_replaces_in_place() -> Result<(), StoreError> {
        let store = MemoryStore::new("jobs");
        let original = Job::new(json!({"task": "A"}));
        store.insert(&original).await?;

        let again = Job::new(json!({"task": "A"}));
        let filter = waiting().with_payload(again.payload.clone());
        let outcome = store.upsert(&filter, &again).await?;

        assert_eq!(outcome, Upserted::Replaced(original.id));
        assert_eq!(store.len().await, 1);
        let stored = store.find(&JobFilter::id(original.id)).await?;
        assert_eq!(stored[0].ts, again.ts);
        Ok(())
    }

    #[tokio::test]
    async fn faults_map_to_error_kinds() -> Result<(), StoreError> {
        let store = MemoryStore::new("jobs");
        store.reject_writes(true);
        assert!(matches!(
            store.insert(&Job::new(json!(1))).await,
            Err(StoreError::Write(_))
        ));
        store.reject_writes(false);

        store.set_offline(true);
        assert!(matches!(
            store.count_matching(&waiting()).await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_offline(false);
        assert_eq!(store.count_matching(&waiting()).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_claims_never_share_a_record() -> Result<(), StoreError> {
        let store = MemoryStore::new("jobs");
        for i in 0..20 {
            store.insert(&Job::new(json!(i))).await?;
        }

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .atomic_claim(
                        &JobFilter::status(JobStatus::Waiting),
                        &JobUpdate::claim(Utc::now()),
                        ReturnDocument::After,
                    )
                    .await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            if let Ok(Ok(Some(job))) = handle.await {
                ids.push(job.id);
            }
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 20);
        Ok(())
    }
}
