//! SurrealDB-backed store.
//!
//! SurrealDB has no capped tables, so the bound is enforced here: every
//! insert is followed by an eviction pass that deletes every record older
//! than the newest `capacity` ones (ids sort in insertion order). Victims
//! are picked relative to the newest records, never by a count read
//! earlier, so concurrent passes only ever delete overflow.

use queue_core::{Job, JobId, JobStatus, ReturnDocument, Timestamps};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;

use crate::error::is_conflict;
use crate::schema::{ensure_collection, remove_collection, validate_table_name};
use crate::store::{JobFilter, JobUpdate, Store, Updated, Upserted};
use crate::{Database, DbConfig, StoreError, connect};

/// How many candidates a claim attempt fetches before racing for them.
const CLAIM_BATCH: usize = 8;

/// Record content as written; the id lives in the record id.
#[derive(Debug, Serialize)]
struct JobContent {
    status: JobStatus,
    ts: Timestamps,
    payload: serde_json::Value,
}

impl From<&Job> for JobContent {
    fn from(job: &Job) -> Self {
        Self {
            status: job.status,
            ts: job.ts,
            payload: job.payload.clone(),
        }
    }
}

/// Internal record type for SurrealDB reads.
#[derive(Debug, Deserialize)]
struct JobRow {
    id: Thing,
    status: JobStatus,
    ts: Timestamps,
    #[serde(default)]
    payload: serde_json::Value,
}

impl JobRow {
    fn into_job(self) -> Result<Job, StoreError> {
        let raw = self.id.id.to_raw();
        let id = JobId::parse(&raw)
            .map_err(|e| StoreError::Serialization(format!("bad record id {raw}: {e}")))?;
        Ok(Job {
            id,
            status: self.status,
            ts: self.ts,
            payload: self.payload,
        })
    }
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: Thing,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: i64,
}

type Bindings = Vec<(&'static str, serde_json::Value)>;

/// Build a WHERE condition and its bindings from a filter.
fn conditions(filter: &JobFilter) -> (Vec<&'static str>, Bindings) {
    let mut conditions = Vec::new();
    let mut bindings: Bindings = Vec::new();

    if let Some(id) = &filter.id {
        conditions.push("id = type::thing($tb, $fid)");
        bindings.push(("fid", serde_json::json!(id.to_string())));
    }

    if let Some(status) = &filter.status {
        conditions.push("status = $status");
        bindings.push(("status", serde_json::json!(status)));
    }

    if let Some(statuses) = &filter.status_in {
        conditions.push("status IN $status_in");
        bindings.push(("status_in", serde_json::json!(statuses)));
    }

    if let Some(payload) = &filter.payload {
        conditions.push("payload = $payload");
        bindings.push(("payload", payload.clone()));
    }

    if let Some(started) = &filter.started {
        conditions.push("ts.started = $started");
        bindings.push(("started", serde_json::json!(started)));
    }

    (conditions, bindings)
}

fn where_clause(conditions: &[&str]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

/// Build a SET clause and its bindings from an update.
fn assignments(update: &JobUpdate) -> (String, Bindings) {
    let mut sets = vec!["status = $new_status"];
    let mut bindings: Bindings = vec![("new_status", serde_json::json!(update.status))];

    if let Some(ts) = &update.reset_ts {
        sets.push("ts = $new_ts");
        bindings.push(("new_ts", serde_json::json!(ts)));
    }
    if let Some(started) = &update.started {
        sets.push("ts.started = $new_started");
        bindings.push(("new_started", serde_json::json!(started)));
    }
    if let Some(done) = &update.done {
        sets.push("ts.done = $new_done");
        bindings.push(("new_done", serde_json::json!(done)));
    }

    (sets.join(", "), bindings)
}

fn return_clause(returning: ReturnDocument) -> &'static str {
    match returning {
        ReturnDocument::Before => "RETURN BEFORE",
        ReturnDocument::After => "RETURN AFTER",
    }
}

/// A bounded job collection stored in one SurrealDB table.
#[derive(Clone)]
pub struct SurrealStore {
    db: Database,
    table: String,
    capacity: Option<usize>,
}

impl SurrealStore {
    /// Wrap an open connection.
    pub fn new(
        db: Database,
        table: impl Into<String>,
        capacity: Option<usize>,
    ) -> Result<Self, StoreError> {
        let table = table.into();
        validate_table_name(&table)?;
        if capacity == Some(0) {
            return Err(StoreError::InvalidConfig(
                "capacity must be greater than 0".into(),
            ));
        }
        Ok(Self {
            db,
            table,
            capacity,
        })
    }

    /// Connect using `config` and wrap the connection.
    pub async fn connect(config: &DbConfig) -> Result<Self, StoreError> {
        let db = connect(config).await?;
        Self::new(db, config.collection.clone(), config.capacity)
    }

    /// The underlying connection.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Ids of the oldest records matching `filter`.
    async fn candidate_ids(&self, filter: &JobFilter, limit: usize) -> Result<Vec<String>, StoreError> {
        let (conds, bindings) = conditions(filter);
        let query = format!(
            "SELECT id FROM type::table($tb) {} ORDER BY id ASC LIMIT {}",
            where_clause(&conds),
            limit
        );

        let mut result = self.db.query(&query).bind(("tb", self.table.clone()));
        for (name, value) in bindings {
            result = result.bind((name, value));
        }

        let mut response = result.await?;
        let rows: Vec<IdRow> = response.take(0)?;

        Ok(rows.into_iter().map(|r| r.id.id.to_raw()).collect())
    }

    /// Conditionally update one record by id. `None` means the record no
    /// longer matched `filter`.
    async fn update_one(
        &self,
        record_id: &str,
        filter: &JobFilter,
        update: &JobUpdate,
        returning: ReturnDocument,
    ) -> Result<Option<JobRow>, surrealdb::Error> {
        let (conds, cond_bindings) = conditions(filter);
        let (sets, set_bindings) = assignments(update);
        let query = format!(
            "UPDATE type::thing($tb, $rid) SET {} {} {}",
            sets,
            where_clause(&conds),
            return_clause(returning)
        );

        let mut result = self
            .db
            .query(&query)
            .bind(("tb", self.table.clone()))
            .bind(("rid", record_id.to_string()));
        for (name, value) in cond_bindings.into_iter().chain(set_bindings) {
            result = result.bind((name, value));
        }

        let mut response = result.await?;
        let rows: Vec<JobRow> = response.take(0)?;

        Ok(rows.into_iter().next())
    }

    async fn count_where(&self, filter: &JobFilter) -> Result<u64, StoreError> {
        let (conds, bindings) = conditions(filter);
        let query = format!(
            "SELECT count() FROM type::table($tb) {} GROUP ALL",
            where_clause(&conds)
        );

        let mut result = self.db.query(&query).bind(("tb", self.table.clone()));
        for (name, value) in bindings {
            result = result.bind((name, value));
        }

        let mut response = result.await?;
        let counts: Vec<CountRow> = response.take(0)?;

        Ok(counts.first().map_or(0, |c| c.count.max(0) as u64))
    }

    /// Delete everything but the newest `capacity` records.
    async fn evict_overflow(&self) -> Result<u64, StoreError> {
        let Some(capacity) = self.capacity else {
            return Ok(0);
        };

        let mut response = self
            .db
            .query(
                "LET $victims = (SELECT id FROM type::table($tb) ORDER BY id DESC START $cap).id;",
            )
            .query("DELETE $victims RETURN BEFORE;")
            .bind(("tb", self.table.clone()))
            .bind(("cap", capacity as i64))
            .await?
            .check()?;
        let evicted: Vec<IdRow> = response.take(1)?;

        if !evicted.is_empty() {
            tracing::debug!(
                collection = %self.table,
                evicted = evicted.len(),
                "Evicted oldest records over capacity"
            );
        }

        Ok(evicted.len() as u64)
    }
}

impl Store for SurrealStore {
    fn name(&self) -> &str {
        &self.table
    }

    fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    async fn ensure(&self) -> Result<bool, StoreError> {
        ensure_collection(&self.db, &self.table).await
    }

    async fn atomic_claim(
        &self,
        filter: &JobFilter,
        update: &JobUpdate,
        returning: ReturnDocument,
    ) -> Result<Option<Job>, StoreError> {
        loop {
            let candidates = self.candidate_ids(filter, CLAIM_BATCH).await?;
            if candidates.is_empty() {
                return Ok(None);
            }

            for record_id in &candidates {
                match self.update_one(record_id, filter, update, returning).await {
                    Ok(Some(row)) => return row.into_job().map(Some),
                    // Lost the race for this candidate; try the next one.
                    Ok(None) => continue,
                    Err(e) if is_conflict(&e) => {
                        tracing::debug!(collection = %self.table, "Claim conflict, retrying");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    async fn update_by_id(
        &self,
        id: JobId,
        guard: &JobFilter,
        update: &JobUpdate,
    ) -> Result<Updated, StoreError> {
        let guard = guard.clone().advancing_to(update.status);
        let updated = self
            .update_one(&id.to_string(), &guard, update, ReturnDocument::After)
            .await?;
        if let Some(row) = updated {
            return Ok(Updated::Applied(row.into_job()?));
        }

        match self.find(&JobFilter::id(id)).await?.into_iter().next() {
            Some(current) => Ok(Updated::Rejected(current)),
            None => Ok(Updated::Missing),
        }
    }

    async fn insert(&self, job: &Job) -> Result<JobId, StoreError> {
        let created: Option<JobRow> = self
            .db
            .create((self.table.as_str(), job.id.to_string()))
            .content(JobContent::from(job))
            .await
            .map_err(StoreError::write)?;

        let id = created
            .ok_or_else(|| StoreError::Write("Failed to create job".into()))?
            .into_job()?
            .id;

        // The job is stored; a failed pass leaves overflow for the next insert.
        if let Err(e) = self.evict_overflow().await {
            tracing::warn!(collection = %self.table, error = %e, "Eviction pass failed");
        }
        Ok(id)
    }

    async fn upsert(&self, filter: &JobFilter, job: &Job) -> Result<Upserted, StoreError> {
        let replace = JobUpdate {
            status: job.status,
            started: None,
            done: None,
            reset_ts: Some(job.ts),
        };

        if let Some(record_id) = self.candidate_ids(filter, 1).await?.into_iter().next() {
            match self
                .update_one(&record_id, filter, &replace, ReturnDocument::After)
                .await
            {
                Ok(Some(row)) => return Ok(Upserted::Replaced(row.into_job()?.id)),
                // Claimed between select and update; fall through to insert.
                Ok(None) => {}
                Err(e) if is_conflict(&e) => {
                    tracing::debug!(collection = %self.table, "Upsert lost a claim race, inserting");
                }
                Err(e) => return Err(StoreError::write(e)),
            }
        }

        Ok(Upserted::Inserted(self.insert(job).await?))
    }

    async fn count_matching(&self, filter: &JobFilter) -> Result<u64, StoreError> {
        self.count_where(filter).await
    }

    async fn find(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError> {
        let (conds, bindings) = conditions(filter);
        let query = format!(
            "SELECT * FROM type::table($tb) {} ORDER BY id ASC",
            where_clause(&conds)
        );

        let mut result = self.db.query(&query).bind(("tb", self.table.clone()));
        for (name, value) in bindings {
            result = result.bind((name, value));
        }

        let mut response = result.await?;
        let rows: Vec<JobRow> = response.take(0)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn drop_all(&self) -> Result<bool, StoreError> {
        remove_collection(&self.db, &self.table).await
    }
}
