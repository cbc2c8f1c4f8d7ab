// Ingestion: dedup-insert of normalized records into the score store

use crate::error::{Result, ScoreboardError};
use crate::storage::{InsertOutcome, ScoreStore, StoreResult};
use crate::types::ScoreRecord;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Bounded retry for transient store faults. Each retry is preceded by an
/// explicit connection recycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 1 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub performer: String,
    pub candidates: usize,
    /// Newly persisted records
    pub inserted: usize,
    /// Already present at pre-check time
    pub duplicates: usize,
    /// Lost the race to a concurrent writer
    pub conflicts: usize,
    /// Dropped after store faults or invalid values
    pub skipped: usize,
}

enum Persisted {
    Inserted,
    AlreadyPresent,
    Conflict,
}

pub struct Ingestor {
    store: Arc<dyn ScoreStore>,
    policy: RetryPolicy,
}

impl Ingestor {
    pub fn new(store: Arc<dyn ScoreStore>) -> Self {
        Self {
            store,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Check-then-insert. The pre-check only keeps the common duplicate case
    /// off the conflict path; the store constraint remains authoritative.
    async fn persist_one(&self, record: &ScoreRecord) -> StoreResult<Persisted> {
        if self.store.exists(&record.key()).await? {
            return Ok(Persisted::AlreadyPresent);
        }
        Ok(match self.store.insert(record).await? {
            InsertOutcome::Inserted => Persisted::Inserted,
            InsertOutcome::Conflict => Persisted::Conflict,
        })
    }

    /// Persist every record not already stored.
    ///
    /// Faults are absorbed per record. The only error returned is a failure to
    /// re-establish the store connection during a retry.
    #[instrument(skip(self, records), fields(candidates = records.len()))]
    pub async fn ingest(&self, performer: &str, records: &[ScoreRecord]) -> Result<IngestReport> {
        let mut report = IngestReport {
            performer: performer.to_string(),
            candidates: records.len(),
            ..IngestReport::default()
        };

        for record in records {
            if !record.score.is_finite() {
                debug!(key = %record.key(), "Skipping record with non-finite score");
                report.skipped += 1;
                continue;
            }

            let mut attempt = 0;
            loop {
                match self.persist_one(record).await {
                    Ok(Persisted::Inserted) => report.inserted += 1,
                    Ok(Persisted::AlreadyPresent) => report.duplicates += 1,
                    Ok(Persisted::Conflict) => {
                        debug!(key = %record.key(), "Concurrent insert won the race");
                        report.conflicts += 1;
                    }
                    Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                        attempt += 1;
                        warn!(key = %record.key(), attempt, "Transient store fault, recycling connection: {}", e);
                        ::metrics::counter!(crate::metrics::STORE_RETRIES).increment(1);
                        self.store.recycle().await.map_err(|e| {
                            error!("Could not re-establish store connection: {}", e);
                            ScoreboardError::Store(e)
                        })?;
                        continue;
                    }
                    Err(e) => {
                        error!(key = %record.key(), "Giving up on record: {}", e);
                        ::metrics::counter!(crate::metrics::RECORDS_SKIPPED).increment(1);
                        report.skipped += 1;
                    }
                }
                break;
            }
        }

        ::metrics::counter!(crate::metrics::RECORDS_INSERTED).increment(report.inserted as u64);
        ::metrics::counter!(crate::metrics::RECORDS_CONFLICTED).increment(report.conflicts as u64);
        info!(
            inserted = report.inserted,
            duplicates = report.duplicates,
            conflicts = report.conflicts,
            skipped = report.skipped,
            "Ingestion finished"
        );
        Ok(report)
    }
}
