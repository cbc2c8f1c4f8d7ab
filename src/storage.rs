use crate::error::StoreError;
use crate::types::{RecordKey, ScoreRecord};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::debug;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result of an insert attempt. A uniqueness conflict is an ordinary outcome,
/// not a failure: another writer got there first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Conflict,
}

/// Persistence boundary for score history.
///
/// The `(item, performer, timestamp)` uniqueness constraint is enforced by the
/// implementation and is the single authority for duplicate detection.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn exists(&self, key: &RecordKey) -> StoreResult<bool>;
    async fn insert(&self, record: &ScoreRecord) -> StoreResult<InsertOutcome>;

    /// One consistent snapshot of every record.
    async fn scan_all(&self) -> StoreResult<Vec<ScoreRecord>>;

    /// Drop the current connection and establish a fresh one.
    async fn recycle(&self) -> StoreResult<()>;

    async fn delete(&self, key: &RecordKey) -> StoreResult<bool>;

    /// Remove every record whose item contains `fragment`; returns the count.
    async fn delete_items_containing(&self, fragment: &str) -> StoreResult<usize>;

    async fn count(&self) -> StoreResult<usize>;
}

/// In-memory store for development and tests.
#[derive(Default)]
pub struct InMemoryScoreStore {
    records: Mutex<BTreeMap<RecordKey, ScoreRecord>>,
}

impl InMemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, BTreeMap<RecordKey, ScoreRecord>>> {
        self.records
            .lock()
            .map_err(|e| StoreError::Fatal(format!("in-memory store poisoned: {e}")))
    }
}

#[async_trait]
impl ScoreStore for InMemoryScoreStore {
    async fn exists(&self, key: &RecordKey) -> StoreResult<bool> {
        Ok(self.lock()?.contains_key(key))
    }

    async fn insert(&self, record: &ScoreRecord) -> StoreResult<InsertOutcome> {
        let mut records = self.lock()?;
        let key = record.key();
        if records.contains_key(&key) {
            return Ok(InsertOutcome::Conflict);
        }
        debug!(%key, "Inserted record");
        records.insert(key, record.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn scan_all(&self) -> StoreResult<Vec<ScoreRecord>> {
        Ok(self.lock()?.values().cloned().collect())
    }

    async fn recycle(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn delete(&self, key: &RecordKey) -> StoreResult<bool> {
        Ok(self.lock()?.remove(key).is_some())
    }

    async fn delete_items_containing(&self, fragment: &str) -> StoreResult<usize> {
        let mut records = self.lock()?;
        let before = records.len();
        records.retain(|key, _| !key.item.contains(fragment));
        Ok(before - records.len())
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.len())
    }
}
