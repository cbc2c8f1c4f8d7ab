use crate::error::StoreError;
use crate::storage::{InsertOutcome, ScoreStore, StoreResult};
use crate::types::{RecordKey, ScoreRecord};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timestamps are stored as text in this shape so they sort chronologically.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS scores (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    item        TEXT NOT NULL,
    attribution TEXT,
    performer   TEXT NOT NULL,
    score       REAL NOT NULL,
    scored_at   TEXT NOT NULL,
    CONSTRAINT uq_item_performer_scored_at UNIQUE (item, performer, scored_at)
);
CREATE INDEX IF NOT EXISTS idx_scores_performer ON scores(performer);
"#;

/// SQLite-backed score store.
///
/// Holds a single connection slot. Every operation pings the connection first
/// and reopens it when the ping fails. [`ScoreStore::recycle`] forces the same
/// reopen. All SQLite work runs on tokio's blocking pool.
#[derive(Clone)]
pub struct SqliteScoreStore {
    inner: Arc<Inner>,
}

struct Inner {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl SqliteScoreStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Fatal(format!("cannot create {}: {e}", parent.display())))?;
        }
        let conn = connect(&path)?;
        info!(path = %path.display(), "Opened score store");
        Ok(Self {
            inner: Arc::new(Inner {
                path,
                conn: Mutex::new(Some(conn)),
            }),
        })
    }

    /// Run `f` on a live connection from the blocking pool.
    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.with_conn(f))
            .await
            .map_err(|e| StoreError::Fatal(format!("store task failed: {e}")))?
    }
}

fn connect(path: &Path) -> StoreResult<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

impl Inner {
    fn slot(&self) -> StoreResult<MutexGuard<'_, Option<Connection>>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Fatal(format!("connection slot poisoned: {e}")))
    }

    /// Reconnects first if the current connection does not answer a ping.
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> StoreResult<T> {
        let mut slot = self.slot()?;
        let alive = slot
            .as_ref()
            .map(|c| c.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok())
            .unwrap_or(false);
        if !alive {
            warn!(path = %self.path.display(), "Connection not alive, reconnecting");
            *slot = None;
            *slot = Some(connect(&self.path)?);
        }
        match slot.as_ref() {
            Some(conn) => f(conn).map_err(StoreError::from),
            None => Err(StoreError::Transient("no connection available".to_string())),
        }
    }

    fn reopen(&self) -> StoreResult<()> {
        let mut slot = self.slot()?;
        *slot = None;
        *slot = Some(connect(&self.path)?);
        info!(path = %self.path.display(), "Recycled store connection");
        Ok(())
    }
}

fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScoreRecord> {
    let scored_at: String = row.get(4)?;
    let timestamp = NaiveDateTime::parse_from_str(&scored_at, TIMESTAMP_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(ScoreRecord {
        item: row.get(0)?,
        attribution: row.get(1)?,
        performer: row.get(2)?,
        score: row.get(3)?,
        timestamp,
    })
}

#[async_trait]
impl ScoreStore for SqliteScoreStore {
    async fn exists(&self, key: &RecordKey) -> StoreResult<bool> {
        let key = key.clone();
        let ts = format_timestamp(&key.timestamp);
        self.run(move |conn| {
            conn.query_row(
                "SELECT 1 FROM scores WHERE item = ?1 AND performer = ?2 AND scored_at = ?3 LIMIT 1",
                params![key.item, key.performer, ts],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map(|found| found.is_some())
        })
        .await
    }

    async fn insert(&self, record: &ScoreRecord) -> StoreResult<InsertOutcome> {
        let owned = record.clone();
        let ts = format_timestamp(&record.timestamp);
        let changed = self
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO scores (item, attribution, performer, score, scored_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(item, performer, scored_at) DO NOTHING",
                    params![owned.item, owned.attribution, owned.performer, owned.score, ts],
                )
            })
            .await?;
        if changed == 0 {
            debug!(key = %record.key(), "Insert hit uniqueness constraint");
            Ok(InsertOutcome::Conflict)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn scan_all(&self) -> StoreResult<Vec<ScoreRecord>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT item, attribution, performer, score, scored_at FROM scores ORDER BY id",
            )?;
            let rows = stmt.query_map([], row_to_record)?;
            let records: rusqlite::Result<Vec<ScoreRecord>> = rows.collect();
            records
        })
        .await
    }

    async fn recycle(&self) -> StoreResult<()> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.reopen())
            .await
            .map_err(|e| StoreError::Fatal(format!("store task failed: {e}")))?
    }

    async fn delete(&self, key: &RecordKey) -> StoreResult<bool> {
        let key = key.clone();
        let ts = format_timestamp(&key.timestamp);
        let removed = self
            .run(move |conn| {
                conn.execute(
                    "DELETE FROM scores WHERE item = ?1 AND performer = ?2 AND scored_at = ?3",
                    params![key.item, key.performer, ts],
                )
            })
            .await?;
        Ok(removed > 0)
    }

    async fn delete_items_containing(&self, fragment: &str) -> StoreResult<usize> {
        if fragment.is_empty() {
            return Ok(0);
        }
        let fragment = fragment.to_string();
        self.run(move |conn| {
            conn.execute("DELETE FROM scores WHERE instr(item, ?1) > 0", params![fragment])
        })
        .await
    }

    async fn count(&self) -> StoreResult<usize> {
        let n = self
            .run(|conn| conn.query_row("SELECT COUNT(*) FROM scores", [], |row| row.get::<_, i64>(0)))
            .await?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(item: &str, performer: &str, secs: u32, score: f64) -> ScoreRecord {
        ScoreRecord {
            item: item.to_string(),
            attribution: Some("Artist".to_string()),
            performer: performer.to_string(),
            score,
            timestamp: NaiveDate::from_ymd_opt(2024, 2, 29)
                .unwrap()
                .and_hms_opt(21, 30, secs)
                .unwrap(),
        }
    }

    #[tokio::test]
    async fn test_roundtrip_and_uniqueness() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteScoreStore::open(dir.path().join("scores.db")).unwrap();

        let rec = record("Song", "alice", 0, 92.5);
        assert!(!store.exists(&rec.key()).await.unwrap());
        assert_eq!(store.insert(&rec).await.unwrap(), InsertOutcome::Inserted);
        assert!(store.exists(&rec.key()).await.unwrap());
        assert_eq!(store.insert(&rec).await.unwrap(), InsertOutcome::Conflict);

        let all = store.scan_all().await.unwrap();
        assert_eq!(all, vec![rec]);
    }

    #[tokio::test]
    async fn test_missing_attribution_stays_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteScoreStore::open(dir.path().join("scores.db")).unwrap();
        let mut rec = record("", "alice", 1, 50.0);
        rec.attribution = None;
        store.insert(&rec).await.unwrap();
        assert_eq!(store.scan_all().await.unwrap()[0].attribution, None);
    }

    #[tokio::test]
    async fn test_data_survives_recycle_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("scores.db");
        let store = SqliteScoreStore::open(&path).unwrap();
        store.insert(&record("Song", "alice", 0, 90.0)).await.unwrap();
        store.recycle().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        drop(store);

        let reopened = SqliteScoreStore::open(&path).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_purge() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteScoreStore::open(dir.path().join("scores.db")).unwrap();
        let a = record("Song 生音", "alice", 0, 90.0);
        let b = record("Song 生音", "bob", 0, 80.0);
        let c = record("Plain", "alice", 5, 70.0);
        for r in [&a, &b, &c] {
            store.insert(r).await.unwrap();
        }

        assert_eq!(store.delete_items_containing("生音").await.unwrap(), 2);
        assert_eq!(store.delete_items_containing("").await.unwrap(), 0);
        assert!(store.delete(&c.key()).await.unwrap());
        assert!(!store.delete(&c.key()).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_two_handles_share_constraint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.db");
        let first = SqliteScoreStore::open(&path).unwrap();
        let second = SqliteScoreStore::open(&path).unwrap();
        let rec = record("Song", "alice", 0, 90.0);

        assert_eq!(first.insert(&rec).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(second.insert(&rec).await.unwrap(), InsertOutcome::Conflict);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_waiting_on_a_lock_leaves_the_runtime_free() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.db");
        let store = SqliteScoreStore::open(&path).unwrap();

        let blocker = Connection::open(&path).unwrap();
        blocker.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let insert = tokio::spawn({
            let store = store.clone();
            async move { store.insert(&record("Song", "alice", 0, 90.0)).await }
        });

        // The single runtime thread keeps running timers while the insert waits
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!insert.is_finished());

        blocker.execute_batch("COMMIT").unwrap();
        assert_eq!(insert.await.unwrap().unwrap(), InsertOutcome::Inserted);
    }
}
