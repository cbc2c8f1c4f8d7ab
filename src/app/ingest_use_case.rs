use crate::apis::scoring::{PageStop, ScoringClient};
use crate::error::{Result, ScoreboardError};
use crate::pipeline::ingestion::{IngestReport, Ingestor};
use crate::pipeline::normalize::normalize_batch;
use crate::registry::CredentialRegistry;
use crate::storage::{InsertOutcome, ScoreStore};
use crate::types::{parse_datetime_flexible, ScoreRecord};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Outcome of one performer's fetch → normalize → ingest job.
#[derive(Debug, Clone, Serialize)]
pub struct PerformerRun {
    pub performer: String,
    pub pages_fetched: u32,
    pub stop: PageStop,
    pub fetched: usize,
    pub rejected: usize,
    pub ingest: IngestReport,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub performers: Vec<PerformerRun>,
    /// Performers whose job ended in a hard error, with the message
    pub failures: Vec<(String, String)>,
}

impl RunReport {
    pub fn total_inserted(&self) -> usize {
        self.performers.iter().map(|p| p.ingest.inserted).sum()
    }
}

/// Runs ingestion for every registered performer. Jobs run concurrently and
/// share the store and HTTP client; one job failing never cancels another.
pub struct IngestUseCase {
    registry: Arc<CredentialRegistry>,
    client: Arc<ScoringClient>,
    store: Arc<dyn ScoreStore>,
    max_pages: u32,
}

impl IngestUseCase {
    pub fn new(
        registry: Arc<CredentialRegistry>,
        client: Arc<ScoringClient>,
        store: Arc<dyn ScoreStore>,
        max_pages: u32,
    ) -> Self {
        Self {
            registry,
            client,
            store,
            max_pages,
        }
    }

    /// Fetch, normalize and ingest for a single performer.
    pub async fn run_one(&self, performer: &str) -> Result<PerformerRun> {
        run_performer(
            &self.registry,
            &self.client,
            self.store.clone(),
            performer,
            self.max_pages,
        )
        .await
    }

    /// Run every performer in `only`, or all registered performers when empty.
    pub async fn run_all(&self, only: &[String]) -> RunReport {
        let performers: Vec<String> = if only.is_empty() {
            self.registry.performers().map(str::to_string).collect()
        } else {
            only.to_vec()
        };

        let mut jobs = JoinSet::new();
        let mut names: HashMap<tokio::task::Id, String> = HashMap::new();
        for performer in performers {
            let registry = self.registry.clone();
            let client = self.client.clone();
            let store = self.store.clone();
            let max_pages = self.max_pages;
            let name = performer.clone();
            let handle = jobs.spawn(async move {
                run_performer(&registry, &client, store, &performer, max_pages).await
            });
            names.insert(handle.id(), name);
        }

        let mut report = RunReport::default();
        while let Some(joined) = jobs.join_next_with_id().await {
            match joined {
                Ok((_, Ok(run))) => report.performers.push(run),
                Ok((id, Err(e))) => {
                    let performer = names.remove(&id).unwrap_or_default();
                    error!(%performer, "Ingestion failed: {}", e);
                    report.failures.push((performer, e.to_string()));
                }
                Err(e) => {
                    let performer = names.remove(&e.id()).unwrap_or_default();
                    error!(%performer, "Ingestion task aborted: {}", e);
                    report.failures.push((performer, e.to_string()));
                }
            }
        }
        report.performers.sort_by(|a, b| a.performer.cmp(&b.performer));
        report.failures.sort();

        info!(
            performers = report.performers.len(),
            failures = report.failures.len(),
            inserted = report.total_inserted(),
            "Ingestion run finished"
        );
        report
    }
}

async fn run_performer(
    registry: &CredentialRegistry,
    client: &ScoringClient,
    store: Arc<dyn ScoreStore>,
    performer: &str,
    max_pages: u32,
) -> Result<PerformerRun> {
    let credentials = registry.lookup(performer).ok_or_else(|| {
        ScoreboardError::Config(format!("no credentials registered for performer '{performer}'"))
    })?;

    let fetched = client.fetch(performer, credentials, max_pages).await;
    let batch = normalize_batch(performer, &fetched.entries);
    let ingest = Ingestor::new(store).ingest(performer, &batch.records).await?;

    Ok(PerformerRun {
        performer: performer.to_string(),
        pages_fetched: fetched.pages_fetched,
        stop: fetched.stop,
        fetched: fetched.entries.len(),
        rejected: batch.rejected,
        ingest,
    })
}

/// A record typed in by an administrator. The score is taken as-is.
#[derive(Debug, Clone, Default)]
pub struct ManualEntry {
    pub item: String,
    pub attribution: Option<String>,
    pub performer: String,
    pub score: String,
    pub timestamp: String,
}

impl ManualEntry {
    pub fn validate(&self) -> Result<ScoreRecord> {
        let mut problems = Vec::new();
        let item = self.item.trim();
        let performer = self.performer.trim();
        if item.is_empty() {
            problems.push("item is required".to_string());
        }
        if performer.is_empty() {
            problems.push("performer is required".to_string());
        }
        let score = self.score.trim().parse::<f64>().ok().filter(|s| s.is_finite());
        if score.is_none() {
            problems.push(format!("score must be a number, got {:?}", self.score));
        }
        let timestamp = parse_datetime_flexible(&self.timestamp);
        if timestamp.is_none() {
            problems.push(format!(
                "unrecognised date {:?}, use YYYY-MM-DD or YYYY-MM-DDTHH:MM",
                self.timestamp
            ));
        }

        match (score, timestamp) {
            (Some(score), Some(timestamp)) if problems.is_empty() => Ok(ScoreRecord {
                item: item.to_string(),
                attribution: self
                    .attribution
                    .as_deref()
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string),
                performer: performer.to_string(),
                score,
                timestamp,
            }),
            _ => Err(ScoreboardError::Validation(problems.join("; "))),
        }
    }
}

/// Insert one manually entered record. An existing record with the same
/// (item, performer, timestamp) is reported as [`ScoreboardError::Duplicate`].
pub async fn add_manual(store: &dyn ScoreStore, entry: &ManualEntry) -> Result<ScoreRecord> {
    let record = entry.validate()?;
    match store.insert(&record).await? {
        InsertOutcome::Inserted => {
            info!(key = %record.key(), "Added record");
            Ok(record)
        }
        InsertOutcome::Conflict => {
            warn!(key = %record.key(), "Record already exists");
            Err(ScoreboardError::Duplicate(record.key().to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::{HttpClientPort, HttpGetRequest, HttpGetResult};
    use crate::config::{AppConfig, PerformerConfig};
    use crate::storage::InMemoryScoreStore;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    /// Panics on the first request for a card and answers empty pages otherwise.
    struct PanicsForCard(&'static str);

    #[async_trait]
    impl HttpClientPort for PanicsForCard {
        async fn get(&self, request: &HttpGetRequest) -> std::result::Result<HttpGetResult, String> {
            if request.query.iter().any(|(_, v)| v == self.0) {
                panic!("provider blew up");
            }
            Ok(HttpGetResult {
                status: 200,
                bytes: b"<document><status>OK</status></document>".to_vec(),
            })
        }
    }

    fn performer(name: &str, card: &str) -> PerformerConfig {
        PerformerConfig {
            name: name.into(),
            cookies: BTreeMap::from([("scr_cdm".to_string(), card.to_string())]),
            ..Default::default()
        }
    }

    fn entry() -> ManualEntry {
        ManualEntry {
            item: " Song ".into(),
            attribution: Some("  ".into()),
            performer: "alice".into(),
            score: "91.25".into(),
            timestamp: "2024-05-01T20:30".into(),
        }
    }

    #[test]
    fn test_manual_entry_validation() {
        let record = entry().validate().unwrap();
        assert_eq!(record.item, "Song");
        assert_eq!(record.attribution, None);
        assert_eq!(record.score, 91.25);

        let bad = ManualEntry {
            item: String::new(),
            score: "ninety".into(),
            timestamp: "soon".into(),
            ..entry()
        };
        match bad.validate() {
            Err(ScoreboardError::Validation(msg)) => {
                assert!(msg.contains("item is required"));
                assert!(msg.contains("score must be a number"));
                assert!(msg.contains("unrecognised date"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_add_manual_rejects_duplicates() {
        let store = InMemoryScoreStore::new();
        add_manual(&store, &entry()).await.unwrap();
        let err = add_manual(&store, &entry()).await.unwrap_err();
        assert!(matches!(err, ScoreboardError::Duplicate(_)));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_panicking_job_is_reported_by_name() {
        let config = AppConfig {
            performers: vec![performer("alice", "CARD-A"), performer("bob", "CARD-B")],
            ..Default::default()
        };
        let registry = Arc::new(CredentialRegistry::from_config_with_env(&config, |_| None));
        let client = Arc::new(ScoringClient::new(Arc::new(PanicsForCard("CARD-A")), "http://provider.test"));
        let use_case = IngestUseCase::new(registry, client, Arc::new(InMemoryScoreStore::new()), 3);

        let report = use_case.run_all(&[]).await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "alice");
        assert!(report.failures[0].1.contains("panic"));
        assert_eq!(report.performers.len(), 1);
        assert_eq!(report.performers[0].performer, "bob");
        assert_eq!(report.performers[0].stop, PageStop::EmptyPage { page: 1 });
    }
}
