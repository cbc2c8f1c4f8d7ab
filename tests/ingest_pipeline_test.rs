use anyhow::Result;
use async_trait::async_trait;
use scoreboard::apis::scoring::{PageStop, ScoringClient};
use scoreboard::app::ingest_use_case::IngestUseCase;
use scoreboard::app::ports::{HttpClientPort, HttpGetRequest, HttpGetResult};
use scoreboard::config::AppConfig;
use scoreboard::constants;
use scoreboard::db::SqliteScoreStore;
use scoreboard::leaderboard::{Filter, LeaderboardOptions, LeaderboardQuery, LeaderboardService};
use scoreboard::registry::CredentialRegistry;
use scoreboard::storage::{InMemoryScoreStore, ScoreStore};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

/// Serves canned pages keyed by card number; pages past the end are empty.
struct FakeProvider {
    pages: BTreeMap<String, Vec<Vec<(&'static str, &'static str, &'static str)>>>,
    calls: AtomicUsize,
}

impl FakeProvider {
    fn new() -> Self {
        let mut pages = BTreeMap::new();
        pages.insert(
            "CARD-A".to_string(),
            vec![vec![
                ("Song1", "100000", "2024/03/01 20:00:00"),
                ("Song2", "91000", "2024/03/01 20:05:00"),
            ]],
        );
        pages.insert(
            "CARD-B".to_string(),
            vec![
                vec![("Song1", "80000", "2024/03/02 21:00:00")],
                vec![("Song2", "93500", "2024/03/02 21:10:00")],
            ],
        );
        Self {
            pages,
            calls: AtomicUsize::new(0),
        }
    }

    fn render(entries: &[(&str, &str, &str)]) -> Vec<u8> {
        let body: String = entries
            .iter()
            .map(|(song, score, at)| {
                format!(r#"<scoring contentsName="{song}" artistName="Singer" scoringDateTime="{at}">{score}</scoring>"#)
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><document xmlns="{}"><result><status>OK</status></result><list>{body}</list></document>"#,
            constants::SCORING_XML_NAMESPACE
        )
        .into_bytes()
    }
}

#[async_trait]
impl HttpClientPort for FakeProvider {
    async fn get(&self, request: &HttpGetRequest) -> std::result::Result<HttpGetResult, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let param = |name: &str| {
            request
                .query
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        };
        let card = param(constants::PARAM_CARD_NO);
        let page: usize = param(constants::PARAM_PAGE_NO).parse().map_err(|_| "bad page".to_string())?;
        let entries = self
            .pages
            .get(&card)
            .and_then(|pages| pages.get(page - 1))
            .cloned()
            .unwrap_or_default();
        Ok(HttpGetResult {
            status: 200,
            bytes: Self::render(&entries),
        })
    }
}

fn config() -> AppConfig {
    AppConfig::from_toml(
        r#"
        [provider]
        url = "http://provider.test/GetScoringAiListXML"
        max_pages = 5

        [[performers]]
        name = "A"
        cookies = { scr_cdm = "CARD-A", dam-uid = "uid-a" }

        [[performers]]
        name = "B"
        cookies = { scr_cdm = "CARD-B", dam-uid = "uid-b" }

        [[performers]]
        name = "C"
        "#,
    )
    .unwrap()
}

fn use_case(store: Arc<dyn ScoreStore>, provider: Arc<FakeProvider>) -> IngestUseCase {
    let config = config();
    let registry = Arc::new(CredentialRegistry::from_config_with_env(&config, |_| None));
    let client = Arc::new(ScoringClient::new(provider, config.provider.url.clone()));
    IngestUseCase::new(registry, client, store, config.provider.max_pages)
}

#[tokio::test]
async fn test_ingest_then_rank_end_to_end() -> Result<()> {
    let store: Arc<dyn ScoreStore> = Arc::new(InMemoryScoreStore::new());
    let provider = Arc::new(FakeProvider::new());
    let report = use_case(store.clone(), provider.clone()).run_all(&[]).await;

    assert!(report.failures.is_empty());
    assert_eq!(report.performers.len(), 3);
    assert_eq!(report.total_inserted(), 4);

    let a = &report.performers[0];
    assert_eq!(a.performer, "A");
    assert_eq!(a.stop, PageStop::EmptyPage { page: 2 });
    let c = &report.performers[2];
    assert_eq!(c.stop, PageStop::MissingCard);
    assert_eq!(c.pages_fetched, 0);
    // A: 2 pages, B: 3 pages, C: none
    assert_eq!(provider.calls.load(Ordering::SeqCst), 5);

    let service = LeaderboardService::new(store, LeaderboardOptions::default());
    let board = service.load(&LeaderboardQuery::default()).await?;

    let song1 = board.ranking_for("Song1").unwrap();
    assert_eq!(song1.top_score, 100.0);
    assert_eq!(song1.rank_of("A"), Some(1));
    assert_eq!(song1.rank_of("B"), Some(2));
    assert_eq!(song1.attribution.as_deref(), Some("Singer"));

    let song2 = board.ranking_for("Song2").unwrap();
    assert_eq!(song2.rank_of("B"), Some(1));

    assert_eq!(board.statistics_for("A").unwrap().first_places, 1);
    assert_eq!(board.statistics_for("B").unwrap().first_places, 1);
    assert_eq!(board.statistics_for("A").unwrap().average_score, 95.5);
    Ok(())
}

#[tokio::test]
async fn test_reingest_is_idempotent_on_sqlite() -> Result<()> {
    let dir = tempdir()?;
    let store: Arc<dyn ScoreStore> = Arc::new(SqliteScoreStore::open(dir.path().join("scores.db"))?);
    let provider = Arc::new(FakeProvider::new());
    let ingest = use_case(store.clone(), provider);

    let first = ingest.run_all(&[]).await;
    assert_eq!(first.total_inserted(), 4);

    let second = ingest.run_all(&[]).await;
    assert_eq!(second.total_inserted(), 0);
    let duplicates: usize = second.performers.iter().map(|p| p.ingest.duplicates).sum();
    assert_eq!(duplicates, 4);
    assert_eq!(store.count().await?, 4);
    Ok(())
}

#[tokio::test]
async fn test_selected_performers_and_unknown_name() -> Result<()> {
    let store: Arc<dyn ScoreStore> = Arc::new(InMemoryScoreStore::new());
    let provider = Arc::new(FakeProvider::new());
    let report = use_case(store.clone(), provider)
        .run_all(&["B".to_string(), "nobody".to_string()])
        .await;

    assert_eq!(report.performers.len(), 1);
    assert_eq!(report.performers[0].ingest.inserted, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "nobody");

    // With only B stored, the solo filter for B keeps both songs
    let service = LeaderboardService::new(store, LeaderboardOptions::default());
    let board = service
        .load(&LeaderboardQuery {
            filter: Filter::Solo { target: "B".into() },
            ..Default::default()
        })
        .await?;
    assert_eq!(board.items.len(), 2);
    assert_eq!(board.statistics_for("B").unwrap().first_places, 2);
    Ok(())
}
