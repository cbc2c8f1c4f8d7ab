use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use scoreboard::apis::scoring::ScoringClient;
use scoreboard::app::ingest_use_case::{add_manual, IngestUseCase, ManualEntry, RunReport};
use scoreboard::config::AppConfig;
use scoreboard::constants;
use scoreboard::db::SqliteScoreStore;
use scoreboard::history::{self, HistoryQuery, HistorySort};
use scoreboard::infra::http_client::ReqwestHttp;
use scoreboard::leaderboard::{Filter, ItemRanking, Leaderboard, LeaderboardOptions, LeaderboardQuery, LeaderboardService};
use scoreboard::registry::CredentialRegistry;
use scoreboard::storage::ScoreStore;
use scoreboard::types::{parse_datetime_flexible, RecordKey};
use scoreboard::{logging, metrics};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "scoreboard")]
#[command(about = "Karaoke scoring history ingester and leaderboard")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML config (falls back to $SCOREBOARD_CONFIG, then ./scoreboard.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Expose Prometheus metrics on this port while the command runs
    #[arg(long, global = true)]
    metrics_port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch scoring history for performers and store new records
    Ingest {
        /// Performers to ingest (comma-separated). Defaults to every configured performer
        #[arg(long)]
        performers: Option<String>,
        /// Page limit per performer, overriding the config value
        #[arg(long)]
        max_pages: Option<u32>,
    },
    /// Show per-song rankings and per-performer statistics
    Leaderboard {
        /// Substring match on the song name
        #[arg(long)]
        song: Option<String>,
        /// Substring match on the original singer
        #[arg(long)]
        singer: Option<String>,
        /// Performer the filter is evaluated for
        #[arg(long)]
        filter_user: Option<String>,
        /// One of: solo, others2, 95, dere
        #[arg(long)]
        filter_type: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List stored records, newest first by default
    History {
        #[arg(long)]
        user: Option<String>,
        /// recent, oldest, score_low or score_high
        #[arg(long, default_value = "")]
        sort: String,
        #[arg(long)]
        song: Option<String>,
        #[arg(long)]
        singer: Option<String>,
        #[arg(long, default_value_t = history::DEFAULT_PER_PAGE)]
        per: usize,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        json: bool,
    },
    /// Songs where the given performer currently ranks third
    Thirds {
        user: String,
        #[arg(long)]
        json: bool,
    },
    /// Add a record by hand; the score is stored as given
    Add {
        #[arg(long)]
        song: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        score: String,
        /// YYYY-MM-DD, YYYY-MM-DDTHH:MM or a full timestamp
        #[arg(long)]
        date: String,
        #[arg(long)]
        singer: Option<String>,
    },
    /// Delete one record by song, performer and timestamp
    Delete {
        #[arg(long)]
        song: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        date: String,
    },
    /// Delete every record whose song name contains the fragment
    Purge { fragment: String },
}

fn config_path(cli_value: Option<String>) -> String {
    cli_value
        .or_else(|| std::env::var("SCOREBOARD_CONFIG").ok())
        .unwrap_or_else(|| constants::DEFAULT_CONFIG_PATH.to_string())
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_run_report(report: &RunReport) {
    for run in &report.performers {
        println!(
            "{}: {} pages ({}), {} fetched, {} rejected, {} inserted, {} duplicates, {} conflicts, {} skipped",
            run.performer,
            run.pages_fetched,
            run.stop.label(),
            run.fetched,
            run.rejected,
            run.ingest.inserted,
            run.ingest.duplicates,
            run.ingest.conflicts,
            run.ingest.skipped,
        );
    }
    for (performer, reason) in &report.failures {
        println!("{performer}: FAILED: {reason}");
    }
    println!("Total inserted: {}", report.total_inserted());
}

fn print_ranking(ranking: &ItemRanking) {
    match &ranking.attribution {
        Some(attribution) => println!("{} / {} (top {:.3})", ranking.item, attribution, ranking.top_score),
        None => println!("{} (top {:.3})", ranking.item, ranking.top_score),
    }
    for (i, r) in ranking.records.iter().enumerate() {
        println!("  {}. {:<16} {:>8.3}  {}", i + 1, r.performer, r.score, r.timestamp);
    }
}

fn print_leaderboard(board: &Leaderboard) {
    println!("Performers:");
    for s in &board.statistics {
        println!(
            "  {:<16} avg {:>7}  high {:>3}  low-peak {:>3}  1st {:>3}  3rd {:>3}  records {:>4}",
            s.performer,
            s.average_score,
            s.high_score_items,
            s.low_peak_items,
            s.first_places,
            s.third_places,
            s.total_records,
        );
    }
    println!();
    for ranking in &board.items {
        print_ranking(ranking);
    }
}

fn parse_date_arg(date: &str) -> anyhow::Result<chrono::NaiveDateTime> {
    match parse_datetime_flexible(date) {
        Some(ts) => Ok(ts),
        None => bail!("unrecognised date {date:?}, use YYYY-MM-DD or YYYY-MM-DDTHH:MM"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    if let Some(port) = cli.metrics_port {
        metrics::init_metrics(port);
    }

    let config = AppConfig::load(config_path(cli.config))?;
    let store: Arc<dyn ScoreStore> = Arc::new(
        SqliteScoreStore::open(&config.database.path)
            .with_context(|| format!("opening score database at {}", config.database.path))?,
    );

    match cli.command {
        Commands::Ingest { performers, max_pages } => {
            let registry = Arc::new(CredentialRegistry::from_config(&config));
            if registry.is_empty() {
                warn!("No performers configured; nothing to ingest");
            }
            let http = Arc::new(ReqwestHttp::new(Duration::from_secs(config.provider.timeout_seconds))?);
            let client = Arc::new(ScoringClient::new(http, config.provider.url.clone()));
            let max_pages = max_pages.unwrap_or(config.provider.max_pages);

            let use_case = IngestUseCase::new(registry, client, store, max_pages);
            let report = use_case.run_all(&split_list(performers)).await;
            print_run_report(&report);
        }
        Commands::Leaderboard {
            song,
            singer,
            filter_user,
            filter_type,
            json,
        } => {
            let query = LeaderboardQuery {
                filter: Filter::parse(
                    filter_type.as_deref().unwrap_or_default(),
                    filter_user.as_deref().unwrap_or_default(),
                ),
                item_query: song,
                attribution_query: singer,
            };
            let service = LeaderboardService::new(store, LeaderboardOptions::from(&config.leaderboard));
            let board = service.load(&query).await?;
            if json {
                print_json(&board)?;
            } else {
                print_leaderboard(&board);
            }
        }
        Commands::History {
            user,
            sort,
            song,
            singer,
            per,
            page,
            json,
        } => {
            let query = HistoryQuery {
                performer: user,
                item_query: song,
                attribution_query: singer,
                sort: HistorySort::parse(&sort),
                per,
                page,
            };
            let records = store.scan_all().await?;
            let listing = history::list(&records, &query);
            if json {
                print_json(&listing)?;
            } else {
                for r in &listing.records {
                    println!(
                        "{}  {:<16} {:>8.3}  {}{}",
                        r.timestamp,
                        r.performer,
                        r.score,
                        r.item,
                        r.attribution.as_deref().map(|a| format!(" / {a}")).unwrap_or_default(),
                    );
                }
                println!(
                    "page {}/{} ({} records)",
                    listing.page, listing.total_pages, listing.total
                );
            }
        }
        Commands::Thirds { user, json } => {
            let service = LeaderboardService::new(store, LeaderboardOptions::from(&config.leaderboard));
            let thirds = service.third_places(&user).await?;
            if json {
                print_json(&thirds)?;
            } else {
                println!("{} songs where {} ranks third", thirds.len(), user);
                for ranking in &thirds {
                    print_ranking(ranking);
                }
            }
        }
        Commands::Add {
            song,
            user,
            score,
            date,
            singer,
        } => {
            let entry = ManualEntry {
                item: song,
                attribution: singer,
                performer: user,
                score,
                timestamp: date,
            };
            let record = add_manual(store.as_ref(), &entry).await?;
            println!("Added {}", record.key());
        }
        Commands::Delete { song, user, date } => {
            let key = RecordKey {
                item: song.trim().to_string(),
                performer: user.trim().to_string(),
                timestamp: parse_date_arg(&date)?,
            };
            if store.delete(&key).await? {
                info!(%key, "Deleted record");
                println!("Deleted {key}");
            } else {
                println!("No record matches {key}");
            }
        }
        Commands::Purge { fragment } => {
            let removed = store.delete_items_containing(&fragment).await?;
            info!(fragment = %fragment, removed, "Purged records");
            println!("Removed {removed} records");
        }
    }

    Ok(())
}
