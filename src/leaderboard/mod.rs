//! Leaderboard aggregation over a snapshot of score history.
//!
//! Everything here is recomputed per call from the records handed in. Nothing
//! is cached.

pub mod filters;
pub mod stats;

use crate::config::LeaderboardConfig;
use crate::constants::LEADERBOARD_DEPTH;
use crate::error::Result;
use crate::storage::ScoreStore;
use crate::types::ScoreRecord;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

pub use filters::{apply_filter, Filter, Thresholds};
pub use stats::PerformerStatistics;

/// The one ranking comparator: score descending, then earliest timestamp.
/// Used both when picking a performer's best record and when ranking an item.
pub fn rank_order(a: &ScoreRecord, b: &ScoreRecord) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.timestamp.cmp(&b.timestamp))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRecord {
    pub performer: String,
    pub attribution: Option<String>,
    pub score: f64,
    pub timestamp: NaiveDateTime,
}

impl From<&ScoreRecord> for RankedRecord {
    fn from(r: &ScoreRecord) -> Self {
        Self {
            performer: r.performer.clone(),
            attribution: r.attribution.clone(),
            score: r.score,
            timestamp: r.timestamp,
        }
    }
}

/// Top entries for one item, rank 1 first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemRanking {
    pub item: String,
    /// Attribution of the rank-1 record
    pub attribution: Option<String>,
    pub top_score: f64,
    pub records: Vec<RankedRecord>,
}

impl ItemRanking {
    /// 1-based rank of `performer`, if ranked on this item.
    pub fn rank_of(&self, performer: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.performer == performer)
            .map(|i| i + 1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LeaderboardQuery {
    pub filter: Filter,
    /// Case-insensitive substring match on the item name
    pub item_query: Option<String>,
    /// Case-insensitive substring match on the attribution
    pub attribution_query: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeaderboardOptions {
    pub average_precision: u32,
    pub thresholds: Thresholds,
}

impl Default for LeaderboardOptions {
    fn default() -> Self {
        LeaderboardOptions::from(&LeaderboardConfig::default())
    }
}

impl From<&LeaderboardConfig> for LeaderboardOptions {
    fn from(config: &LeaderboardConfig) -> Self {
        Self {
            average_precision: config.average_precision,
            thresholds: Thresholds {
                high_score: config.high_score_threshold,
                low_peak: config.low_peak_threshold,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Leaderboard {
    pub items: Vec<ItemRanking>,
    /// One entry per performer present after filtering, by name
    pub statistics: Vec<PerformerStatistics>,
}

impl Leaderboard {
    pub fn statistics_for(&self, performer: &str) -> Option<&PerformerStatistics> {
        self.statistics.iter().find(|s| s.performer == performer)
    }

    pub fn ranking_for(&self, item: &str) -> Option<&ItemRanking> {
        self.items.iter().find(|i| i.item == item)
    }
}

/// Best record per (item, performer): highest score, earliest on ties.
pub fn best_per_performer(records: &[ScoreRecord]) -> Vec<&ScoreRecord> {
    let mut best: BTreeMap<(&str, &str), &ScoreRecord> = BTreeMap::new();
    for r in records {
        best.entry((r.item.as_str(), r.performer.as_str()))
            .and_modify(|current| {
                if rank_order(r, current) == Ordering::Less {
                    *current = r;
                }
            })
            .or_insert(r);
    }
    best.into_values().collect()
}

/// Per-item top-N of best records, items ordered by rank-1 score descending.
///
/// Both sorts are stable and their input order is fixed (item, then performer
/// name), so identical input always yields identical output.
pub fn rank_items(records: &[ScoreRecord]) -> Vec<ItemRanking> {
    let mut by_item: BTreeMap<&str, Vec<&ScoreRecord>> = BTreeMap::new();
    for best in best_per_performer(records) {
        by_item.entry(best.item.as_str()).or_default().push(best);
    }

    let mut items: Vec<ItemRanking> = by_item
        .into_iter()
        .filter_map(|(item, mut group)| {
            group.sort_by(|a, b| rank_order(a, b));
            let top = *group.first()?;
            Some(ItemRanking {
                item: item.to_string(),
                attribution: top.attribution.clone(),
                top_score: top.score,
                records: group
                    .into_iter()
                    .take(LEADERBOARD_DEPTH)
                    .map(RankedRecord::from)
                    .collect(),
            })
        })
        .collect();

    items.sort_by(|a, b| b.top_score.total_cmp(&a.top_score));
    items
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn matches_search(record: &ScoreRecord, query: &LeaderboardQuery) -> bool {
    let item_ok = query
        .item_query
        .as_deref()
        .filter(|q| !q.is_empty())
        .map_or(true, |q| contains_ci(&record.item, q));
    let attribution_ok = query
        .attribution_query
        .as_deref()
        .filter(|q| !q.is_empty())
        .map_or(true, |q| contains_ci(record.attribution_or_empty(), q));
    item_ok && attribution_ok
}

/// Build the ranked items and per-performer statistics.
///
/// The filter predicate runs first and scopes the statistics. Search terms
/// then narrow the ranked items, and the rank-1/rank-3 counts follow the
/// ranked items. Empty input yields an empty leaderboard.
pub fn build_leaderboard(
    records: &[ScoreRecord],
    query: &LeaderboardQuery,
    options: &LeaderboardOptions,
) -> Leaderboard {
    let filtered = apply_filter(records, &query.filter, options.thresholds);
    let mut statistics = stats::base_statistics(&filtered, options);

    let searched: Vec<ScoreRecord> = filtered
        .into_iter()
        .filter(|r| matches_search(r, query))
        .collect();
    let items = rank_items(&searched);
    stats::apply_rank_counts(&mut statistics, &items);

    debug!(
        input = records.len(),
        items = items.len(),
        performers = statistics.len(),
        "Built leaderboard"
    );
    Leaderboard { items, statistics }
}

/// Items where `performer` holds rank 3 of a full top-3, strongest items first.
pub fn third_place_items(records: &[ScoreRecord], performer: &str) -> Vec<ItemRanking> {
    rank_items(records)
        .into_iter()
        .filter(|item| {
            item.records.len() >= LEADERBOARD_DEPTH
                && item.records.get(2).map(|r| r.performer.as_str()) == Some(performer)
        })
        .collect()
}

/// Reads one snapshot from the store per call and aggregates it. A store
/// failure fails the whole call; a partial leaderboard is never returned.
pub struct LeaderboardService {
    store: Arc<dyn ScoreStore>,
    options: LeaderboardOptions,
}

impl LeaderboardService {
    pub fn new(store: Arc<dyn ScoreStore>, options: LeaderboardOptions) -> Self {
        Self { store, options }
    }

    #[instrument(skip(self))]
    pub async fn load(&self, query: &LeaderboardQuery) -> Result<Leaderboard> {
        let records = self.store.scan_all().await?;
        Ok(build_leaderboard(&records, query, &self.options))
    }

    pub async fn third_places(&self, performer: &str) -> Result<Vec<ItemRanking>> {
        let records = self.store.scan_all().await?;
        Ok(third_place_items(&records, performer))
    }
}
