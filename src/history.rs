//! Paged score history listings, for one performer or for everyone.

use crate::types::ScoreRecord;
use serde::Serialize;
use std::cmp::Ordering;

pub const DEFAULT_PER_PAGE: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySort {
    /// Newest first
    #[default]
    Recent,
    Oldest,
    /// Lowest score first, earliest first among equals
    ScoreLow,
    /// Highest score first, earliest first among equals
    ScoreHigh,
}

impl HistorySort {
    /// Blank input maps to `Recent`; any unrecognised tag to `ScoreHigh`.
    pub fn parse(tag: &str) -> Self {
        match tag.trim() {
            "" | "recent" => HistorySort::Recent,
            "oldest" => HistorySort::Oldest,
            "score_low" => HistorySort::ScoreLow,
            _ => HistorySort::ScoreHigh,
        }
    }

    fn compare(self, a: &ScoreRecord, b: &ScoreRecord) -> Ordering {
        match self {
            HistorySort::Recent => b.timestamp.cmp(&a.timestamp),
            HistorySort::Oldest => a.timestamp.cmp(&b.timestamp),
            HistorySort::ScoreLow => a
                .score
                .total_cmp(&b.score)
                .then_with(|| a.timestamp.cmp(&b.timestamp)),
            HistorySort::ScoreHigh => b
                .score
                .total_cmp(&a.score)
                .then_with(|| a.timestamp.cmp(&b.timestamp)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Restrict to one performer; `None` lists everyone
    pub performer: Option<String>,
    pub item_query: Option<String>,
    pub attribution_query: Option<String>,
    pub sort: HistorySort,
    pub per: usize,
    /// 1-based
    pub page: usize,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            performer: None,
            item_query: None,
            attribution_query: None,
            sort: HistorySort::default(),
            per: DEFAULT_PER_PAGE,
            page: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPage {
    pub records: Vec<ScoreRecord>,
    pub total: usize,
    pub page: usize,
    pub per: usize,
    pub total_pages: usize,
}

fn contains_ci(haystack: &str, needle: Option<&str>) -> bool {
    match needle.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => haystack.to_lowercase().contains(&n.to_lowercase()),
        None => true,
    }
}

pub fn list(records: &[ScoreRecord], query: &HistoryQuery) -> HistoryPage {
    let per = query.per.max(1);
    let page = query.page.max(1);

    let mut selected: Vec<&ScoreRecord> = records
        .iter()
        .filter(|r| query.performer.as_deref().map_or(true, |p| r.performer == p))
        .filter(|r| contains_ci(&r.item, query.item_query.as_deref()))
        .filter(|r| contains_ci(r.attribution_or_empty(), query.attribution_query.as_deref()))
        .collect();
    selected.sort_by(|a, b| query.sort.compare(a, b));

    let total = selected.len();
    let records = selected
        .into_iter()
        .skip((page - 1).saturating_mul(per))
        .take(per)
        .cloned()
        .collect();

    HistoryPage {
        records,
        total,
        page,
        per,
        total_pages: total.div_ceil(per).max(1),
    }
}
