use super::filters::max_score_per_item;
use super::{ItemRanking, LeaderboardOptions};
use crate::types::ScoreRecord;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformerStatistics {
    pub performer: String,
    /// Mean over every record, rounded to the configured precision
    pub average_score: f64,
    /// Distinct items with at least one score at or above the high-score threshold
    pub high_score_items: usize,
    /// Distinct items whose best score is below the low-peak threshold
    pub low_peak_items: usize,
    pub first_places: usize,
    pub third_places: usize,
    pub total_records: usize,
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals.min(15) as i32);
    (value * factor).round() / factor
}

/// Statistics that depend only on the records; rank counts start at zero.
pub(super) fn base_statistics(records: &[ScoreRecord], options: &LeaderboardOptions) -> Vec<PerformerStatistics> {
    let mut by_performer: BTreeMap<&str, Vec<&ScoreRecord>> = BTreeMap::new();
    for r in records {
        by_performer.entry(r.performer.as_str()).or_default().push(r);
    }

    by_performer
        .into_iter()
        .map(|(performer, own)| {
            let total = own.len();
            let sum: f64 = own.iter().map(|r| r.score).sum();
            let high_score_items = own
                .iter()
                .filter(|r| r.score >= options.thresholds.high_score)
                .map(|r| r.item.as_str())
                .collect::<BTreeSet<_>>()
                .len();
            let low_peak_items = max_score_per_item(own.iter().copied(), performer)
                .values()
                .filter(|max| **max < options.thresholds.low_peak)
                .count();

            PerformerStatistics {
                performer: performer.to_string(),
                average_score: round_to(sum / total as f64, options.average_precision),
                high_score_items,
                low_peak_items,
                first_places: 0,
                third_places: 0,
                total_records: total,
            }
        })
        .collect()
}

pub(super) fn apply_rank_counts(statistics: &mut [PerformerStatistics], items: &[ItemRanking]) {
    let mut firsts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut thirds: BTreeMap<&str, usize> = BTreeMap::new();
    for item in items {
        if let Some(first) = item.records.first() {
            *firsts.entry(first.performer.as_str()).or_default() += 1;
        }
        if let Some(third) = item.records.get(2) {
            *thirds.entry(third.performer.as_str()).or_default() += 1;
        }
    }
    for s in statistics.iter_mut() {
        s.first_places = firsts.get(s.performer.as_str()).copied().unwrap_or(0);
        s.third_places = thirds.get(s.performer.as_str()).copied().unwrap_or(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaderboard::Thresholds;
    use chrono::NaiveDate;

    fn rec(item: &str, performer: &str, score: f64, day: u32) -> ScoreRecord {
        ScoreRecord {
            item: item.into(),
            attribution: None,
            performer: performer.into(),
            score,
            timestamp: NaiveDate::from_ymd_opt(2024, 7, day).unwrap().and_hms_opt(0, 0, 0).unwrap(),
        }
    }

    fn options(precision: u32) -> LeaderboardOptions {
        LeaderboardOptions {
            average_precision: precision,
            thresholds: Thresholds {
                high_score: 95.0,
                low_peak: 80.0,
            },
        }
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(88.12345, 2), 88.12);
        assert_eq!(round_to(88.12345, 3), 88.123);
        assert_eq!(round_to(88.5, 0), 89.0);
    }

    #[test]
    fn test_counts_and_average() {
        let records = vec![
            rec("A", "p", 96.0, 1),
            rec("A", "p", 97.0, 2),
            rec("B", "p", 95.0, 1),
            rec("C", "p", 70.0, 1),
            rec("C", "p", 79.0, 2),
            rec("D", "p", 60.0, 1),
            rec("D", "p", 81.0, 2),
        ];
        let stats = base_statistics(&records, &options(3));
        assert_eq!(stats.len(), 1);
        let p = &stats[0];
        assert_eq!(p.total_records, 7);
        assert_eq!(p.high_score_items, 2);
        assert_eq!(p.low_peak_items, 1);
        assert_eq!(p.average_score, 82.571);
        assert_eq!(base_statistics(&records, &options(2))[0].average_score, 82.57);
    }
}
