use crate::types::ScoreRecord;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::warn;

/// Item-level predicate evaluated against the full record set. Every variant
/// carries the performer it is evaluated for.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    #[default]
    None,
    /// Items scored by the target and nobody else
    Solo { target: String },
    /// Items scored by exactly two performers, neither being the target
    ExactlyTwoExcluding { target: String },
    /// Items where the target has at least one score at or above the threshold
    HighScore { target: String },
    /// Items where the target's best score stays below the threshold
    LowPeak { target: String },
}

impl Filter {
    /// Resolve a filter tag from an outer surface. Unknown tags and a blank
    /// target fall back to no filtering instead of failing the whole build.
    pub fn parse(tag: &str, target: &str) -> Filter {
        let target = target.trim();
        let tag = tag.trim();
        if tag.is_empty() {
            return Filter::None;
        }
        if target.is_empty() {
            warn!(tag, "Filter requested without a target performer, ignoring");
            return Filter::None;
        }
        let target = target.to_string();
        match tag.to_ascii_lowercase().as_str() {
            "solo" => Filter::Solo { target },
            "others2" | "exactly-two-excluding-target" | "exactly_two_excluding" => {
                Filter::ExactlyTwoExcluding { target }
            }
            "95" | "high-score" | "high_score" => Filter::HighScore { target },
            "dere" | "low-peak" | "low_peak" => Filter::LowPeak { target },
            other => {
                warn!(tag = other, "Unknown filter type, ignoring");
                Filter::None
            }
        }
    }
}

/// Thresholds used by [`Filter::HighScore`], [`Filter::LowPeak`] and the
/// matching per-performer counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub high_score: f64,
    pub low_peak: f64,
}

/// Highest score per item for one performer.
pub fn max_score_per_item<'a>(
    records: impl IntoIterator<Item = &'a ScoreRecord>,
    performer: &str,
) -> BTreeMap<&'a str, f64> {
    let mut max = BTreeMap::new();
    for r in records.into_iter().filter(|r| r.performer == performer) {
        max.entry(r.item.as_str())
            .and_modify(|m: &mut f64| *m = m.max(r.score))
            .or_insert(r.score);
    }
    max
}

fn performers_per_item(records: &[ScoreRecord]) -> BTreeMap<&str, BTreeSet<&str>> {
    let mut sets: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for r in records {
        sets.entry(r.item.as_str()).or_default().insert(r.performer.as_str());
    }
    sets
}

/// Keep only the records whose item passes `filter`.
pub fn apply_filter(records: &[ScoreRecord], filter: &Filter, thresholds: Thresholds) -> Vec<ScoreRecord> {
    let allowed: HashSet<&str> = match filter {
        Filter::None => return records.to_vec(),
        Filter::Solo { target } => performers_per_item(records)
            .into_iter()
            .filter(|(_, set)| set.len() == 1 && set.contains(target.as_str()))
            .map(|(item, _)| item)
            .collect(),
        Filter::ExactlyTwoExcluding { target } => performers_per_item(records)
            .into_iter()
            .filter(|(_, set)| set.len() == 2 && !set.contains(target.as_str()))
            .map(|(item, _)| item)
            .collect(),
        Filter::HighScore { target } => records
            .iter()
            .filter(|r| r.performer == *target && r.score >= thresholds.high_score)
            .map(|r| r.item.as_str())
            .collect(),
        Filter::LowPeak { target } => max_score_per_item(records, target)
            .into_iter()
            .filter(|(_, max)| *max < thresholds.low_peak)
            .map(|(item, _)| item)
            .collect(),
    };

    records
        .iter()
        .filter(|r| allowed.contains(r.item.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const THRESHOLDS: Thresholds = Thresholds {
        high_score: 95.0,
        low_peak: 80.0,
    };

    fn rec(item: &str, performer: &str, score: f64) -> ScoreRecord {
        ScoreRecord {
            item: item.into(),
            attribution: None,
            performer: performer.into(),
            score,
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
        }
    }

    fn items(records: &[ScoreRecord]) -> BTreeSet<String> {
        records.iter().map(|r| r.item.clone()).collect()
    }

    fn sample() -> Vec<ScoreRecord> {
        vec![
            rec("OnlyX", "X", 90.0),
            rec("OnlyX", "X", 70.0),
            rec("XY", "X", 96.0),
            rec("XY", "Y", 85.0),
            rec("YZ", "Y", 88.0),
            rec("YZ", "Z", 79.0),
            rec("XLow", "X", 75.0),
            rec("XLow", "X", 79.9),
            rec("XLow", "Y", 99.0),
        ]
    }

    #[test]
    fn test_solo() {
        let kept = apply_filter(&sample(), &Filter::Solo { target: "X".into() }, THRESHOLDS);
        assert_eq!(items(&kept), BTreeSet::from(["OnlyX".to_string()]));
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_exactly_two_excluding_target() {
        let kept = apply_filter(
            &sample(),
            &Filter::ExactlyTwoExcluding { target: "X".into() },
            THRESHOLDS,
        );
        assert_eq!(items(&kept), BTreeSet::from(["YZ".to_string()]));
    }

    #[test]
    fn test_high_score_keeps_whole_item() {
        let kept = apply_filter(&sample(), &Filter::HighScore { target: "X".into() }, THRESHOLDS);
        assert_eq!(items(&kept), BTreeSet::from(["XY".to_string()]));
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_low_peak_uses_target_max() {
        let kept = apply_filter(&sample(), &Filter::LowPeak { target: "X".into() }, THRESHOLDS);
        assert_eq!(items(&kept), BTreeSet::from(["XLow".to_string()]));
        // Other performers' records on the item are kept
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(Filter::parse("solo", "X"), Filter::Solo { target: "X".into() });
        assert_eq!(
            Filter::parse("others2", "X"),
            Filter::ExactlyTwoExcluding { target: "X".into() }
        );
        assert_eq!(Filter::parse("95", " X "), Filter::HighScore { target: "X".into() });
        assert_eq!(Filter::parse("dere", "X"), Filter::LowPeak { target: "X".into() });
        assert_eq!(Filter::parse("bogus", "X"), Filter::None);
        assert_eq!(Filter::parse("solo", ""), Filter::None);
        assert_eq!(Filter::parse("", "X"), Filter::None);
    }

    #[test]
    fn test_none_keeps_everything() {
        assert_eq!(apply_filter(&sample(), &Filter::None, THRESHOLDS).len(), 9);
    }
}
