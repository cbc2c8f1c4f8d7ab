use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Entry as extracted from one `<scoring>` element, before any validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    pub item_name: String,
    pub attribution_name: String,
    pub score_text: String,
    pub timestamp_text: String,
}

/// Canonical, persisted unit of scoring history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// The scored piece (song title)
    pub item: String,
    /// Original artist of the piece, when the source knows it
    pub attribution: Option<String>,
    /// Tracked user who produced the score
    pub performer: String,
    pub score: f64,
    /// Provider-local wall-clock time of the performance
    pub timestamp: NaiveDateTime,
}

impl ScoreRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            item: self.item.clone(),
            performer: self.performer.clone(),
            timestamp: self.timestamp,
        }
    }

    pub fn attribution_or_empty(&self) -> &str {
        self.attribution.as_deref().unwrap_or("")
    }
}

/// Uniqueness key of a record in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub item: String,
    pub performer: String,
    pub timestamp: NaiveDateTime,
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.item, self.performer, self.timestamp)
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y%m%d%H%M%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Parse the date-time shapes seen from the provider and from manual entry.
///
/// Offsets in RFC 3339 input are dropped: the wall-clock time is kept, since
/// every stored timestamp is provider-local. Date-only input maps to midnight.
pub fn parse_datetime_flexible(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}
