use crate::constants::SCORE_SCALE;
use crate::types::{parse_datetime_flexible, RawEntry, ScoreRecord};
use thiserror::Error;
use tracing::debug;

/// Why a raw entry was dropped. Rejections never escalate past the batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("unparseable score {0:?}")]
    Score(String),
    #[error("unparseable timestamp {0:?}")]
    Timestamp(String),
}

#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub records: Vec<ScoreRecord>,
    pub rejected: usize,
}

/// Convert one provider entry into a canonical record.
///
/// An empty item label is kept: the provider legitimately omits it for some
/// entries and dropping them would lose history.
pub fn normalize(performer: &str, raw: &RawEntry) -> Result<ScoreRecord, Rejection> {
    let score = raw
        .score_text
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Rejection::Score(raw.score_text.clone()))?
        / SCORE_SCALE;

    let timestamp = parse_datetime_flexible(&raw.timestamp_text)
        .ok_or_else(|| Rejection::Timestamp(raw.timestamp_text.clone()))?;

    let attribution = raw.attribution_name.trim();

    Ok(ScoreRecord {
        item: raw.item_name.trim().to_string(),
        attribution: (!attribution.is_empty()).then(|| attribution.to_string()),
        performer: performer.trim().to_string(),
        score,
        timestamp,
    })
}

pub fn normalize_batch(performer: &str, raw: &[RawEntry]) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    for entry in raw {
        match normalize(performer, entry) {
            Ok(record) => batch.records.push(record),
            Err(rejection) => {
                debug!(performer, item = %entry.item_name, "Dropped entry: {}", rejection);
                batch.rejected += 1;
            }
        }
    }
    if batch.rejected > 0 {
        ::metrics::counter!(crate::metrics::NORMALIZE_REJECTED).increment(batch.rejected as u64);
    }
    batch
}
