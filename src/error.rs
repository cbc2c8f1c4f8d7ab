use thiserror::Error;

/// Failures surfaced by a score store.
///
/// `Transient` covers faults that a fresh connection may cure (busy, locked,
/// severed file handle). Everything else is `Fatal`.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("transient store fault: {0}")]
    Transient(String),

    #[error("store failure: {0}")]
    Fatal(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match &err {
            rusqlite::Error::SqliteFailure(e, _) => match e.code {
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::NotADatabase => StoreError::Transient(err.to_string()),
                _ => StoreError::Fatal(err.to_string()),
            },
            _ => StoreError::Fatal(err.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ScoreboardError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("XML parsing failed: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Record already exists: {0}")]
    Duplicate(String),
}

pub type Result<T> = std::result::Result<T, ScoreboardError>;
