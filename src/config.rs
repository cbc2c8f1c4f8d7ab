use crate::constants;
use crate::error::{Result, ScoreboardError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub leaderboard: LeaderboardConfig,
    pub performers: Vec<PerformerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: constants::DEFAULT_DATABASE_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub url: String,
    pub timeout_seconds: u64,
    pub max_pages: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: constants::DEFAULT_PROVIDER_URL.to_string(),
            timeout_seconds: constants::DEFAULT_TIMEOUT_SECONDS,
            max_pages: constants::DEFAULT_MAX_PAGES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LeaderboardConfig {
    /// Decimal places kept on per-performer averages
    pub average_precision: u32,
    pub high_score_threshold: f64,
    pub low_peak_threshold: f64,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            average_precision: constants::DEFAULT_AVERAGE_PRECISION,
            high_score_threshold: constants::DEFAULT_HIGH_SCORE_THRESHOLD,
            low_peak_threshold: constants::DEFAULT_LOW_PEAK_THRESHOLD,
        }
    }
}

/// One tracked performer. Cookies come from `<env_prefix>_DAM_UID` and
/// friends; entries in `cookies` win over the environment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PerformerConfig {
    pub name: String,
    pub env_prefix: Option<String>,
    pub cookies: BTreeMap<String, String>,
}

impl AppConfig {
    /// Load from a TOML file. A missing file is not an error: defaults apply
    /// and no performers are tracked.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            ScoreboardError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.provider.max_pages == 0 {
            return Err(ScoreboardError::Config(
                "provider.max_pages must be at least 1".to_string(),
            ));
        }
        if self.provider.timeout_seconds == 0 {
            return Err(ScoreboardError::Config(
                "provider.timeout_seconds must be at least 1".to_string(),
            ));
        }
        for performer in &self.performers {
            if performer.name.trim().is_empty() {
                return Err(ScoreboardError::Config(
                    "every [[performers]] entry needs a name".to_string(),
                ));
            }
        }
        Ok(())
    }
}
