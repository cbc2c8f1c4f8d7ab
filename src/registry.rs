//! Performer name to provider session credentials.
//!
//! Built once at start-up from [`AppConfig`] and shared read-only afterwards.

use crate::config::{AppConfig, PerformerConfig};
use crate::constants;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderCredentials {
    cookies: BTreeMap<String, String>,
}

impl ProviderCredentials {
    pub fn new(cookies: BTreeMap<String, String>) -> Self {
        Self { cookies }
    }

    /// Card identifier sent as `cdmCardNo`; empty when not configured.
    pub fn card_id(&self) -> &str {
        self.cookies
            .get(constants::COOKIE_CARD_NO)
            .map(|s| s.trim())
            .unwrap_or("")
    }

    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    /// `Cookie` header value; empty cookies are left out.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default)]
pub struct CredentialRegistry {
    entries: BTreeMap<String, ProviderCredentials>,
}

impl CredentialRegistry {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::from_config_with_env(config, |key| std::env::var(key).ok())
    }

    /// Same as [`from_config`](Self::from_config) with an injectable env lookup.
    pub fn from_config_with_env<F>(config: &AppConfig, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let entries = config
            .performers
            .iter()
            .map(|p| (p.name.trim().to_string(), resolve_credentials(p, &env)))
            .collect();
        Self { entries }
    }

    pub fn lookup(&self, performer: &str) -> Option<&ProviderCredentials> {
        self.entries.get(performer)
    }

    pub fn performers(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn resolve_credentials<F>(performer: &PerformerConfig, env: &F) -> ProviderCredentials
where
    F: Fn(&str) -> Option<String>,
{
    let mut cookies = BTreeMap::new();
    if let Some(prefix) = performer.env_prefix.as_deref() {
        for (cookie, suffix) in constants::COOKIE_ENV_SUFFIXES {
            let value = env(&format!("{prefix}_{suffix}")).unwrap_or_default();
            cookies.insert((*cookie).to_string(), value);
        }
        cookies.insert(constants::COOKIE_WEBMEMBER.to_string(), "1".to_string());
    }
    for (k, v) in &performer.cookies {
        cookies.insert(k.clone(), v.clone());
    }
    ProviderCredentials::new(cookies)
}
