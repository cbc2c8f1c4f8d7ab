use crate::app::ports::{HttpClientPort, HttpGetRequest};
use crate::constants;
use crate::parser::{PageParser, ScoringAiListV1Parser};
use crate::registry::ProviderCredentials;
use crate::types::RawEntry;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Why pagination ended for one performer. None of these is an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageStop {
    /// No card identifier configured; nothing was requested
    MissingCard,
    /// Every page up to the limit was consumed
    MaxPages,
    EmptyPage { page: u32 },
    StatusNotOk { page: u32, status: Option<String> },
    /// Network error, timeout, non-2xx reply or unparseable body
    Transport { page: u32, reason: String },
}

impl PageStop {
    pub fn label(&self) -> &'static str {
        match self {
            PageStop::MissingCard => "missing_card",
            PageStop::MaxPages => "max_pages",
            PageStop::EmptyPage { .. } => "empty_page",
            PageStop::StatusNotOk { .. } => "status_not_ok",
            PageStop::Transport { .. } => "transport",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    pub entries: Vec<RawEntry>,
    pub pages_fetched: u32,
    pub stop: PageStop,
}

/// Paginated client for the provider's scoring list.
///
/// Every call to [`fetch`](Self::fetch) performs fresh network I/O. Pages are
/// requested strictly in order since each stop condition depends on the
/// previous reply.
pub struct ScoringClient {
    http: Arc<dyn HttpClientPort>,
    parser: Box<dyn PageParser>,
    url: String,
}

impl ScoringClient {
    pub fn new(http: Arc<dyn HttpClientPort>, url: impl Into<String>) -> Self {
        Self {
            http,
            parser: Box::new(ScoringAiListV1Parser::new()),
            url: url.into(),
        }
    }

    fn page_request(&self, credentials: &ProviderCredentials, page: u32) -> HttpGetRequest {
        HttpGetRequest {
            url: self.url.clone(),
            query: vec![
                (constants::PARAM_CARD_NO.to_string(), credentials.card_id().to_string()),
                (constants::PARAM_PAGE_NO.to_string(), page.to_string()),
                (constants::PARAM_DETAIL_FLAG.to_string(), "0".to_string()),
            ],
            cookie_header: credentials.cookie_header(),
        }
    }

    #[instrument(skip(self, credentials))]
    pub async fn fetch(
        &self,
        performer: &str,
        credentials: &ProviderCredentials,
        max_pages: u32,
    ) -> FetchOutcome {
        let mut entries = Vec::new();
        let mut pages_fetched = 0;

        if credentials.card_id().is_empty() {
            info!("No card identifier configured, skipping fetch");
            return self.finish(entries, pages_fetched, PageStop::MissingCard);
        }

        for page in 1..=max_pages {
            let request = self.page_request(credentials, page);
            let response = match self.http.get(&request).await {
                Ok(resp) => resp,
                Err(reason) => {
                    warn!(page, "Request failed: {}", reason);
                    return self.finish(entries, pages_fetched, PageStop::Transport { page, reason });
                }
            };
            pages_fetched += 1;
            ::metrics::counter!(crate::metrics::PAGES_FETCHED).increment(1);

            if !response.is_success() {
                let reason = format!("HTTP status {}", response.status);
                warn!(page, "Request failed: {}", reason);
                return self.finish(entries, pages_fetched, PageStop::Transport { page, reason });
            }

            let parsed = match self.parser.parse(&response.bytes) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(page, "Response body could not be parsed: {}", e);
                    let reason = e.to_string();
                    return self.finish(entries, pages_fetched, PageStop::Transport { page, reason });
                }
            };

            if !parsed.is_ok() {
                warn!(page, status = ?parsed.status, "Status not OK, stopping");
                let stop = PageStop::StatusNotOk { page, status: parsed.status };
                return self.finish(entries, pages_fetched, stop);
            }

            if parsed.entries.is_empty() {
                debug!(page, "Empty page, stopping");
                return self.finish(entries, pages_fetched, PageStop::EmptyPage { page });
            }

            debug!(page, count = parsed.entries.len(), "Fetched page");
            entries.extend(parsed.entries);
        }

        self.finish(entries, pages_fetched, PageStop::MaxPages)
    }

    fn finish(&self, entries: Vec<RawEntry>, pages_fetched: u32, stop: PageStop) -> FetchOutcome {
        ::metrics::counter!(crate::metrics::FETCH_STOPS, "reason" => stop.label()).increment(1);
        info!(
            entries = entries.len(),
            pages_fetched,
            stop = stop.label(),
            "Fetch finished"
        );
        FetchOutcome {
            entries,
            pages_fetched,
            stop,
        }
    }
}
