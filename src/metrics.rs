//! Counter names and the Prometheus exporter hook.
//!
//! Counters are purely observational; no code path reads them back.

use std::net::SocketAddr;

pub const PAGES_FETCHED: &str = "scoreboard_pages_fetched_total";
pub const FETCH_STOPS: &str = "scoreboard_fetch_stops_total";
pub const NORMALIZE_REJECTED: &str = "scoreboard_normalize_rejected_total";
pub const RECORDS_INSERTED: &str = "scoreboard_records_inserted_total";
pub const RECORDS_CONFLICTED: &str = "scoreboard_records_conflicted_total";
pub const STORE_RETRIES: &str = "scoreboard_store_retries_total";
pub const RECORDS_SKIPPED: &str = "scoreboard_records_skipped_total";

pub fn init_metrics(port: u16) {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => {
            tracing::info!(%addr, "Prometheus exporter listening on http://{}/metrics", addr);
        }
        Err(e) => {
            tracing::warn!("Prometheus exporter install failed (possibly already installed): {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::normalize::normalize_batch;
    use crate::types::RawEntry;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn test_counters_reach_prometheus_exporter() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        let raw = vec![RawEntry {
            item_name: "Song".into(),
            attribution_name: String::new(),
            score_text: "not a score".into(),
            timestamp_text: "2024/01/01 20:00:00".into(),
        }];
        let batch = ::metrics::with_local_recorder(&recorder, || normalize_batch("alice", &raw));

        assert_eq!(batch.rejected, 1);
        let rendered = handle.render();
        assert!(
            rendered.contains(NORMALIZE_REJECTED),
            "counter missing from exporter output: {rendered}"
        );
    }
}
