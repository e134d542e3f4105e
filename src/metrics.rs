use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Installs the global Prometheus recorder.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("auto_events_created_total", "Auto events created from posts.");
        describe_counter!(
            "auto_events_skipped_total",
            "Posts skipped, labelled by reason (exists, no_keyword, no_time)."
        );
        describe_counter!(
            "auto_events_fetch_errors_total",
            "Account post fetches that failed."
        );
        describe_counter!(
            "keyword_cache_refresh_failures_total",
            "Failed keyword refresh attempts."
        );
        describe_gauge!(
            "auto_events_last_run_ts",
            "Unix ts when the auto event pipeline last finished."
        );
        describe_histogram!("post_source_fetch_ms", "Post source fetch time in milliseconds.");
    });
}
