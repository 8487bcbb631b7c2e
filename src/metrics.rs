use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if one is already installed.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        describe_metrics();
        Ok(Self { handle })
    }
}

/// Router exposing `/metrics` in the Prometheus exposition format.
pub fn router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || {
            let h = handle.clone();
            async move { h.render() }
        }),
    )
}

/// One-time metric registration (so series show up on /metrics).
pub fn describe_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "storage_lines_written_total",
            "Log lines appended to daily logs."
        );
        describe_counter!(
            "storage_dedup_skipped_total",
            "Records skipped because their payload was in the dedup window."
        );
        describe_counter!("storage_archived_total", "Daily logs compacted into archives.");
        describe_counter!(
            "storage_archive_errors_total",
            "Archive attempts that failed; the source log was kept."
        );
        describe_counter!("storage_purged_total", "Expired archives deleted.");
        describe_counter!(
            "storage_cleanup_errors_total",
            "Expired archives that could not be deleted."
        );
        describe_gauge!(
            "storage_workers_in_flight",
            "Compaction/cleanup jobs currently running."
        );
        describe_gauge!(
            "storage_last_sweep_ts",
            "Unix ts when the last full sweep finished."
        );
        describe_counter!("ingest_items_total", "Items parsed from feeds.");
        describe_counter!("ingest_matched_total", "Items matched to a tracked project.");
        describe_counter!("ingest_feed_errors_total", "Feed fetch/parse errors.");
    });
}
