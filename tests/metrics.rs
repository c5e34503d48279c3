// tests/metrics.rs
// Own test binary: the Prometheus recorder is process-global.
mod common;

use chrono::{TimeZone, Utc};
use cpi_nowcast::history::HistoricalStore;
use cpi_nowcast::metrics::{record_run, Metrics};
use cpi_nowcast::writer::{ArtifactStore, METRICS_FILE};
use cpi_nowcast::{build_snapshot, Registry, RunContext};

#[tokio::test]
async fn run_metrics_render_to_textfile() {
    let metrics = Metrics::init().expect("install recorder once per test binary");

    let now = Utc.with_ymd_and_hms(2026, 2, 15, 12, 0, 0).unwrap();
    let reg = Registry::default_seed();
    let ctx = RunContext {
        run_id: "run_feedfacecafe".into(),
        now,
        registry: &reg,
    };
    let mut inputs = common::inputs(now);
    inputs.batch.observations.push(cpi_nowcast::ingest::types::Observation::new(
        "transport",
        "diesel",
        999.0,
        now.date_naive(),
        "statcan_gas_csv",
    ));
    let snapshot = build_snapshot(&ctx, inputs, &HistoricalStore::new());
    record_run(&snapshot);

    let text = metrics.render();
    for needle in [
        "nowcast_runs_total{status=\"published\"} 1",
        "nowcast_coverage_ratio",
        "nowcast_signal_quality_score",
        "nowcast_blocked_conditions",
        "nowcast_observations_rejected_total 1",
        "nowcast_last_run_ts",
    ] {
        assert!(text.contains(needle), "missing {needle} in:\n{text}");
    }

    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    store.write_metrics(&text).await.unwrap();
    let on_disk = std::fs::read_to_string(store.path(METRICS_FILE)).unwrap();
    assert_eq!(on_disk, text);
}
