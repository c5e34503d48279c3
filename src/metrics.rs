use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::snapshot::Snapshot;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Once per process.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_counter!("nowcast_runs_total", "Runs by terminal release status.");
        describe_counter!(
            "nowcast_observations_anomalous_total",
            "Observations dropped by the day-over-day anomaly filter."
        );
        describe_gauge!("nowcast_coverage_ratio", "Coverage ratio of the last run.");
        describe_gauge!(
            "nowcast_signal_quality_score",
            "Signal-quality score of the last run."
        );
        describe_gauge!(
            "nowcast_blocked_conditions",
            "Blocking conditions of the last run."
        );
        describe_gauge!("nowcast_last_run_ts", "Unix ts when the last run finished.");

        Ok(Self { handle })
    }

    /// Prometheus exposition text, written to `metrics.prom` after a run.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Per-run gauges and counters. Safe to call without a recorder.
pub fn record_run(snapshot: &Snapshot) {
    let meta = &snapshot.meta;
    counter!("nowcast_observations_deduped_total").increment(
        meta.total_raw_points
            .saturating_sub(meta.total_points_after_dedupe) as u64,
    );
    counter!("nowcast_observations_rejected_total").increment(meta.rejected_points as u64);
    counter!("nowcast_observations_anomalous_total").increment(meta.anomaly_points as u64);
    counter!("nowcast_observations_unroutable_total").increment(meta.unroutable_points as u64);

    let status = snapshot.release.status.as_str();
    counter!("nowcast_runs_total", "status" => status).increment(1);
    gauge!("nowcast_coverage_ratio").set(snapshot.headline.coverage_ratio);
    gauge!("nowcast_signal_quality_score").set(f64::from(snapshot.headline.signal_quality_score));
    gauge!("nowcast_blocked_conditions").set(snapshot.release.blocked_conditions.len() as f64);
    gauge!("nowcast_last_run_ts").set(snapshot.timestamp.timestamp() as f64);
}
