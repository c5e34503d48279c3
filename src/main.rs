//! Daily nowcast run, binary entrypoint.
//! Collects, assembles and gates one snapshot, then writes artifacts under
//! `NOWCAST_DATA_DIR`. Exit code: 0 published, 1 blocked by the gate, 2 on fault.

use std::process::ExitCode;

use cpi_nowcast::metrics::Metrics;
use cpi_nowcast::{init_tracing, run_once, ReleaseStatus, RuntimeConfig};

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional.
    let _ = dotenvy::dotenv();

    let cfg = RuntimeConfig::from_env();
    init_tracing(cfg.log_json);

    let metrics = match Metrics::init() {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(target: "nowcast", error = %format!("{e:#}"), "metrics disabled");
            None
        }
    };

    let outcome = match run_once(&cfg, metrics.as_ref()).await {
        Ok(o) => o,
        Err(e) => {
            tracing::error!(target: "nowcast", error = %format!("{e:#}"), "run failed");
            eprintln!("Run failed: {e:#}");
            return ExitCode::from(2);
        }
    };

    let s = &outcome.snapshot;
    let ok_sources = s
        .source_health
        .iter()
        .filter(|h| h.status.is_usable())
        .count();
    println!("Run status: {}", s.release.status);
    println!(
        "confidence={} coverage={:.2} score={} sources_ok={}/{} snapshot={}",
        s.headline.confidence.as_str(),
        s.headline.coverage_ratio,
        s.headline.signal_quality_score,
        ok_sources,
        s.source_health.len(),
        outcome.report.run_path.display()
    );

    if s.release.status == ReleaseStatus::Published {
        return ExitCode::SUCCESS;
    }
    for reason in &s.release.blocked_conditions {
        println!("- {reason}");
    }
    ExitCode::from(1)
}
