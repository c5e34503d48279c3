//! Launch-readiness check over the data directory.
//! Exit code: 0 ready, 1 not ready, 2 when artifacts cannot be read.

use std::process::ExitCode;

use anyhow::{anyhow, Result};
use cpi_nowcast::readiness::{check, ReadinessPolicy, ReadinessReport};
use cpi_nowcast::writer::{ArtifactStore, LATEST_FILE};
use cpi_nowcast::{init_tracing, RuntimeConfig};

async fn load_and_check(cfg: &RuntimeConfig) -> Result<ReadinessReport> {
    let store = ArtifactStore::new(&cfg.data_dir);
    let latest = store
        .load_latest()
        .await?
        .ok_or_else(|| anyhow!("{} not found", store.path(LATEST_FILE).display()))?;
    let history = store.load_historical_strict().await?;
    Ok(check(&latest, &history, &ReadinessPolicy::from_env()))
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cfg = RuntimeConfig::from_env();
    init_tracing(cfg.log_json);

    let report = match load_and_check(&cfg).await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Readiness check failed: {e:#}");
            return ExitCode::from(2);
        }
    };

    println!("Latest release status: {}", report.status);
    if !report.blocked_conditions.is_empty() {
        println!("Blocked conditions:");
        for c in &report.blocked_conditions {
            println!("- {c}");
        }
    }
    println!("Live history days: {}", report.live_days);

    if report.is_ready() {
        println!("Launch gate: ready");
        return ExitCode::SUCCESS;
    }
    println!("Launch gate failures:");
    for f in &report.failures {
        println!("- {f}");
    }
    ExitCode::from(1)
}
