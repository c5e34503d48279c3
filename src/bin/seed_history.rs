//! Backfill `historical.json` from the official index series.
//!
//! Live (non-seeded) days are left alone unless `NOWCAST_SEED_FORCE=1`.

use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use cpi_nowcast::config::{env_flag, env_parse};
use cpi_nowcast::ingest::providers::feeds::JsonDirFeed;
use cpi_nowcast::ingest::types::ReferenceFeed;
use cpi_nowcast::writer::{ArtifactStore, HISTORICAL_FILE};
use cpi_nowcast::{init_tracing, RuntimeConfig};

const ENV_SEED_DAYS: &str = "NOWCAST_SEED_DAYS";
const ENV_SEED_FORCE: &str = "NOWCAST_SEED_FORCE";
const DEFAULT_SEED_DAYS: u32 = 365;

async fn seed(cfg: &RuntimeConfig) -> Result<()> {
    let days = env_parse(ENV_SEED_DAYS, DEFAULT_SEED_DAYS);
    let force = env_flag(ENV_SEED_FORCE);

    let series = JsonDirFeed::new(&cfg.feeds_dir)
        .official_series()
        .await
        .context("loading official series")?;
    let store = ArtifactStore::new(&cfg.data_dir);
    let mut history = store.load_historical_strict().await?;

    let today = Utc::now().date_naive();
    let report = history.seed_from_series(days, today, &series, force)?;
    store.save_historical(&history).await?;

    tracing::info!(
        target: "nowcast",
        days,
        force,
        written = report.written,
        skipped = report.skipped_non_seeded,
        missing = report.missing_series_days,
        "history seeded"
    );
    println!(
        "Seed complete: wrote={}, skipped_non_seeded={}, missing_series_days={}, output={}",
        report.written,
        report.skipped_non_seeded,
        report.missing_series_days,
        store.path(HISTORICAL_FILE).display()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cfg = RuntimeConfig::from_env();
    init_tracing(cfg.log_json);

    match seed(&cfg).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Seed failed: {e:#}");
            ExitCode::from(2)
        }
    }
}
