//! One daily run: gather, assemble, persist.

use anyhow::Result;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};

use crate::config::{build_collectors, Registry, RuntimeConfig};
use crate::engine::{build_snapshot, new_run_id, RunContext, RunInputs};
use crate::ingest::providers::feeds::JsonDirFeed;
use crate::ingest::types::{Collector, ReferenceFeed};
use crate::ingest::collect_all;
use crate::metrics::{record_run, Metrics};
use crate::snapshot::Snapshot;
use crate::writer::{ArtifactStore, WriteReport};

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub snapshot: Snapshot,
    pub report: WriteReport,
}

/// A failed feed degrades to its empty value.
async fn feed_or_default<T: Default>(
    what: &'static str,
    fut: impl std::future::Future<Output = Result<T>>,
) -> T {
    match fut.await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(target: "nowcast", feed = what, error = %format!("{e:#}"), "reference feed unavailable");
            T::default()
        }
    }
}

pub async fn gather_inputs(
    collectors: &[Box<dyn Collector>],
    feed: &dyn ReferenceFeed,
    store: &ArtifactStore,
) -> RunInputs {
    let batch = collect_all(collectors).await;
    RunInputs {
        batch,
        official: feed_or_default("official_summary", feed.official_summary()).await,
        series: feed_or_default("official_series", feed.official_series()).await,
        consensus: feed_or_default("consensus", feed.consensus()).await,
        release_events: feed_or_default("release_events", feed.release_events()).await,
        prior_success: store.load_prior_success().await,
    }
}

/// Run against explicit collectors and feeds, stamped with the current time.
pub async fn execute(
    registry: &Registry,
    collectors: &[Box<dyn Collector>],
    feed: &dyn ReferenceFeed,
    store: &ArtifactStore,
) -> Result<RunOutcome> {
    execute_at(registry, collectors, feed, store, Utc::now()).await
}

/// Same as [`execute`] with an explicit run instant (truncated to seconds).
pub async fn execute_at(
    registry: &Registry,
    collectors: &[Box<dyn Collector>],
    feed: &dyn ReferenceFeed,
    store: &ArtifactStore,
    now: DateTime<Utc>,
) -> Result<RunOutcome> {
    let now = now.duration_trunc(TimeDelta::seconds(1)).unwrap_or(now);
    let ctx = RunContext {
        run_id: new_run_id(),
        now,
        registry,
    };

    let mut history = store.load_historical(&ctx.run_id).await;
    let inputs = gather_inputs(collectors, feed, store).await;
    let snapshot = build_snapshot(&ctx, inputs, &history);
    let report = store.write_outputs(&snapshot, &mut history).await?;
    record_run(&snapshot);

    Ok(RunOutcome { snapshot, report })
}

/// Run with everything resolved from the environment.
pub async fn run_once(cfg: &RuntimeConfig, metrics: Option<&Metrics>) -> Result<RunOutcome> {
    let registry = Registry::load_or_default(&cfg.registry_path);
    let collectors = build_collectors(&cfg.collectors_path)?;
    let feed = JsonDirFeed::new(&cfg.feeds_dir);
    let store = ArtifactStore::new(&cfg.data_dir);

    tracing::info!(
        target: "nowcast",
        collectors = collectors.len(),
        categories = registry.categories.len(),
        data_dir = %cfg.data_dir.display(),
        "run starting"
    );
    let outcome = execute(&registry, &collectors, &feed, &store).await?;

    if let Some(m) = metrics {
        if let Err(e) = store.write_metrics(&m.render()).await {
            tracing::warn!(target: "nowcast", error = %format!("{e:#}"), "metrics not written");
        }
    }
    Ok(outcome)
}
