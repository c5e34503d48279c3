// src/ingest/mod.rs
pub mod providers;
pub mod types;

use crate::config::Registry;
use crate::ingest::types::{Collector, CollectorBatch, Observation, RawSourceHealth};
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use std::collections::{HashMap, HashSet};

/// One-time metrics registration (so series show up in metrics.prom).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "nowcast_observations_raw_total",
            "Observations parsed from collectors."
        );
        describe_counter!(
            "nowcast_observations_deduped_total",
            "Observations removed by (source, item, date) dedup."
        );
        describe_counter!(
            "nowcast_observations_rejected_total",
            "Observations outside their category bounds."
        );
        describe_counter!(
            "nowcast_observations_unroutable_total",
            "Observations for categories missing from the registry."
        );
        describe_counter!(
            "nowcast_collector_errors_total",
            "Collector fetch/parse failures."
        );
        describe_histogram!(
            "nowcast_collector_parse_ms",
            "Collector payload parse time in milliseconds."
        );
    });
}

/// Result of dedup + range validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub observations: Vec<Observation>,
    pub after_dedupe: usize,
    pub rejected: usize,
    pub unroutable: usize,
}

/// Dedup by (source, item id, date). The last occurrence wins; output keeps the
/// position of each key's first occurrence.
pub fn dedupe(raw: Vec<Observation>) -> Vec<Observation> {
    let mut slot: HashMap<(String, String, chrono::NaiveDate), usize> = HashMap::new();
    let mut out: Vec<Observation> = Vec::with_capacity(raw.len());
    for obs in raw {
        let key = obs.key();
        match slot.get(&key) {
            Some(&i) => out[i] = obs,
            None => {
                slot.insert(key, out.len());
                out.push(obs);
            }
        }
    }
    out
}

/// Dedup, then drop values outside the category's bounds (or ≤ 0) and
/// observations for unknown categories. Never fails.
pub fn normalize(raw: Vec<Observation>, registry: &Registry) -> Normalized {
    let deduped = dedupe(raw);
    let after_dedupe = deduped.len();

    let mut rejected = 0usize;
    let mut unroutable = 0usize;
    let mut observations = Vec::with_capacity(after_dedupe);
    for obs in deduped {
        match registry.category(&obs.category) {
            None => unroutable += 1,
            Some(spec) if !obs.value.is_finite() || !spec.accepts(obs.value) => rejected += 1,
            Some(_) => observations.push(obs),
        }
    }

    Normalized {
        observations,
        after_dedupe,
        rejected,
        unroutable,
    }
}

/// Await every collector in configured order. A failed collector turns into a
/// `missing` health record for each source it declares; a declared source the
/// collector did not report on gets one as well.
pub async fn collect_all(collectors: &[Box<dyn Collector>]) -> CollectorBatch {
    ensure_metrics_described();

    let mut all = CollectorBatch::default();
    for c in collectors {
        match c.fetch().await {
            Ok(batch) => {
                let reported: HashSet<&str> =
                    batch.health.iter().map(|h| h.source.as_str()).collect();
                let silent: Vec<RawSourceHealth> = c
                    .sources()
                    .iter()
                    .filter(|d| !reported.contains(d.source.as_str()))
                    .map(|d| RawSourceHealth::missing(d, "Collector returned no health record."))
                    .collect();
                tracing::debug!(
                    target: "nowcast",
                    collector = c.name(),
                    observations = batch.observations.len(),
                    health = batch.health.len(),
                    "collector ok"
                );
                all.observations.extend(batch.observations);
                all.health.extend(batch.health);
                all.health.extend(silent);
            }
            Err(e) => {
                tracing::warn!(target: "nowcast", error = %e, collector = c.name(), "collector error");
                counter!("nowcast_collector_errors_total").increment(1);
                let detail = format!("Collector {} failed: {e}", c.name());
                all.health.extend(
                    c.sources()
                        .iter()
                        .map(|d| RawSourceHealth::missing(d, detail.clone())),
                );
            }
        }
    }
    all
}
