//! Category proxies and the basket-level ratios derived from them.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::Registry;
use crate::ingest::types::Observation;
use crate::snapshot::{round_to, CategorySummary, Freshness, SourceHealth, TopDriver};

/// One summary per registered category.
///
/// Status is `missing` without observations, otherwise `fresh` when any health
/// record of the category is fresh, else `stale`. A category with a primary
/// source is forced to `missing` unless that source is fresh.
pub fn summarize_categories(
    observations: &[Observation],
    health: &[SourceHealth],
    registry: &Registry,
) -> BTreeMap<String, CategorySummary> {
    let mut values: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for o in observations {
        values.entry(o.category.as_str()).or_default().push(o.value);
    }

    // Last record per source wins.
    let by_source: BTreeMap<&str, &SourceHealth> =
        health.iter().map(|h| (h.source.as_str(), h)).collect();

    registry
        .categories
        .iter()
        .map(|(name, spec)| {
            let vals = values.get(name.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            let level = (!vals.is_empty())
                .then(|| round_to(vals.iter().sum::<f64>() / vals.len() as f64, 4));

            let mut status = if vals.is_empty() {
                Freshness::Missing
            } else if health
                .iter()
                .any(|h| h.category == *name && h.status == Freshness::Fresh)
            {
                Freshness::Fresh
            } else {
                Freshness::Stale
            };

            if let Some(primary) = &spec.primary_source {
                let primary_fresh = by_source
                    .get(primary.as_str())
                    .is_some_and(|h| h.status == Freshness::Fresh);
                if !primary_fresh {
                    tracing::debug!(
                        target: "nowcast",
                        category = %name,
                        primary = %primary,
                        "primary source not fresh, category marked missing"
                    );
                    status = Freshness::Missing;
                }
            }

            (
                name.clone(),
                CategorySummary {
                    proxy_level: level,
                    daily_change_pct: None,
                    weight: spec.weight,
                    points: vals.len(),
                    status,
                },
            )
        })
        .collect()
}

/// Percent change versus the most recent historical level, 3 decimals.
pub fn apply_daily_changes(
    categories: &mut BTreeMap<String, CategorySummary>,
    prior_levels: &BTreeMap<String, f64>,
) {
    for (name, c) in categories.iter_mut() {
        c.daily_change_pct = match (c.proxy_level, prior_levels.get(name)) {
            (Some(current), Some(&prior)) if prior != 0.0 => {
                Some(round_to((current / prior - 1.0) * 100.0, 3))
            }
            _ => None,
        };
    }
}

fn weight_share<F>(categories: &BTreeMap<String, CategorySummary>, registry: &Registry, keep: F) -> f64
where
    F: Fn(&CategorySummary) -> bool,
{
    let total = registry.total_weight();
    if total <= 0.0 {
        return 0.0;
    }
    let covered: f64 = categories
        .values()
        .filter(|c| keep(c))
        .map(|c| c.weight)
        .sum();
    round_to((covered / total).clamp(0.0, 1.0), 4)
}

/// Weight share (of total registered weight) backed by fresh or stale levels.
pub fn coverage_ratio(categories: &BTreeMap<String, CategorySummary>, registry: &Registry) -> f64 {
    weight_share(categories, registry, CategorySummary::is_covered)
}

/// Weight share backed by fresh levels only.
pub fn representativeness_ratio(
    categories: &BTreeMap<String, CategorySummary>,
    registry: &Registry,
) -> f64 {
    weight_share(categories, registry, |c| {
        c.status == Freshness::Fresh && c.proxy_level.is_some()
    })
}

/// Distinct sources per category among surviving observations.
pub fn source_diversity(observations: &[Observation]) -> BTreeMap<String, usize> {
    let mut sets: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for o in observations {
        sets.entry(o.category.as_str())
            .or_default()
            .insert(o.source.as_str());
    }
    sets.into_iter()
        .map(|(k, v)| (k.to_string(), v.len()))
        .collect()
}

/// `daily_change_pct × weight`, 4 decimals; null where the change is null.
pub fn contributions(categories: &BTreeMap<String, CategorySummary>) -> BTreeMap<String, Option<f64>> {
    categories
        .iter()
        .map(|(k, c)| (k.clone(), c.daily_change_pct.map(|ch| round_to(ch * c.weight, 4))))
        .collect()
}

/// Largest absolute contribution; ties keep the first category in key order.
pub fn top_driver(contributions: &BTreeMap<String, Option<f64>>) -> TopDriver {
    let mut best: Option<(&str, f64)> = None;
    for (k, v) in contributions {
        let Some(v) = *v else { continue };
        if best.map_or(true, |(_, b)| v.abs() > b.abs()) {
            best = Some((k, v));
        }
    }
    match best {
        Some((k, v)) => TopDriver {
            category: Some(k.to_string()),
            contribution_pct: Some(round_to(v, 4)),
        },
        None => TopDriver::default(),
    }
}

/// Usable categories backed by fewer than two distinct sources.
pub fn single_source_categories(
    categories: &BTreeMap<String, CategorySummary>,
    diversity: &BTreeMap<String, usize>,
) -> Vec<String> {
    categories
        .iter()
        .filter(|(k, c)| c.status.is_usable() && diversity.get(*k).copied().unwrap_or(0) < 2)
        .map(|(k, _)| k.clone())
        .collect()
}
