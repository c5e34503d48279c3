//! Day-over-day anomaly filter.
//!
//! Per category, the median of today's surviving values is compared with the
//! most recent historical proxy level. A move above the category's outlier
//! threshold rejects the whole category for this run. No baseline, no check.

use std::collections::BTreeMap;

use crate::config::Registry;
use crate::ingest::types::Observation;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnomalyOutcome {
    pub kept: Vec<Observation>,
    pub anomalies: usize,
    /// Categories dropped wholesale, with the measured move in percent.
    pub flagged: BTreeMap<String, f64>,
}

pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

pub fn filter_anomalies(
    observations: Vec<Observation>,
    baseline: &BTreeMap<String, f64>,
    registry: &Registry,
) -> AnomalyOutcome {
    let mut by_category: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for o in &observations {
        by_category.entry(o.category.as_str()).or_default().push(o.value);
    }

    let mut flagged = BTreeMap::new();
    for (category, values) in by_category.iter_mut() {
        let Some(&prior) = baseline.get(*category) else {
            continue;
        };
        if prior <= 0.0 {
            continue;
        }
        let Some(spec) = registry.category(category) else {
            continue;
        };
        let Some(current) = median(values) else {
            continue;
        };
        let delta_pct = (current / prior - 1.0).abs() * 100.0;
        if delta_pct > spec.outlier_threshold_pct {
            tracing::debug!(
                target: "nowcast",
                category = %category,
                delta_pct,
                threshold = spec.outlier_threshold_pct,
                "category rejected by anomaly filter"
            );
            flagged.insert(category.to_string(), delta_pct);
        }
    }

    let (kept, dropped): (Vec<_>, Vec<_>) = observations
        .into_iter()
        .partition(|o| !flagged.contains_key(&o.category));

    AnomalyOutcome {
        kept,
        anomalies: dropped.len(),
        flagged,
    }
}
