//! # Release Gate
//! Pure evaluation of the publication preconditions on an assembled snapshot.
//!
//! - Gate A: tier-1 weekly food source present, not missing, age ≤ limit.
//! - Gate B: required monthly sources not missing; one usable energy source.
//! - Gate C: structural validation of the snapshot.
//! - Gate D: core categories reach their minimum point count.
//! - Gate E: official baseline names its latest release month.
//!
//! Every failing condition is collected; none short-circuits the others.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::config::Registry;
use crate::snapshot::{Freshness, ReleaseStatus, Snapshot, SourceHealth};

fn by_source(health: &[SourceHealth]) -> BTreeMap<&str, &SourceHealth> {
    health.iter().map(|h| (h.source.as_str(), h)).collect()
}

/// Gates A, B, D, E in that order.
pub fn evaluate(snapshot: &Snapshot, registry: &Registry) -> Vec<String> {
    let policy = &registry.gate;
    let sources = by_source(&snapshot.source_health);
    let mut blocked = Vec::new();

    let food_ok = sources
        .get(policy.weekly_food_source.as_str())
        .is_some_and(|h| {
            h.status != Freshness::Missing
                && h.age_days
                    .is_some_and(|age| age <= policy.weekly_food_max_age_days)
        });
    if !food_ok {
        blocked.push(format!(
            "Gate A failed: APIFY missing or older than {} days.",
            policy.weekly_food_max_age_days
        ));
    }

    for required in &policy.required_monthly_sources {
        let present = sources
            .get(required.as_str())
            .is_some_and(|h| h.status != Freshness::Missing);
        if !present {
            blocked.push(format!("Gate B failed: required source {required} is missing."));
        }
    }

    let energy_ok = policy.energy_sources.iter().any(|s| {
        sources
            .get(s.as_str())
            .is_some_and(|h| h.status.is_usable())
    });
    if !energy_ok {
        blocked.push("Gate B failed: no usable energy source.".to_string());
    }

    for category in &policy.core_categories {
        let min_points = registry.category(category).map_or(1, |c| c.min_points);
        let points = snapshot.categories.get(category).map_or(0, |c| c.points);
        if points < min_points {
            blocked.push(format!(
                "Gate D failed: category {category} has fewer than {min_points} points."
            ));
        }
    }

    let has_month = snapshot
        .official_cpi
        .latest_release_month
        .as_deref()
        .is_some_and(|m| !m.trim().is_empty());
    if !has_month {
        blocked.push(
            "Gate E failed: official CPI metadata missing latest release month.".to_string(),
        );
    }

    blocked
}

/// Gate C: validation failures as blocking strings.
pub fn validate(snapshot: &Snapshot, registry: &Registry) -> Vec<String> {
    snapshot
        .validation_errors(registry)
        .into_iter()
        .map(|e| format!("Gate C failed: snapshot schema validation error: {e}"))
        .collect()
}

/// Drive the release block through `completed` to its terminal state and
/// return the blocking conditions.
pub fn finalize(snapshot: &mut Snapshot, registry: &Registry, now: DateTime<Utc>) -> Vec<String> {
    snapshot.release.advance(ReleaseStatus::Completed);

    let mut blocked = evaluate(snapshot, registry);
    blocked.extend(validate(snapshot, registry));

    let terminal = if blocked.is_empty() {
        ReleaseStatus::Published
    } else {
        ReleaseStatus::FailedGate
    };
    snapshot.release.advance(terminal);
    snapshot.release.blocked_conditions = blocked.clone();
    snapshot.release.published_at = (terminal == ReleaseStatus::Published).then_some(now);

    tracing::info!(
        target: "nowcast",
        run_id = %snapshot.release.run_id,
        status = %snapshot.release.status,
        blocked = blocked.len(),
        "release gate evaluated"
    );
    blocked
}
