//! Central reclassification of collector health records.
//!
//! A collector's self-reported status is ignored. Status is derived from the
//! last successful timestamp (falling back to the last known good timestamp from
//! prior snapshots) and the per-source SLA table:
//!
//!   no timestamp → missing, age ≤ SLA → fresh, otherwise stale.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::BTreeMap;

use crate::config::Registry;
use crate::ingest::types::RawSourceHealth;
use crate::snapshot::{round_to, Freshness, SourceHealth};

const PRIOR_RUN_NOTE: &str = "Using last successful timestamp from prior run.";

/// Last successful timestamp per source, taken from previous snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriorSuccess {
    by_source: BTreeMap<String, String>,
}

impl PriorSuccess {
    /// Merge `(source, timestamp)` rows in priority order: the first snapshot
    /// that mentions a source wins (published-latest before latest).
    pub fn from_ordered<I, R>(snapshots: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (String, Option<String>)>,
    {
        let mut by_source = BTreeMap::new();
        for rows in snapshots {
            for (source, ts) in rows {
                if let Some(ts) = ts.filter(|t| !t.is_empty()) {
                    by_source.entry(source).or_insert(ts);
                }
            }
        }
        Self { by_source }
    }

    pub fn get(&self, source: &str) -> Option<&str> {
        self.by_source.get(source).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }
}

/// Lenient ISO-8601 parsing: RFC 3339 with offset or `Z`, naive date-time
/// (taken as UTC), or a bare date (midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(v, fmt) {
            return Some(ndt.and_utc());
        }
    }
    NaiveDate::parse_from_str(v, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

/// Whole UTC calendar days between the timestamp and `now`, never negative.
pub fn age_days(ts: &str, now: DateTime<Utc>) -> Option<i64> {
    let stamp = parse_timestamp(ts)?;
    Some((now.date_naive() - stamp.date_naive()).num_days().max(0))
}

/// Fractional hours (2 decimals), never negative.
pub fn age_hours(ts: &str, now: DateTime<Utc>) -> Option<f64> {
    let stamp = parse_timestamp(ts)?;
    let secs = (now - stamp).num_seconds().max(0) as f64;
    Some(round_to(secs / 3600.0, 2))
}

pub fn human_age(age_days: Option<i64>) -> String {
    match age_days {
        None => "unknown".to_string(),
        Some(0) => "updated today".to_string(),
        Some(1) => "updated 1 day ago".to_string(),
        Some(n) => format!("updated {n} days ago"),
    }
}

/// Status from age and SLA. A source without an SLA entry is never fresh.
pub fn classify(age_days: Option<i64>, sla_days: Option<i64>) -> Freshness {
    match (age_days, sla_days) {
        (None, _) => Freshness::Missing,
        (Some(age), Some(sla)) if age <= sla => Freshness::Fresh,
        (Some(_), _) => Freshness::Stale,
    }
}

pub fn classify_sources(
    raw: &[RawSourceHealth],
    prior: &PriorSuccess,
    registry: &Registry,
    now: DateTime<Utc>,
) -> Vec<SourceHealth> {
    raw.iter()
        .map(|entry| classify_one(entry, prior, registry, now))
        .collect()
}

fn classify_one(
    entry: &RawSourceHealth,
    prior: &PriorSuccess,
    registry: &Registry,
    now: DateTime<Utc>,
) -> SourceHealth {
    let mut detail = entry.detail.clone();
    let mut ts = entry
        .last_success_timestamp
        .clone()
        .filter(|t| !t.trim().is_empty());

    if ts.is_none() {
        if let Some(prev) = prior.get(&entry.source) {
            ts = Some(prev.to_string());
            detail = format!("{detail} {PRIOR_RUN_NOTE}").trim().to_string();
        }
    }

    let age = ts.as_deref().and_then(|t| age_days(t, now));
    let hours = ts.as_deref().and_then(|t| age_hours(t, now));
    let status = classify(age, registry.sla_days(&entry.source));

    if entry.status.is_some_and(|reported| reported != status) {
        tracing::debug!(
            target: "nowcast",
            source = %entry.source,
            reported = ?entry.status,
            derived = ?status,
            "collector status overridden"
        );
    }

    SourceHealth {
        source: entry.source.clone(),
        category: entry.category.clone(),
        tier: entry.tier,
        status,
        last_success_timestamp: ts,
        detail,
        source_run_id: entry.source_run_id.clone(),
        last_observation_period: entry.last_observation_period.clone(),
        age_days: age,
        run_age_hours: hours,
        updated_days_ago: human_age(age),
    }
}
