//! Typed output of one nowcast run.
//!
//! The snapshot is assembled once by the engine, checked by the release gate,
//! then handed to the writer. Shapes here are the persisted JSON contract read by
//! the reporting façade, so field names are stable.

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::config::Registry;
use crate::consensus::GuardrailDiagnostics;
use crate::ingest::types::{OfficialSummary, ReleaseEventsPayload};
use crate::projection::YoyDiagnostics;
use crate::release_events::NextRelease;

/// Freshness of a source or category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Stale,
    Missing,
}

impl Freshness {
    /// Fresh or stale data can back a category.
    pub fn is_usable(self) -> bool {
        matches!(self, Freshness::Fresh | Freshness::Stale)
    }
}

/// Qualitative confidence, ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }

    /// One step down; `Low` stays `Low`.
    pub fn downgrade(self) -> Self {
        match self {
            Confidence::High => Confidence::Medium,
            Confidence::Medium | Confidence::Low => Confidence::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSignal {
    Up,
    Down,
    Flat,
    InsufficientData,
}

/// Release lifecycle: `started → completed → {published | failed_gate}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    Started,
    Completed,
    Published,
    FailedGate,
}

impl ReleaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReleaseStatus::Started => "started",
            ReleaseStatus::Completed => "completed",
            ReleaseStatus::Published => "published",
            ReleaseStatus::FailedGate => "failed_gate",
        }
    }

    pub fn can_advance_to(self, next: ReleaseStatus) -> bool {
        matches!(
            (self, next),
            (ReleaseStatus::Started, ReleaseStatus::Completed)
                | (ReleaseStatus::Completed, ReleaseStatus::Published)
                | (ReleaseStatus::Completed, ReleaseStatus::FailedGate)
        )
    }
}

impl std::fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source health after central reclassification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source: String,
    pub category: String,
    pub tier: u8,
    pub status: Freshness,
    pub last_success_timestamp: Option<String>,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_observation_period: Option<String>,
    pub age_days: Option<i64>,
    pub run_age_hours: Option<f64>,
    pub updated_days_ago: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub proxy_level: Option<f64>,
    pub daily_change_pct: Option<f64>,
    pub weight: f64,
    pub points: usize,
    pub status: Freshness,
}

impl CategorySummary {
    /// Counts toward coverage: usable status and a level.
    pub fn is_covered(&self) -> bool {
        self.status.is_usable() && self.proxy_level.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    pub nowcast_mom_pct: Option<f64>,
    pub nowcast_yoy_pct: Option<f64>,
    pub confidence: Confidence,
    pub coverage_ratio: f64,
    pub signal_quality_score: u8,
    pub lead_signal: LeadSignal,
    pub next_release_at_utc: Option<String>,
    pub consensus_yoy: Option<f64>,
    /// Deprecated alias of `deviation_yoy_pct`; only set through
    /// [`Headline::fill_legacy_aliases`].
    pub consensus_spread_yoy: Option<f64>,
    pub deviation_yoy_pct: Option<f64>,
    pub method_label: String,
}

impl Headline {
    /// The one place deprecated duplicate fields are derived.
    pub fn fill_legacy_aliases(&mut self) {
        self.consensus_spread_yoy = self.deviation_yoy_pct;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopDriver {
    pub category: Option<String>,
    pub contribution_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fallbacks {
    pub nowcast_from_official_mom: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectionMeta {
    pub nowcast_yoy_prorated: YoyDiagnostics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusDetail {
    pub headline_yoy: Option<f64>,
    pub headline_mom: Option<f64>,
    pub source_count: u32,
    pub confidence: String,
    pub as_of: Option<String>,
    pub source_urls: Vec<Option<String>>,
    pub sources: Vec<Value>,
    pub errors: Vec<Value>,
    pub guardrails: GuardrailDiagnostics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub method_version: String,
    pub total_raw_points: usize,
    pub total_points_after_dedupe: usize,
    pub total_points_after_quality_filters: usize,
    pub anomaly_points: usize,
    pub rejected_points: usize,
    pub unroutable_points: usize,
    pub representativeness_ratio: f64,
    pub source_diversity_by_category: BTreeMap<String, usize>,
    pub category_contributions: BTreeMap<String, Option<f64>>,
    pub top_driver: TopDriver,
    pub release_intelligence: Option<NextRelease>,
    pub release_events: ReleaseEventsPayload,
    pub fallbacks: Fallbacks,
    pub projection: ProjectionMeta,
    pub consensus: ConsensusDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseBlock {
    pub run_id: String,
    pub status: ReleaseStatus,
    pub lifecycle_states: Vec<ReleaseStatus>,
    pub blocked_conditions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl ReleaseBlock {
    pub fn started(run_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.into(),
            status: ReleaseStatus::Started,
            lifecycle_states: vec![ReleaseStatus::Started],
            blocked_conditions: Vec::new(),
            created_at,
            published_at: None,
        }
    }

    /// Move forward one state. Returns `false` (and changes nothing) for any
    /// transition outside the lifecycle.
    pub fn advance(&mut self, next: ReleaseStatus) -> bool {
        if !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        self.lifecycle_states.push(next);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub as_of_date: NaiveDate,
    pub timestamp: DateTime<Utc>,
    pub headline: Headline,
    pub categories: BTreeMap<String, CategorySummary>,
    pub official_cpi: OfficialSummary,
    pub source_health: Vec<SourceHealth>,
    pub notes: Vec<String>,
    pub meta: Meta,
    pub release: ReleaseBlock,
}

static MONTH_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-(0[1-9]|1[0-2])$").expect("month key regex"));

impl Snapshot {
    /// Structural checks the type system cannot express. Empty means valid.
    pub fn validation_errors(&self, registry: &Registry) -> Vec<String> {
        let mut errors = Vec::new();

        if self.as_of_date != self.timestamp.date_naive() {
            errors.push(format!(
                "as_of_date {} does not match timestamp {}",
                self.as_of_date, self.timestamp
            ));
        }

        for name in registry.categories.keys() {
            if !self.categories.contains_key(name) {
                errors.push(format!("categories.{name}: missing summary"));
            }
        }
        for (name, c) in &self.categories {
            if registry.category(name).is_none() {
                errors.push(format!("categories.{name}: not a registered category"));
            }
            if !c.weight.is_finite() || !(0.0..=1.0).contains(&c.weight) {
                errors.push(format!("categories.{name}.weight out of range: {}", c.weight));
            }
            if c.proxy_level.is_some_and(|v| !v.is_finite()) {
                errors.push(format!("categories.{name}.proxy_level is not finite"));
            }
            if c.proxy_level.is_none() && c.points > 0 {
                errors.push(format!("categories.{name}: points without proxy_level"));
            }
        }

        let h = &self.headline;
        if !h.coverage_ratio.is_finite() || !(0.0..=1.0).contains(&h.coverage_ratio) {
            errors.push(format!("headline.coverage_ratio out of range: {}", h.coverage_ratio));
        }
        if h.signal_quality_score > 100 {
            errors.push(format!(
                "headline.signal_quality_score out of range: {}",
                h.signal_quality_score
            ));
        }
        for (field, v) in [
            ("nowcast_mom_pct", h.nowcast_mom_pct),
            ("nowcast_yoy_pct", h.nowcast_yoy_pct),
            ("consensus_yoy", h.consensus_yoy),
            ("deviation_yoy_pct", h.deviation_yoy_pct),
        ] {
            if v.is_some_and(|x| !x.is_finite()) {
                errors.push(format!("headline.{field} is not finite"));
            }
        }
        if h.method_label.trim().is_empty() {
            errors.push("headline.method_label is empty".to_string());
        }

        if let Some(month) = &self.official_cpi.latest_release_month {
            if !MONTH_KEY.is_match(month) {
                errors.push(format!(
                    "official_cpi.latest_release_month is not YYYY-MM: {month}"
                ));
            }
        }

        for s in &self.source_health {
            if s.source.trim().is_empty() {
                errors.push("source_health: empty source name".to_string());
            }
            if !(1..=2).contains(&s.tier) {
                errors.push(format!("source_health.{}: tier must be 1 or 2", s.source));
            }
            if s.status != Freshness::Missing && s.age_days.is_none() {
                errors.push(format!(
                    "source_health.{}: {:?} without a resolvable timestamp",
                    s.source, s.status
                ));
            }
        }

        let r = &self.release;
        if r.run_id.trim().is_empty() {
            errors.push("release.run_id is empty".to_string());
        }
        if r.lifecycle_states.last() != Some(&r.status) {
            errors.push("release.status does not match lifecycle_states".to_string());
        }
        let ordered = r.lifecycle_states.first() == Some(&ReleaseStatus::Started)
            && r
                .lifecycle_states
                .windows(2)
                .all(|w| w[0].can_advance_to(w[1]));
        if !ordered {
            errors.push("release.lifecycle_states out of order".to_string());
        }
        if r.published_at.is_some() && r.status != ReleaseStatus::Published {
            errors.push("release.published_at set on an unpublished run".to_string());
        }

        errors
    }
}

/// Round half away from zero to `places` decimals.
pub(crate) fn round_to(x: f64, places: i32) -> f64 {
    let f = 10f64.powi(places);
    (x * f).round() / f
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_orders_and_downgrades_one_step() {
        assert!(Confidence::Low < Confidence::Medium && Confidence::Medium < Confidence::High);
        assert_eq!(Confidence::High.downgrade(), Confidence::Medium);
        assert_eq!(Confidence::Medium.downgrade(), Confidence::Low);
        assert_eq!(Confidence::Low.downgrade(), Confidence::Low);
    }

    #[test]
    fn lifecycle_only_moves_forward() {
        let now = Utc::now();
        let mut r = ReleaseBlock::started("run_abc", now);
        assert!(!r.advance(ReleaseStatus::Published));
        assert!(r.advance(ReleaseStatus::Completed));
        assert!(r.advance(ReleaseStatus::FailedGate));
        assert!(!r.advance(ReleaseStatus::Published));
        assert_eq!(
            r.lifecycle_states,
            vec![
                ReleaseStatus::Started,
                ReleaseStatus::Completed,
                ReleaseStatus::FailedGate
            ]
        );
    }

    #[test]
    fn enums_serialize_as_contract_strings() {
        assert_eq!(serde_json::to_value(Freshness::Stale).unwrap(), "stale");
        assert_eq!(serde_json::to_value(Confidence::High).unwrap(), "high");
        assert_eq!(
            serde_json::to_value(ReleaseStatus::FailedGate).unwrap(),
            "failed_gate"
        );
        assert_eq!(
            serde_json::to_value(LeadSignal::InsufficientData).unwrap(),
            "insufficient_data"
        );
    }

    #[test]
    fn month_key_pattern() {
        assert!(MONTH_KEY.is_match("2025-12"));
        assert!(!MONTH_KEY.is_match("2025-13"));
        assert!(!MONTH_KEY.is_match("Dec 2025"));
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(2.34567, 3), 2.346);
        assert_eq!(round_to(-0.00049, 3), -0.0);
    }
}
