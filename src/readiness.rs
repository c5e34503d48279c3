//! Launch-readiness check over the latest snapshot and history.

use crate::config::{env_flag, env_parse};
use crate::history::HistoricalStore;
use crate::snapshot::{round_to, ReleaseStatus, Snapshot};

pub const ENV_MIN_COVERAGE: &str = "NOWCAST_MIN_COVERAGE";
pub const ENV_MIN_LIVE_DAYS: &str = "NOWCAST_MIN_LIVE_DAYS";
pub const ENV_STRICT_OFFICIAL_PARITY: &str = "NOWCAST_STRICT_OFFICIAL_PARITY";

#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessPolicy {
    pub min_coverage: f64,
    pub min_live_days: usize,
    pub strict_official_parity: bool,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            min_coverage: 0.80,
            min_live_days: 30,
            strict_official_parity: false,
        }
    }
}

impl ReadinessPolicy {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            min_coverage: env_parse(ENV_MIN_COVERAGE, d.min_coverage),
            min_live_days: env_parse(ENV_MIN_LIVE_DAYS, d.min_live_days),
            strict_official_parity: env_flag(ENV_STRICT_OFFICIAL_PARITY),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessReport {
    pub status: ReleaseStatus,
    pub blocked_conditions: Vec<String>,
    pub live_days: usize,
    pub failures: Vec<String>,
}

impl ReadinessReport {
    /// Ready only when published and nothing failed.
    pub fn is_ready(&self) -> bool {
        self.status == ReleaseStatus::Published && self.failures.is_empty()
    }
}

pub fn check(latest: &Snapshot, history: &HistoricalStore, policy: &ReadinessPolicy) -> ReadinessReport {
    let mut failures = Vec::new();

    if latest.release.status != ReleaseStatus::Published {
        failures.push(format!(
            "Latest release is not published: status={}",
            latest.release.status
        ));
    }

    let coverage = latest.headline.coverage_ratio;
    if coverage < policy.min_coverage {
        failures.push(format!(
            "Coverage below threshold: {coverage} < {}",
            policy.min_coverage
        ));
    }

    let live_days = history.live_days();
    if live_days < policy.min_live_days {
        failures.push(format!(
            "Live nowcast history too short: {live_days} < {} days",
            policy.min_live_days
        ));
    }

    if latest.headline.consensus_yoy.is_some() {
        let c = &latest.meta.consensus;
        let trusted = matches!(c.confidence.as_str(), "medium" | "high");
        if !trusted || c.source_count < 2 {
            failures.push(
                "Consensus present but below quality threshold (confidence/source_count)."
                    .to_string(),
            );
        }
    }

    if policy.strict_official_parity {
        let official = &latest.official_cpi;
        let expected = official.yoy_pct.map(|v| round_to(v, 1));
        let matches = matches!((expected, official.yoy_display_pct), (Some(e), Some(d)) if e == d);
        if !matches {
            failures.push(format!(
                "Official CPI display parity failed: yoy_pct={:?}, yoy_display_pct={:?}, expected={:?}",
                official.yoy_pct, official.yoy_display_pct, expected
            ));
        }
    }

    ReadinessReport {
        status: latest.release.status,
        blocked_conditions: latest.release.blocked_conditions.clone(),
        live_days,
        failures,
    }
}
