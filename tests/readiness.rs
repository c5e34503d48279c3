// tests/readiness.rs
mod common;

use chrono::{NaiveDate, TimeZone, Utc};
use cpi_nowcast::history::HistoricalStore;
use cpi_nowcast::readiness::{check, ReadinessPolicy, ENV_MIN_LIVE_DAYS, ENV_STRICT_OFFICIAL_PARITY};
use cpi_nowcast::{build_snapshot, Registry, RunContext, Snapshot};
use serial_test::serial;

fn published_at(day: u32) -> Snapshot {
    let now = Utc.with_ymd_and_hms(2026, 1, day, 12, 0, 0).unwrap();
    let reg = Registry::default_seed();
    let ctx = RunContext {
        run_id: format!("run_{day:012}"),
        now,
        registry: &reg,
    };
    build_snapshot(&ctx, common::inputs(now), &HistoricalStore::new())
}

fn history_of(days: u32) -> HistoricalStore {
    let mut h = HistoricalStore::new();
    for d in 1..=days {
        h.record_published(&published_at(d)).unwrap();
    }
    h
}

#[test]
fn short_live_history_fails_the_launch_gate() {
    let latest = published_at(20);
    let policy = ReadinessPolicy {
        min_coverage: 0.5,
        ..ReadinessPolicy::default()
    };
    let report = check(&latest, &history_of(3), &policy);
    assert!(!report.is_ready());
    assert_eq!(report.live_days, 3);
    assert_eq!(
        report.failures,
        vec!["Live nowcast history too short: 3 < 30 days".to_string()]
    );
}

#[test]
fn seeded_days_do_not_count_as_live() {
    let mut history = history_of(2);
    let report = history
        .seed_from_series(40, NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(), &common::series(), false)
        .unwrap();
    assert_eq!(report.skipped_non_seeded, 2);
    assert_eq!(history.len(), 40);
    assert_eq!(history.live_days(), 2);
}

#[test]
fn enough_history_and_coverage_is_ready() {
    let latest = published_at(31);
    let policy = ReadinessPolicy {
        min_coverage: 0.5,
        min_live_days: 5,
        strict_official_parity: true,
    };
    let report = check(&latest, &history_of(5), &policy);
    assert!(report.is_ready(), "{:?}", report.failures);
}

#[test]
fn low_coverage_and_unpublished_are_reported() {
    let mut latest = published_at(10);
    latest.headline.coverage_ratio = 0.42;
    latest.release.status = cpi_nowcast::ReleaseStatus::FailedGate;
    let policy = ReadinessPolicy {
        min_live_days: 0,
        ..ReadinessPolicy::default()
    };
    let report = check(&latest, &HistoricalStore::new(), &policy);
    assert!(!report.is_ready());
    assert!(report
        .failures
        .contains(&"Latest release is not published: status=failed_gate".to_string()));
    assert!(report
        .failures
        .contains(&"Coverage below threshold: 0.42 < 0.8".to_string()));
}

#[test]
fn weak_consensus_fails_when_present() {
    let mut latest = published_at(10);
    latest.headline.consensus_yoy = Some(2.5);
    latest.meta.consensus.confidence = "low".into();
    latest.meta.consensus.source_count = 1;
    let policy = ReadinessPolicy {
        min_coverage: 0.0,
        min_live_days: 0,
        strict_official_parity: false,
    };
    let report = check(&latest, &HistoricalStore::new(), &policy);
    assert_eq!(
        report.failures,
        vec!["Consensus present but below quality threshold (confidence/source_count).".to_string()]
    );
}

#[test]
fn strict_parity_checks_display_rounding() {
    let mut latest = published_at(10);
    latest.official_cpi.yoy_display_pct = Some(2.4);
    let policy = ReadinessPolicy {
        min_coverage: 0.0,
        min_live_days: 0,
        strict_official_parity: true,
    };
    let report = check(&latest, &HistoricalStore::new(), &policy);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].starts_with("Official CPI display parity failed"));
}

#[serial]
#[test]
fn policy_reads_env() {
    std::env::set_var(ENV_MIN_LIVE_DAYS, "7");
    std::env::set_var(ENV_STRICT_OFFICIAL_PARITY, "1");
    let p = ReadinessPolicy::from_env();
    assert_eq!(p.min_live_days, 7);
    assert!(p.strict_official_parity);
    assert_eq!(p.min_coverage, 0.80);
    std::env::remove_var(ENV_MIN_LIVE_DAYS);
    std::env::remove_var(ENV_STRICT_OFFICIAL_PARITY);
}
