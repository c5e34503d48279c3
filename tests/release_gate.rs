// tests/release_gate.rs
mod common;

use chrono::{DateTime, Duration, TimeZone, Utc};
use cpi_nowcast::history::HistoricalStore;
use cpi_nowcast::{build_snapshot, Registry, ReleaseStatus, RunContext, RunInputs, Snapshot};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 15, 12, 0, 0).unwrap()
}

fn run(registry: &Registry, inputs: RunInputs) -> Snapshot {
    let ctx = RunContext {
        run_id: "run_0123456789ab".into(),
        now: now(),
        registry,
    };
    build_snapshot(&ctx, inputs, &HistoricalStore::new())
}

fn with_food_age(days: i64) -> RunInputs {
    let mut inputs = common::inputs(now());
    let food = inputs
        .batch
        .health
        .iter_mut()
        .find(|h| h.source == "apify_loblaws")
        .unwrap();
    food.last_success_timestamp = Some((now() - Duration::days(days)).to_rfc3339());
    inputs
}

fn gate_a(s: &Snapshot) -> bool {
    s.release.blocked_conditions.iter().any(|c| c.starts_with("Gate A"))
}

#[test]
fn clean_inputs_publish() {
    let reg = Registry::default_seed();
    let s = run(&reg, common::inputs(now()));
    assert!(s.release.blocked_conditions.is_empty(), "{:?}", s.release.blocked_conditions);
    assert_eq!(s.release.status, ReleaseStatus::Published);
    assert_eq!(s.release.published_at, Some(now()));
    assert_eq!(
        s.release.lifecycle_states,
        vec![ReleaseStatus::Started, ReleaseStatus::Completed, ReleaseStatus::Published]
    );
    assert_eq!(s.official_cpi.yoy_display_pct, Some(2.3));
}

#[test]
fn weekly_food_source_older_than_limit_blocks() {
    let reg = Registry::default_seed();

    let stale = run(&reg, with_food_age(20));
    assert!(gate_a(&stale));
    assert_eq!(stale.release.status, ReleaseStatus::FailedGate);
    assert!(stale.release.published_at.is_none());
    assert!(stale
        .release
        .blocked_conditions
        .contains(&"Gate A failed: APIFY missing or older than 14 days.".to_string()));

    let recent = run(&reg, with_food_age(10));
    assert!(!gate_a(&recent));
}

#[test]
fn core_category_below_min_points_blocks() {
    let reg = Registry::default_seed();
    let housing_msg = "Gate D failed: category housing has fewer than 2 points.".to_string();

    let mut one_point = common::inputs(now());
    let idx = one_point
        .batch
        .observations
        .iter()
        .position(|o| o.item_id == "owned_index")
        .unwrap();
    one_point.batch.observations.remove(idx);
    let blocked = run(&reg, one_point);
    assert!(blocked.release.blocked_conditions.contains(&housing_msg));

    let ok = run(&reg, common::inputs(now()));
    assert!(!ok.release.blocked_conditions.contains(&housing_msg));
}

#[test]
fn missing_monthly_source_and_energy_block() {
    let reg = Registry::default_seed();
    let mut inputs = common::inputs(now());
    inputs
        .batch
        .health
        .retain(|h| h.source != "statcan_gas_csv" && h.source != "oeb_scrape");

    let s = run(&reg, inputs);
    let blocked = &s.release.blocked_conditions;
    assert!(blocked.contains(&"Gate B failed: required source statcan_gas_csv is missing.".to_string()));
    assert!(blocked.contains(&"Gate B failed: no usable energy source.".to_string()));
    assert_eq!(s.release.status, ReleaseStatus::FailedGate);
}

#[test]
fn official_baseline_without_release_month_blocks() {
    let reg = Registry::default_seed();
    let mut inputs = common::inputs(now());
    inputs.official.latest_release_month = None;

    let s = run(&reg, inputs);
    assert!(s.release.blocked_conditions.contains(
        &"Gate E failed: official CPI metadata missing latest release month.".to_string()
    ));
    assert!(s.notes.iter().any(|n| n.contains("Gate E failed")));
}

#[test]
fn every_failure_is_reported() {
    let reg = Registry::default_seed();
    let mut inputs = with_food_age(30);
    inputs.official.latest_release_month = None;
    inputs.batch.observations.retain(|o| o.category != "transport");

    let s = run(&reg, inputs);
    let gates: Vec<&str> = s
        .release
        .blocked_conditions
        .iter()
        .map(|c| &c[..6])
        .collect();
    assert_eq!(gates, vec!["Gate A", "Gate D", "Gate E"]);
}

#[test]
fn malformed_snapshot_fields_fail_validation() {
    let reg = Registry::default_seed();
    let mut inputs = common::inputs(now());
    inputs.batch.health.push(common::health(
        "statcan_food_prices",
        "food",
        3,
        Some(now() - Duration::days(1)),
    ));

    let s = run(&reg, inputs);
    assert_eq!(s.release.status, ReleaseStatus::FailedGate);
    assert!(s.release.published_at.is_none());
    assert_eq!(
        s.release.blocked_conditions,
        vec!["Gate C failed: snapshot schema validation error: source_health.statcan_food_prices: tier must be 1 or 2".to_string()]
    );
}

#[test]
fn validation_failures_follow_the_other_gates() {
    let reg = Registry::default_seed();
    let mut inputs = with_food_age(20);
    inputs.official.latest_release_month = Some("Jan 2026".into());
    inputs.batch.health.push(common::health(
        "statcan_food_prices",
        "food",
        3,
        Some(now() - Duration::days(1)),
    ));

    let s = run(&reg, inputs);
    let blocked = &s.release.blocked_conditions;
    assert_eq!(s.release.status, ReleaseStatus::FailedGate);
    assert_eq!(
        blocked.iter().map(|c| &c[..6]).collect::<Vec<_>>(),
        vec!["Gate A", "Gate C", "Gate C"]
    );
    assert!(blocked.contains(
        &"Gate C failed: snapshot schema validation error: official_cpi.latest_release_month is not YYYY-MM: Jan 2026"
            .to_string()
    ));
    assert!(blocked.contains(
        &"Gate C failed: snapshot schema validation error: source_health.statcan_food_prices: tier must be 1 or 2"
            .to_string()
    ));
    // a non-empty month still satisfies the official baseline check
    assert!(!blocked.iter().any(|c| c.starts_with("Gate E")));
}

fn yesterday() -> DateTime<Utc> {
    now() - Duration::days(1)
}

/// History holding one published day before `now()`.
fn published_yesterday(reg: &Registry) -> HistoricalStore {
    let ctx = RunContext {
        run_id: "run_000000000001".into(),
        now: yesterday(),
        registry: reg,
    };
    let first = build_snapshot(&ctx, common::inputs(yesterday()), &HistoricalStore::new());
    assert_eq!(first.release.status, ReleaseStatus::Published);
    let mut history = HistoricalStore::new();
    history.record_published(&first).unwrap();
    history
}

fn run_against(reg: &Registry, inputs: RunInputs, history: &HistoricalStore) -> Snapshot {
    let ctx = RunContext {
        run_id: "run_000000000002".into(),
        now: now(),
        registry: reg,
    };
    build_snapshot(&ctx, inputs, history)
}

#[test]
fn prior_day_levels_drive_daily_change_and_mom() {
    let reg = Registry::default_seed();
    let history = published_yesterday(&reg);

    let mut inputs = common::inputs(now());
    for o in inputs.batch.observations.iter_mut().filter(|o| o.category == "food") {
        o.value *= 1.05;
    }
    let s = run_against(&reg, inputs, &history);

    assert_eq!(s.release.status, ReleaseStatus::Published, "{:?}", s.release.blocked_conditions);
    assert_eq!(s.meta.anomaly_points, 0);
    assert_eq!(s.categories["food"].proxy_level, Some(6.1971));
    assert_eq!(s.categories["food"].daily_change_pct, Some(5.0));
    assert_eq!(s.categories["housing"].daily_change_pct, Some(0.0));
    assert_eq!(s.categories["communication"].daily_change_pct, None);

    assert_eq!(s.meta.category_contributions["food"], Some(0.825));
    assert_eq!(s.meta.category_contributions["communication"], None);
    assert_eq!(s.meta.top_driver.category.as_deref(), Some("food"));

    // 5.0 × 0.165 over the 0.695 of weight with a baseline
    assert_eq!(s.headline.nowcast_mom_pct, Some(1.187));
    assert!(!s.meta.fallbacks.nowcast_from_official_mom);
}

#[test]
fn category_jump_against_prior_day_is_dropped() {
    let reg = Registry::default_seed();
    let history = published_yesterday(&reg);

    let baseline = run_against(&reg, common::inputs(now()), &history);
    assert_eq!(baseline.meta.anomaly_points, 0);
    assert_eq!(baseline.headline.nowcast_mom_pct, Some(0.0));

    let mut inputs = common::inputs(now());
    let gas = inputs
        .batch
        .observations
        .iter_mut()
        .find(|o| o.item_id == "gasoline")
        .unwrap();
    gas.value = 250.0;
    let s = run_against(&reg, inputs, &history);

    assert_eq!(s.meta.anomaly_points, 1);
    assert_eq!(s.categories["transport"].points, 0);
    assert_eq!(s.categories["transport"].status, cpi_nowcast::Freshness::Missing);
    assert!(s.headline.coverage_ratio < baseline.headline.coverage_ratio);
    assert!(s
        .release
        .blocked_conditions
        .iter()
        .any(|c| c.starts_with("Gate D") && c.contains("transport")));
    assert_eq!(s.headline.confidence, cpi_nowcast::Confidence::Low);
    assert_ne!(baseline.headline.confidence, cpi_nowcast::Confidence::Low);
    assert!(!s.meta.fallbacks.nowcast_from_official_mom);
}
