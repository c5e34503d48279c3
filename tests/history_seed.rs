// tests/history_seed.rs
mod common;

use chrono::{NaiveDate, TimeZone, Utc};
use cpi_nowcast::history::{HistoricalStore, HistoryError};
use cpi_nowcast::writer::ArtifactStore;
use cpi_nowcast::{build_snapshot, Registry, RunContext};

fn day(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, m, d).unwrap()
}

fn store_with_live_day() -> (HistoricalStore, NaiveDate) {
    let now = Utc.with_ymd_and_hms(2026, 2, 15, 12, 0, 0).unwrap();
    let reg = Registry::default_seed();
    let ctx = RunContext {
        run_id: "run_aaaaaaaaaaaa".into(),
        now,
        registry: &reg,
    };
    let snapshot = build_snapshot(&ctx, common::inputs(now), &HistoricalStore::new());
    let mut store = HistoricalStore::new();
    store.record_published(&snapshot).unwrap();
    (store, now.date_naive())
}

#[test]
fn seeding_never_overwrites_a_live_day() {
    let (mut store, live) = store_with_live_day();
    let before = store.get(live).cloned().unwrap();
    assert!(!before.is_seeded());

    let report = store
        .seed_from_series(10, day(2, 20), &common::series(), false)
        .unwrap();
    assert_eq!(report.skipped_non_seeded, 1);
    assert_eq!(report.written, 9);
    assert_eq!(store.get(live), Some(&before));
    assert!(store.get(day(2, 11)).unwrap().is_seeded());
    assert_eq!(store.live_days(), 1);
}

#[test]
fn force_reseeds_live_days() {
    let (mut store, live) = store_with_live_day();
    let report = store
        .seed_from_series(10, day(2, 20), &common::series(), true)
        .unwrap();
    assert_eq!(report.written, 10);
    assert_eq!(report.skipped_non_seeded, 0);
    assert!(store.get(live).unwrap().is_seeded());
    assert_eq!(store.live_days(), 0);
}

#[test]
fn seeded_rows_use_the_latest_month_not_after_the_day() {
    let mut store = HistoricalStore::new();
    store
        .seed_from_series(3, day(2, 1), &common::series(), false)
        .unwrap();
    // No February row yet, so 2026-02-01 also takes January.
    for d in [day(1, 30), day(1, 31), day(2, 1)] {
        let e = store.get(d).unwrap();
        assert_eq!(e.headline.nowcast_mom_pct, Some(0.2), "{d}");
    }
}

#[test]
fn empty_series_is_an_error() {
    let mut store = HistoricalStore::new();
    let err = store.seed_from_series(5, day(2, 1), &[], false).unwrap_err();
    assert_eq!(err, HistoryError::EmptySeries);
    assert!(store.is_empty());
}

#[tokio::test]
async fn seeded_store_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = ArtifactStore::new(dir.path());
    let mut store = artifacts.load_historical_strict().await.unwrap();
    store
        .seed_from_series(30, day(2, 1), &common::series(), false)
        .unwrap();
    artifacts.save_historical(&store).await.unwrap();

    let back = artifacts.load_historical_strict().await.unwrap();
    assert_eq!(back, store);
    assert_eq!(back.len(), 30);
}
