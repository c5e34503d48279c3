//! Day-keyed store of published runs and seeded baseline rows.
//!
//! At most one entry per calendar day. Entries are appended or replaced by a
//! same-day republish; seeding only fills days without a live entry unless
//! forced.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::ingest::types::{OfficialIndexRow, OfficialSummary};
use crate::projection::MonthKey;
use crate::snapshot::{
    round_to, Confidence, Freshness, LeadSignal, ReleaseBlock, ReleaseStatus, Snapshot,
};

pub const SEED_TYPE: &str = "official_monthly_baseline";
pub const SEED_SOURCE: &str = "statcan_cpi_csv";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum HistoryError {
    #[error("run {run_id} is {status}; only published runs enter history")]
    NotPublished { run_id: String, status: ReleaseStatus },
    #[error("official index series has no usable rows")]
    EmptySeries,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryHeadline {
    pub nowcast_mom_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nowcast_yoy_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_quality_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_signal: Option<LeadSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_release_at_utc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus_yoy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus_spread_yoy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deviation_yoy_pct: Option<f64>,
    /// Nowcast MoM minus official MoM, 4 decimals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub divergence_mom_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryCategory {
    pub proxy_level: Option<f64>,
    pub daily_change_pct: Option<f64>,
    pub status: Freshness,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySource {
    pub source: String,
    pub status: Freshness,
    pub category: String,
    pub tier: u8,
    pub age_days: Option<i64>,
    pub last_success_timestamp: Option<String>,
    #[serde(default)]
    pub last_observation_period: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedMeta {
    pub seeded: bool,
    pub seed_type: String,
    pub seed_source: String,
    pub seeded_for_date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub headline: HistoryHeadline,
    #[serde(default)]
    pub official_cpi: OfficialSummary,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub categories: BTreeMap<String, HistoryCategory>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub category_contributions: BTreeMap<String, Option<f64>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_health: Vec<HistorySource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<ReleaseBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<SeedMeta>,
}

impl HistoryEntry {
    pub fn is_seeded(&self) -> bool {
        self.meta.as_ref().is_some_and(|m| m.seeded)
    }

    /// Compacted form of a published snapshot.
    pub fn from_snapshot(s: &Snapshot) -> Self {
        let h = &s.headline;
        let divergence = h
            .nowcast_mom_pct
            .zip(s.official_cpi.mom_pct)
            .map(|(nowcast, official)| round_to(nowcast - official, 4));

        Self {
            headline: HistoryHeadline {
                nowcast_mom_pct: h.nowcast_mom_pct,
                nowcast_yoy_pct: h.nowcast_yoy_pct,
                confidence: Some(h.confidence),
                coverage_ratio: Some(h.coverage_ratio),
                signal_quality_score: Some(h.signal_quality_score),
                lead_signal: Some(h.lead_signal),
                next_release_at_utc: h.next_release_at_utc.clone(),
                consensus_yoy: h.consensus_yoy,
                consensus_spread_yoy: h.consensus_spread_yoy,
                deviation_yoy_pct: h.deviation_yoy_pct,
                divergence_mom_pct: divergence,
            },
            official_cpi: s.official_cpi.clone(),
            categories: s
                .categories
                .iter()
                .map(|(k, c)| {
                    (
                        k.clone(),
                        HistoryCategory {
                            proxy_level: c.proxy_level,
                            daily_change_pct: c.daily_change_pct,
                            status: c.status,
                        },
                    )
                })
                .collect(),
            category_contributions: s.meta.category_contributions.clone(),
            source_health: s
                .source_health
                .iter()
                .map(|h| HistorySource {
                    source: h.source.clone(),
                    status: h.status,
                    category: h.category.clone(),
                    tier: h.tier,
                    age_days: h.age_days,
                    last_success_timestamp: h.last_success_timestamp.clone(),
                    last_observation_period: h.last_observation_period.clone(),
                })
                .collect(),
            release: Some(s.release.clone()),
            meta: None,
        }
    }

    /// Baseline row synthesised from one month of the official series.
    pub fn seeded(day: NaiveDate, official: &OfficialIndexRow) -> Self {
        Self {
            headline: HistoryHeadline {
                nowcast_mom_pct: official.mom_pct,
                ..HistoryHeadline::default()
            },
            official_cpi: OfficialSummary {
                latest_release_month: Some(official.ref_date.clone()),
                mom_pct: official.mom_pct,
                yoy_pct: official.yoy_pct,
                yoy_display_pct: None,
            },
            meta: Some(SeedMeta {
                seeded: true,
                seed_type: SEED_TYPE.to_string(),
                seed_source: SEED_SOURCE.to_string(),
                seeded_for_date: day,
            }),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub written: usize,
    pub skipped_non_seeded: usize,
    pub missing_series_days: usize,
}

/// Day-keyed history. Rows that fail to parse are kept verbatim in
/// `unreadable` and written back unchanged, so one bad row never costs the rest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricalStore {
    entries: BTreeMap<NaiveDate, HistoryEntry>,
    unreadable: BTreeMap<String, Value>,
}

impl<'de> Deserialize<'de> for HistoricalStore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
        let mut store = HistoricalStore::default();
        for (key, value) in raw {
            let day = NaiveDate::parse_from_str(&key, "%Y-%m-%d");
            match day.map(|d| (d, HistoryEntry::deserialize(&value))) {
                Ok((d, Ok(entry))) => {
                    store.entries.insert(d, entry);
                }
                Ok((_, Err(e))) => {
                    tracing::warn!(target: "nowcast", day = %key, error = %e, "history row unreadable, kept as-is");
                    store.unreadable.insert(key, value);
                }
                Err(e) => {
                    tracing::warn!(target: "nowcast", key = %key, error = %e, "history key is not a date, kept as-is");
                    store.unreadable.insert(key, value);
                }
            }
        }
        Ok(store)
    }
}

impl Serialize for HistoricalStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut out: BTreeMap<String, Value> = self.unreadable.clone();
        for (day, entry) in &self.entries {
            let v = serde_json::to_value(entry).map_err(serde::ser::Error::custom)?;
            out.insert(day.to_string(), v);
        }
        out.serialize(serializer)
    }
}

impl HistoricalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, day: NaiveDate) -> Option<&HistoryEntry> {
        self.entries.get(&day)
    }

    /// Rows kept verbatim because they did not parse.
    pub fn unreadable_len(&self) -> usize {
        self.unreadable.len()
    }

    fn insert(&mut self, day: NaiveDate, entry: HistoryEntry) {
        self.unreadable.remove(&day.to_string());
        self.entries.insert(day, entry);
    }

    pub fn latest(&self) -> Option<(&NaiveDate, &HistoryEntry)> {
        self.entries.last_key_value()
    }

    /// Category proxy levels of the most recent entry (seeded rows have none).
    pub fn latest_levels(&self) -> BTreeMap<String, f64> {
        self.latest()
            .map(|(_, e)| {
                e.categories
                    .iter()
                    .filter_map(|(k, c)| c.proxy_level.map(|v| (k.clone(), v)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replace the snapshot's day with its compacted form. Refuses anything
    /// but a published run.
    pub fn record_published(&mut self, snapshot: &Snapshot) -> Result<(), HistoryError> {
        if snapshot.release.status != ReleaseStatus::Published {
            return Err(HistoryError::NotPublished {
                run_id: snapshot.release.run_id.clone(),
                status: snapshot.release.status,
            });
        }
        self.insert(snapshot.as_of_date, HistoryEntry::from_snapshot(snapshot));
        Ok(())
    }

    /// Days with a live (non-seeded) entry that carries a YoY figure.
    pub fn live_days(&self) -> usize {
        self.entries
            .values()
            .filter(|e| !e.is_seeded() && e.headline.nowcast_yoy_pct.is_some())
            .count()
    }

    /// Seed the `days` days ending at `today` from the official series.
    pub fn seed_from_series(
        &mut self,
        days: u32,
        today: NaiveDate,
        series: &[OfficialIndexRow],
        force: bool,
    ) -> Result<SeedReport, HistoryError> {
        let mut indexed: Vec<(MonthKey, &OfficialIndexRow)> = series
            .iter()
            .filter_map(|row| MonthKey::parse(&row.ref_date).map(|k| (k, row)))
            .collect();
        indexed.sort_by_key(|(k, _)| *k);
        if indexed.is_empty() {
            return Err(HistoryError::EmptySeries);
        }

        let mut report = SeedReport::default();
        let start = today - Duration::days(i64::from(days.saturating_sub(1)));
        for offset in 0..days {
            let day = start + Duration::days(i64::from(offset));

            // An unreadable row may be live; treat it like one.
            let live = self.entries.get(&day).map_or_else(
                || self.unreadable.contains_key(&day.to_string()),
                |existing| !existing.is_seeded(),
            );
            if live && !force {
                report.skipped_non_seeded += 1;
                continue;
            }

            match series_for_day(day, &indexed) {
                Some(row) => {
                    self.insert(day, HistoryEntry::seeded(day, row));
                    report.written += 1;
                }
                None => report.missing_series_days += 1,
            }
        }
        Ok(report)
    }
}

/// Latest month at or before the day's month, else the earliest month.
fn series_for_day<'a>(
    day: NaiveDate,
    indexed: &[(MonthKey, &'a OfficialIndexRow)],
) -> Option<&'a OfficialIndexRow> {
    let month = MonthKey::of(day);
    indexed
        .iter()
        .take_while(|(k, _)| *k <= month)
        .last()
        .or_else(|| indexed.first())
        .map(|(_, row)| *row)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn row(ref_date: &str, mom: f64) -> OfficialIndexRow {
        OfficialIndexRow {
            ref_date: ref_date.into(),
            index_value: Some(160.0),
            mom_pct: Some(mom),
            yoy_pct: Some(2.0),
        }
    }

    fn live_entry(yoy: Option<f64>) -> HistoryEntry {
        HistoryEntry {
            headline: HistoryHeadline {
                nowcast_mom_pct: Some(0.1),
                nowcast_yoy_pct: yoy,
                ..HistoryHeadline::default()
            },
            ..HistoryEntry::default()
        }
    }

    #[test]
    fn seeding_picks_month_row_and_never_overwrites_live_entries() {
        let mut store = HistoricalStore::new();
        store.entries.insert(d(2026, 2, 14), live_entry(Some(2.3)));
        let series = vec![row("2025-12", 0.1), row("2026-01", 0.2), row("2026-03", 0.9)];

        let report = store
            .seed_from_series(3, d(2026, 2, 15), &series, false)
            .unwrap();
        assert_eq!(
            report,
            SeedReport {
                written: 2,
                skipped_non_seeded: 1,
                missing_series_days: 0
            }
        );
        assert!(!store.get(d(2026, 2, 14)).unwrap().is_seeded());

        let seeded = store.get(d(2026, 2, 15)).unwrap();
        assert!(seeded.is_seeded());
        assert_eq!(seeded.headline.nowcast_mom_pct, Some(0.2));
        assert_eq!(
            seeded.official_cpi.latest_release_month.as_deref(),
            Some("2026-01")
        );

        // Reseeding replaces seeded rows only.
        let report = store
            .seed_from_series(3, d(2026, 2, 15), &series, false)
            .unwrap();
        assert_eq!(report.written, 2);
        assert_eq!(store.live_days(), 1);
    }

    #[test]
    fn forced_seeding_overwrites_live_entries() {
        let mut store = HistoricalStore::new();
        store.entries.insert(d(2026, 2, 15), live_entry(Some(2.3)));
        let report = store
            .seed_from_series(1, d(2026, 2, 15), &[row("2026-01", 0.2)], true)
            .unwrap();
        assert_eq!(report.written, 1);
        assert!(store.get(d(2026, 2, 15)).unwrap().is_seeded());
    }

    #[test]
    fn day_before_series_uses_earliest_row() {
        let series = [row("2026-01", 0.2), row("2026-02", 0.4)];
        let indexed: Vec<_> = series
            .iter()
            .map(|r| (MonthKey::parse(&r.ref_date).unwrap(), r))
            .collect();
        let chosen = series_for_day(d(2025, 6, 1), &indexed).unwrap();
        assert_eq!(chosen.ref_date, "2026-01");
    }

    #[test]
    fn empty_series_is_an_error() {
        let mut store = HistoricalStore::new();
        assert_eq!(
            store.seed_from_series(5, d(2026, 2, 15), &[], false),
            Err(HistoryError::EmptySeries)
        );
    }

    #[test]
    fn seeded_row_serializes_compactly() {
        let e = HistoryEntry::seeded(d(2026, 2, 15), &row("2026-01", 0.2));
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["meta"]["seeded"], true);
        assert_eq!(v["meta"]["seed_type"], SEED_TYPE);
        assert_eq!(v["meta"]["seeded_for_date"], "2026-02-15");
        assert!(v.get("categories").is_none());
        assert!(v["headline"].get("divergence_mom_pct").is_none());

        let back: HistoryEntry = serde_json::from_value(v).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn unreadable_rows_survive_a_round_trip() {
        let body = r#"{
            "2026-02-13": {"headline": {"nowcast_mom_pct": 0.1, "nowcast_yoy_pct": 2.1}},
            "2026-02-14": {"headline": {"nowcast_mom_pct": 0.1},
                           "meta": {"seeded": "yes", "seed_type": "x", "seed_source": "y",
                                    "seeded_for_date": "2026-02-14"}},
            "not-a-day": {"headline": {}}
        }"#;
        let mut store: HistoricalStore = serde_json::from_str(body).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.unreadable_len(), 2);
        assert_eq!(store.live_days(), 1);

        // Seeding treats the unreadable day as live.
        let report = store
            .seed_from_series(2, d(2026, 2, 15), &[row("2026-01", 0.2)], false)
            .unwrap();
        assert_eq!(report.skipped_non_seeded, 1);
        assert_eq!(report.written, 1);

        let v = serde_json::to_value(&store).unwrap();
        assert_eq!(v.as_object().unwrap().len(), 4);
        assert_eq!(v["2026-02-14"]["meta"]["seeded"], "yes");
        assert_eq!(v["not-a-day"], serde_json::json!({"headline": {}}));
    }

    #[test]
    fn readable_entry_replaces_unreadable_row_for_the_same_day() {
        let mut store: HistoricalStore =
            serde_json::from_str(r#"{"2026-02-15": {"headline": 7}}"#).unwrap();
        assert_eq!(store.unreadable_len(), 1);
        store
            .seed_from_series(1, d(2026, 2, 15), &[row("2026-01", 0.2)], true)
            .unwrap();
        assert_eq!(store.unreadable_len(), 0);
        let v = serde_json::to_value(&store).unwrap();
        assert_eq!(v["2026-02-15"]["meta"]["seeded"], true);
    }

    #[test]
    fn live_days_ignore_seeded_and_yoy_less_rows() {
        let mut store = HistoricalStore::new();
        store.entries.insert(d(2026, 2, 13), live_entry(None));
        store.entries.insert(d(2026, 2, 14), live_entry(Some(2.1)));
        store
            .entries
            .insert(d(2026, 2, 15), HistoryEntry::seeded(d(2026, 2, 15), &row("2026-01", 0.2)));
        assert_eq!(store.live_days(), 1);
        assert!(store.latest_levels().is_empty());
    }
}
