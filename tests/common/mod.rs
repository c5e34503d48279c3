// tests/common/mod.rs
// Fixtures for a run that clears every gate under the default registry.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use cpi_nowcast::freshness::PriorSuccess;
use cpi_nowcast::ingest::types::{
    CollectorBatch, ConsensusPayload, Observation, OfficialIndexRow, OfficialSummary,
    RawSourceHealth, ReferenceFeed, ReleaseEventsPayload,
};
use cpi_nowcast::RunInputs;

pub fn health(source: &str, category: &str, tier: u8, ts: Option<DateTime<Utc>>) -> RawSourceHealth {
    RawSourceHealth {
        source: source.into(),
        category: category.into(),
        tier,
        status: None,
        last_success_timestamp: ts.map(|t| t.to_rfc3339()),
        detail: String::new(),
        source_run_id: None,
        last_observation_period: None,
    }
}

pub fn batch(now: DateTime<Utc>) -> CollectorBatch {
    let today = now.date_naive();
    let mut observations = Vec::new();
    for (item, value) in [
        ("milk_4l", 6.49),
        ("eggs_dozen", 4.79),
        ("bread_white", 3.29),
        ("bananas_kg", 1.74),
        ("ground_beef_kg", 13.2),
    ] {
        observations.push(Observation::new("food", item, value, today, "apify_loblaws"));
    }
    observations.push(Observation::new("housing", "rent_index", 171.4, today, "statcan_cpi_csv"));
    observations.push(Observation::new("housing", "owned_index", 168.9, today, "statcan_cpi_csv"));
    observations.push(Observation::new("transport", "gasoline", 152.3, today, "statcan_gas_csv"));
    observations.push(Observation::new("energy", "electricity", 7.6, today, "oeb_scrape"));

    let day_ago = Some(now - Duration::days(1));
    let ten_days_ago = Some(now - Duration::days(10));
    CollectorBatch {
        observations,
        health: vec![
            health("apify_loblaws", "food", 1, day_ago),
            health("statcan_cpi_csv", "housing", 1, ten_days_ago),
            health("statcan_gas_csv", "transport", 1, ten_days_ago),
            health("oeb_scrape", "energy", 1, day_ago),
        ],
    }
}

pub fn official() -> OfficialSummary {
    OfficialSummary {
        latest_release_month: Some("2026-01".into()),
        mom_pct: Some(0.2),
        yoy_pct: Some(2.34),
        yoy_display_pct: None,
    }
}

pub fn series() -> Vec<OfficialIndexRow> {
    vec![
        OfficialIndexRow {
            ref_date: "2025-02".into(),
            index_value: Some(161.3),
            mom_pct: Some(-0.1),
            yoy_pct: Some(1.9),
        },
        OfficialIndexRow {
            ref_date: "2026-01".into(),
            index_value: Some(165.0),
            mom_pct: Some(0.2),
            yoy_pct: Some(2.34),
        },
    ]
}

pub fn inputs(now: DateTime<Utc>) -> RunInputs {
    RunInputs {
        batch: batch(now),
        official: official(),
        series: series(),
        consensus: None,
        release_events: ReleaseEventsPayload::default(),
        prior_success: PriorSuccess::default(),
    }
}

/// Reference feed serving fixed values.
pub struct StubFeed {
    pub official: OfficialSummary,
    pub series: Vec<OfficialIndexRow>,
}

impl Default for StubFeed {
    fn default() -> Self {
        Self {
            official: official(),
            series: series(),
        }
    }
}

#[async_trait]
impl ReferenceFeed for StubFeed {
    async fn official_summary(&self) -> anyhow::Result<OfficialSummary> {
        Ok(self.official.clone())
    }

    async fn official_series(&self) -> anyhow::Result<Vec<OfficialIndexRow>> {
        Ok(self.series.clone())
    }

    async fn consensus(&self) -> anyhow::Result<Option<ConsensusPayload>> {
        Ok(None)
    }

    async fn release_events(&self) -> anyhow::Result<ReleaseEventsPayload> {
        anyhow::bail!("release calendar offline")
    }
}
