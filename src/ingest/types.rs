// src/ingest/types.rs
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::snapshot::Freshness;

/// One price point reported by a collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub category: String, // must match a registry category to be routable
    pub item_id: String,
    pub value: f64,
    pub observed_at: NaiveDate,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_run_id: Option<String>,
}

impl Observation {
    pub fn new(
        category: impl Into<String>,
        item_id: impl Into<String>,
        value: f64,
        observed_at: NaiveDate,
        source: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            item_id: item_id.into(),
            value,
            observed_at,
            source: source.into(),
            source_run_id: None,
        }
    }

    /// Dedup key: (source, item id, observation date).
    pub fn key(&self) -> (String, String, NaiveDate) {
        (self.source.clone(), self.item_id.clone(), self.observed_at)
    }
}

/// Health record as reported by a collector. The status it carries is advisory
/// only; freshness is recomputed centrally from `last_success_timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSourceHealth {
    pub source: String,
    pub category: String,
    #[serde(default = "default_tier")]
    pub tier: u8,
    /// Unknown values read as `None`; the field is recomputed anyway.
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: Option<Freshness>,
    #[serde(default)]
    pub last_success_timestamp: Option<String>,
    #[serde(default)]
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_observation_period: Option<String>,
}

fn default_tier() -> u8 {
    2
}

fn lenient_status<'de, D>(deserializer: D) -> Result<Option<Freshness>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| serde_json::from_value(v).ok()))
}

impl RawSourceHealth {
    /// Record for a source that produced nothing usable this run.
    pub fn missing(descriptor: &SourceDescriptor, detail: impl Into<String>) -> Self {
        Self {
            source: descriptor.source.clone(),
            category: descriptor.category.clone(),
            tier: descriptor.tier,
            status: Some(Freshness::Missing),
            last_success_timestamp: None,
            detail: detail.into(),
            source_run_id: None,
            last_observation_period: None,
        }
    }
}

/// A source a collector is responsible for. Used to emit `missing` health when
/// the collector fails as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub source: String,
    pub category: String,
    #[serde(default = "default_tier")]
    pub tier: u8,
}

/// Everything one collector returned for this run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectorBatch {
    #[serde(default)]
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub health: Vec<RawSourceHealth>,
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Any data collector: one call, a complete batch or an explicit failure.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn fetch(&self) -> Result<CollectorBatch, CollectorError>;
    fn name(&self) -> &str;
    fn sources(&self) -> &[SourceDescriptor];
}

/* ----------------------------
Reference feeds
---------------------------- */

/// Latest official release summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OfficialSummary {
    #[serde(default)]
    pub latest_release_month: Option<String>,
    #[serde(default)]
    pub mom_pct: Option<f64>,
    #[serde(default)]
    pub yoy_pct: Option<f64>,
    /// One-decimal release-style rounding of `yoy_pct`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yoy_display_pct: Option<f64>,
}

/// One month of the official index series; `ref_date` is `YYYY-MM`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfficialIndexRow {
    pub ref_date: String,
    #[serde(default)]
    pub index_value: Option<f64>,
    #[serde(default)]
    pub mom_pct: Option<f64>,
    #[serde(default)]
    pub yoy_pct: Option<f64>,
}

/// Third-party consensus payload. Rows in `sources` are kept loose so a single
/// malformed row does not discard the whole payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsensusPayload {
    #[serde(default)]
    pub sources: Option<Vec<Value>>,
    #[serde(default)]
    pub headline_mom: Option<f64>,
    #[serde(default)]
    pub source_count: Option<u32>,
    #[serde(default)]
    pub confidence: Option<String>,
    #[serde(default)]
    pub as_of: Option<String>,
    #[serde(default)]
    pub errors: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsensusCandidate {
    #[serde(default)]
    pub headline_yoy_candidate: Option<Value>,
    #[serde(default)]
    pub field_confidence: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl ConsensusCandidate {
    /// Numeric candidate value, if the field holds a number.
    pub fn value(&self) -> Option<f64> {
        self.headline_yoy_candidate.as_ref().and_then(Value::as_f64)
    }
}

impl ConsensusPayload {
    /// Object rows of `sources`, parsed; non-object rows are skipped.
    pub fn candidates(&self) -> Vec<ConsensusCandidate> {
        self.sources
            .iter()
            .flatten()
            .filter(|row| row.is_object())
            .filter_map(|row| serde_json::from_value(row.clone()).ok())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseEventsPayload {
    #[serde(default)]
    pub events: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reference data consumed next to the collectors.
#[async_trait]
pub trait ReferenceFeed: Send + Sync {
    async fn official_summary(&self) -> anyhow::Result<OfficialSummary>;
    async fn official_series(&self) -> anyhow::Result<Vec<OfficialIndexRow>>;
    async fn consensus(&self) -> anyhow::Result<Option<ConsensusPayload>>;
    async fn release_events(&self) -> anyhow::Result<ReleaseEventsPayload>;
}
