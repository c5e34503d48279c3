use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

use crate::ingest::types::{
    ConsensusPayload, OfficialIndexRow, OfficialSummary, ReferenceFeed, ReleaseEventsPayload,
};

pub const OFFICIAL_SUMMARY_FILE: &str = "official_summary.json";
pub const OFFICIAL_SERIES_FILE: &str = "official_series.json";
pub const CONSENSUS_FILE: &str = "consensus.json";
pub const RELEASE_EVENTS_FILE: &str = "release_events.json";

/// Reference feeds read from a directory of JSON documents, one per feed.
#[derive(Debug, Clone)]
pub struct JsonDirFeed {
    dir: PathBuf,
}

impl JsonDirFeed {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn read<T: DeserializeOwned>(&self, file: &str) -> Result<T> {
        let path = self.dir.join(file);
        read_json(&path).await
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let body = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading feed {}", path.display()))?;
    serde_json::from_str(&body).with_context(|| format!("parsing feed {}", path.display()))
}

#[async_trait]
impl ReferenceFeed for JsonDirFeed {
    async fn official_summary(&self) -> Result<OfficialSummary> {
        self.read(OFFICIAL_SUMMARY_FILE).await
    }

    async fn official_series(&self) -> Result<Vec<OfficialIndexRow>> {
        self.read(OFFICIAL_SERIES_FILE).await
    }

    async fn consensus(&self) -> Result<Option<ConsensusPayload>> {
        // `null` in the file means "no payload this run".
        self.read(CONSENSUS_FILE).await
    }

    async fn release_events(&self) -> Result<ReleaseEventsPayload> {
        self.read(RELEASE_EVENTS_FILE).await
    }
}
