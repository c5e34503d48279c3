use async_trait::async_trait;
use metrics::{counter, histogram};
use std::path::PathBuf;

use crate::ingest::types::{Collector, CollectorBatch, CollectorError, SourceDescriptor};

/// Collector reading a `CollectorBatch` JSON document:
/// `{"observations": [...], "health": [...]}`.
pub struct JsonCollector {
    name: String,
    sources: Vec<SourceDescriptor>,
    mode: Mode,
}

enum Mode {
    File(PathBuf),
    Inline(String),
    #[cfg(feature = "collect-http")]
    Http {
        url: String,
        client: reqwest::Client,
    },
}

impl JsonCollector {
    pub fn from_path(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        sources: Vec<SourceDescriptor>,
    ) -> Self {
        Self {
            name: name.into(),
            sources,
            mode: Mode::File(path.into()),
        }
    }

    /// Fixed payload; handy for tests and replaying a captured batch.
    pub fn from_fixture(
        name: impl Into<String>,
        payload: &str,
        sources: Vec<SourceDescriptor>,
    ) -> Self {
        Self {
            name: name.into(),
            sources,
            mode: Mode::Inline(payload.to_string()),
        }
    }

    #[cfg(feature = "collect-http")]
    pub fn from_url(
        name: impl Into<String>,
        url: impl Into<String>,
        sources: Vec<SourceDescriptor>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .unwrap_or_default();
        Self {
            name: name.into(),
            sources,
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        }
    }

    fn parse_batch(&self, body: &str) -> Result<CollectorBatch, CollectorError> {
        let t0 = std::time::Instant::now();
        let batch: CollectorBatch = serde_json::from_str(body)?;
        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("nowcast_collector_parse_ms").record(ms);
        counter!("nowcast_observations_raw_total").increment(batch.observations.len() as u64);
        Ok(batch)
    }
}

#[async_trait]
impl Collector for JsonCollector {
    async fn fetch(&self) -> Result<CollectorBatch, CollectorError> {
        match &self.mode {
            Mode::File(path) => {
                let body = tokio::fs::read_to_string(path).await?;
                self.parse_batch(&body)
            }
            Mode::Inline(s) => self.parse_batch(s),

            #[cfg(feature = "collect-http")]
            Mode::Http { url, client } => {
                let resp = client
                    .get(url.as_str())
                    .send()
                    .await
                    .map_err(|e| CollectorError::Fetch(format!("{url}: {e}")))?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(CollectorError::Fetch(format!("{url}: http {status}")));
                }
                let body = resp
                    .text()
                    .await
                    .map_err(|e| CollectorError::Fetch(format!("{url}: {e}")))?;
                self.parse_batch(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }
}
