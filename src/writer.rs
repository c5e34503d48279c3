//! The only stage that touches persisted state.
//!
//! JSON artifacts go through a temp file + rename so readers never observe a
//! half-written file.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::freshness::PriorSuccess;
use crate::history::HistoricalStore;
use crate::ledger::{LedgerRecord, ReleaseLedger};
use crate::snapshot::{ReleaseStatus, Snapshot};

pub const LATEST_FILE: &str = "latest.json";
pub const PUBLISHED_LATEST_FILE: &str = "published_latest.json";
pub const HISTORICAL_FILE: &str = "historical.json";
pub const RUNS_DIR: &str = "runs";
pub const LEDGER_FILE: &str = "releases.db";
pub const RELEASE_EVENTS_FILE: &str = "release_events.json";
pub const CONSENSUS_LATEST_FILE: &str = "consensus_latest.json";
pub const METRICS_FILE: &str = "metrics.prom";

/// What a run left on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub run_path: PathBuf,
    pub published: bool,
    pub history_entries: usize,
}

/// Layout of the data directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    pub fn run_path(&self, run_id: &str) -> PathBuf {
        self.root.join(RUNS_DIR).join(format!("{run_id}.json"))
    }

    /// Missing file is an empty store. A file that does not parse at all is
    /// renamed to `historical.json.corrupt-<run_id>` before the run starts with
    /// an empty store, so the next history write cannot clobber it. Single bad
    /// rows are handled by [`HistoricalStore`] itself.
    pub async fn load_historical(&self, run_id: &str) -> HistoricalStore {
        let path = self.path(HISTORICAL_FILE);
        match read_json::<HistoricalStore>(&path).await {
            Ok(Some(store)) => store,
            Ok(None) => HistoricalStore::new(),
            Err(e) => {
                let aside = self.path(&format!("{HISTORICAL_FILE}.corrupt-{run_id}"));
                match fs::rename(&path, &aside).await {
                    Ok(()) => tracing::warn!(
                        target: "nowcast",
                        error = %format!("{e:#}"),
                        moved_to = %aside.display(),
                        "historical store unreadable, moved aside"
                    ),
                    Err(mv) => tracing::error!(
                        target: "nowcast",
                        error = %format!("{e:#}"),
                        rename_error = %mv,
                        "historical store unreadable and could not be moved aside"
                    ),
                }
                HistoricalStore::new()
            }
        }
    }

    /// Strict variant for tools that must not silently rewrite history.
    pub async fn load_historical_strict(&self) -> Result<HistoricalStore> {
        Ok(read_json(&self.path(HISTORICAL_FILE))
            .await?
            .unwrap_or_default())
    }

    pub async fn load_latest(&self) -> Result<Option<Snapshot>> {
        read_json(&self.path(LATEST_FILE)).await
    }

    /// Last successful timestamps, published-latest before latest.
    pub async fn load_prior_success(&self) -> PriorSuccess {
        let mut ordered = Vec::new();
        for file in [PUBLISHED_LATEST_FILE, LATEST_FILE] {
            let rows = match read_json::<Value>(&self.path(file)).await {
                Ok(Some(v)) => source_timestamps(&v),
                Ok(None) => Vec::new(),
                Err(e) => {
                    tracing::warn!(target: "nowcast", file, error = %format!("{e:#}"), "prior snapshot unreadable");
                    Vec::new()
                }
            };
            ordered.push(rows);
        }
        PriorSuccess::from_ordered(ordered)
    }

    /// Persist one finished run. History only moves for published runs; the
    /// ledger row is written for every run.
    pub async fn write_outputs(
        &self,
        snapshot: &Snapshot,
        history: &mut HistoricalStore,
    ) -> Result<WriteReport> {
        fs::create_dir_all(self.root.join(RUNS_DIR))
            .await
            .with_context(|| format!("creating {}", self.root.display()))?;

        let run_path = self.run_path(&snapshot.release.run_id);
        write_json_atomic(&self.path(LATEST_FILE), snapshot).await?;
        write_json_atomic(&run_path, snapshot).await?;

        let published = snapshot.release.status == ReleaseStatus::Published;
        if published {
            write_json_atomic(&self.path(PUBLISHED_LATEST_FILE), snapshot).await?;
            history.record_published(snapshot)?;
            write_json_atomic(&self.path(HISTORICAL_FILE), &*history).await?;
        }

        write_json_atomic(&self.path(RELEASE_EVENTS_FILE), &release_events_artifact(snapshot)).await?;
        write_json_atomic(&self.path(CONSENSUS_LATEST_FILE), &snapshot.meta.consensus).await?;

        let ledger = ReleaseLedger::open(&self.path(LEDGER_FILE)).await?;
        ledger
            .upsert(&LedgerRecord::for_snapshot(snapshot, &run_path)?)
            .await?;
        ledger.close().await;

        tracing::info!(
            target: "nowcast",
            run_id = %snapshot.release.run_id,
            published,
            history_entries = history.len(),
            "outputs written"
        );
        Ok(WriteReport {
            run_path,
            published,
            history_entries: history.len(),
        })
    }

    pub async fn save_historical(&self, history: &HistoricalStore) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating {}", self.root.display()))?;
        write_json_atomic(&self.path(HISTORICAL_FILE), history).await
    }

    pub async fn write_metrics(&self, body: &str) -> Result<()> {
        write_atomic(&self.path(METRICS_FILE), body.as_bytes()).await
    }
}

/// Events payload plus the chosen next release and method version.
fn release_events_artifact(snapshot: &Snapshot) -> Value {
    let mut payload = serde_json::to_value(&snapshot.meta.release_events)
        .ok()
        .and_then(|v| match v {
            Value::Object(m) => Some(m),
            _ => None,
        })
        .unwrap_or_default();
    let next = snapshot
        .meta
        .release_intelligence
        .as_ref()
        .and_then(|n| serde_json::to_value(n).ok())
        .unwrap_or_else(|| json!({}));
    payload.insert("next_release".into(), next);
    payload.insert(
        "method_version".into(),
        Value::String(snapshot.meta.method_version.clone()),
    );
    Value::Object(payload)
}

fn source_timestamps(snapshot: &Value) -> Vec<(String, Option<String>)> {
    snapshot
        .get("source_health")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let source = row.get("source")?.as_str()?.to_string();
                    let ts = row
                        .get("last_success_timestamp")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    Some((source, ts))
                })
                .collect()
        })
        .unwrap_or_default()
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let body = match fs::read_to_string(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    let parsed = serde_json::from_str(&body).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(parsed))
}

async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_vec_pretty(value)
        .with_context(|| format!("serializing {}", path.display()))?;
    write_atomic(path, &body).await
}

async fn write_atomic(path: &Path, body: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, body)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}
