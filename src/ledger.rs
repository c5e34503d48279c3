//! SQLite audit table of every run attempt.
//!
//! One row per run id, upserted. WAL mode plus a busy timeout so a concurrent
//! reader or a second process does not fail the write.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

use crate::snapshot::Snapshot;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS release_runs (
    run_id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    status TEXT NOT NULL,
    blocked_conditions TEXT NOT NULL,
    snapshot_path TEXT NOT NULL
)
"#;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LedgerRecord {
    pub run_id: String,
    pub created_at: String,
    pub status: String,
    /// JSON array of blocking condition strings.
    pub blocked_conditions: String,
    pub snapshot_path: String,
}

impl LedgerRecord {
    pub fn for_snapshot(snapshot: &Snapshot, snapshot_path: &Path) -> Result<Self> {
        let r = &snapshot.release;
        Ok(Self {
            run_id: r.run_id.clone(),
            created_at: r.created_at.to_rfc3339(),
            status: r.status.as_str().to_string(),
            blocked_conditions: serde_json::to_string(&r.blocked_conditions)
                .context("serializing blocked conditions")?,
            snapshot_path: snapshot_path.display().to_string(),
        })
    }

    pub fn blocked(&self) -> Vec<String> {
        serde_json::from_str(&self.blocked_conditions).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct ReleaseLedger {
    pool: SqlitePool,
}

impl ReleaseLedger {
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .with_context(|| format!("opening release ledger {}", path.display()))?;

        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .context("creating release_runs table")?;

        Ok(Self { pool })
    }

    pub async fn upsert(&self, record: &LedgerRecord) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO release_runs \
             (run_id, created_at, status, blocked_conditions, snapshot_path) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.run_id)
        .bind(&record.created_at)
        .bind(&record.status)
        .bind(&record.blocked_conditions)
        .bind(&record.snapshot_path)
        .execute(&self.pool)
        .await
        .with_context(|| format!("recording run {}", record.run_id))?;
        Ok(())
    }

    pub async fn get(&self, run_id: &str) -> Result<Option<LedgerRecord>> {
        sqlx::query_as::<_, LedgerRecord>("SELECT * FROM release_runs WHERE run_id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .context("reading release_runs")
    }

    /// Newest first.
    pub async fn list(&self) -> Result<Vec<LedgerRecord>> {
        sqlx::query_as::<_, LedgerRecord>(
            "SELECT * FROM release_runs ORDER BY created_at DESC, run_id",
        )
        .fetch_all(&self.pool)
        .await
        .context("listing release_runs")
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(run_id: &str, status: &str, blocked: &[&str]) -> LedgerRecord {
        LedgerRecord {
            run_id: run_id.into(),
            created_at: "2026-02-15T12:00:00+00:00".into(),
            status: status.into(),
            blocked_conditions: serde_json::to_string(blocked).unwrap(),
            snapshot_path: format!("data/runs/{run_id}.json"),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_by_run_id() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ReleaseLedger::open(&dir.path().join("releases.db"))
            .await
            .unwrap();

        ledger
            .upsert(&record("run_a", "failed_gate", &["Gate E failed"]))
            .await
            .unwrap();
        ledger.upsert(&record("run_a", "published", &[])).await.unwrap();
        ledger.upsert(&record("run_b", "published", &[])).await.unwrap();

        let rows = ledger.list().await.unwrap();
        assert_eq!(rows.len(), 2);

        let a = ledger.get("run_a").await.unwrap().unwrap();
        assert_eq!(a.status, "published");
        assert!(a.blocked().is_empty());
        assert!(ledger.get("run_zzz").await.unwrap().is_none());
        ledger.close().await;
    }
}
