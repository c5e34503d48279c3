// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod config;
pub mod ingest;

// Pure stages, in pipeline order
pub mod anomaly;
pub mod freshness;
pub mod aggregate;
pub mod projection;
pub mod consensus;
pub mod scoring;
pub mod gate;
pub mod notes;
pub mod release_events;
pub mod snapshot;
pub mod engine;

// Persistence + orchestration
pub mod history;
pub mod ledger;
pub mod writer;
pub mod pipeline;
pub mod readiness;
pub mod metrics;

// ---- Re-exports for stable public API ----
pub use crate::config::{Registry, RuntimeConfig};
pub use crate::engine::{build_snapshot, RunContext, RunInputs};
pub use crate::history::{HistoricalStore, HistoryError};
pub use crate::pipeline::{execute, execute_at, run_once, RunOutcome};
pub use crate::snapshot::{Confidence, Freshness, ReleaseStatus, Snapshot};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber: compact text, or JSON lines when `json`.
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cpi_nowcast=info,warn"));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing already initialised: {e}");
    }
}
