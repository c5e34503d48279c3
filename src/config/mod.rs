// src/config/mod.rs
pub mod registry;

pub use registry::{CategorySpec, ConsensusPolicy, GatePolicy, MethodInfo, Registry};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::ingest::providers::json::JsonCollector;
use crate::ingest::types::{Collector, SourceDescriptor};

pub const ENV_DATA_DIR: &str = "NOWCAST_DATA_DIR";
pub const ENV_REGISTRY_PATH: &str = "NOWCAST_REGISTRY_PATH";
pub const ENV_COLLECTORS_PATH: &str = "NOWCAST_COLLECTORS_PATH";
pub const ENV_FEEDS_DIR: &str = "NOWCAST_FEEDS_DIR";
pub const ENV_LOG_JSON: &str = "NOWCAST_LOG_JSON";

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_REGISTRY_PATH: &str = "config/registry.toml";
pub const DEFAULT_COLLECTORS_PATH: &str = "config/collectors.toml";
pub const DEFAULT_FEEDS_DIR: &str = "config/feeds";

/// Paths for one invocation, resolved from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub data_dir: PathBuf,
    pub registry_path: PathBuf,
    pub collectors_path: PathBuf,
    pub feeds_dir: PathBuf,
    pub log_json: bool,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let path = |key: &str, default: &str| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default))
        };
        Self {
            data_dir: path(ENV_DATA_DIR, DEFAULT_DATA_DIR),
            registry_path: path(ENV_REGISTRY_PATH, DEFAULT_REGISTRY_PATH),
            collectors_path: path(ENV_COLLECTORS_PATH, DEFAULT_COLLECTORS_PATH),
            feeds_dir: path(ENV_FEEDS_DIR, DEFAULT_FEEDS_DIR),
            log_json: env_flag(ENV_LOG_JSON),
        }
    }
}

/// `1`, `true`, `yes` (case-insensitive) are on; anything else is off.
pub fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Parse an env var, falling back to `default` when unset or malformed.
pub fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/* ----------------------------
Collector list (TOML or JSON)
---------------------------- */

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorsFile {
    #[serde(default)]
    pub collectors: Vec<CollectorEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorEntry {
    pub name: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
}

pub fn load_collectors_file(path: &Path) -> Result<CollectorsFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading collectors from {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let parsed = if is_json {
        serde_json::from_str(&content).context("parsing collectors json")?
    } else {
        toml::from_str(&content).context("parsing collectors toml")?
    };
    Ok(parsed)
}

/// Build the configured collectors in file order. Relative `path`s resolve
/// against the collectors file's directory.
pub fn build_collectors(path: &Path) -> Result<Vec<Box<dyn Collector>>> {
    let file = load_collectors_file(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let mut out: Vec<Box<dyn Collector>> = Vec::with_capacity(file.collectors.len());
    for entry in file.collectors {
        out.push(build_collector(entry, base)?);
    }
    Ok(out)
}

fn build_collector(entry: CollectorEntry, base: &Path) -> Result<Box<dyn Collector>> {
    match (entry.path, entry.url) {
        (Some(p), None) => {
            let resolved = if p.is_absolute() { p } else { base.join(p) };
            Ok(Box::new(JsonCollector::from_path(entry.name, resolved, entry.sources)))
        }
        #[cfg(feature = "collect-http")]
        (None, Some(url)) => Ok(Box::new(JsonCollector::from_url(entry.name, url, entry.sources))),
        #[cfg(not(feature = "collect-http"))]
        (None, Some(_)) => Err(anyhow!(
            "collector {} uses a url but feature `collect-http` is disabled",
            entry.name
        )),
        _ => Err(anyhow!(
            "collector {} must set exactly one of `path` or `url`",
            entry.name
        )),
    }
}
