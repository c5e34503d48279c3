//! # Category Registry
//!
//! Immutable configuration for one nowcast run:
//!
//! - per-category weight, legal value bounds, outlier threshold and minimum
//!   point count (plus an optional designated primary source),
//! - per-source freshness SLA in days,
//! - release-gate policy (which sources and categories the gates look at),
//! - consensus guardrail limits and the method label/version.
//!
//! Loads from TOML or JSON; falls back to `default_seed()` when the file is
//! absent or unreadable. Weights are clamped to `[0.0, 1.0]` and inverted bounds
//! are swapped. Category weights intentionally sum to less than 1.0.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySpec {
    pub weight: f64,
    /// Inclusive `[lower, upper]` legal value range.
    pub value_bounds: (f64, f64),
    pub outlier_threshold_pct: f64,
    pub min_points: usize,
    /// When set, the category is only usable while this source is fresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_source: Option<String>,
}

impl CategorySpec {
    pub fn accepts(&self, value: f64) -> bool {
        let (lower, upper) = self.value_bounds;
        value > 0.0 && value >= lower && value <= upper
    }
}

/// Sources and categories the release gate inspects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatePolicy {
    /// Tier-1 weekly food source (Gate A).
    pub weekly_food_source: String,
    pub weekly_food_max_age_days: i64,
    /// Monthly sources that must not be missing (Gate B).
    pub required_monthly_sources: Vec<String>,
    /// At least one must be fresh or stale (Gate B).
    pub energy_sources: Vec<String>,
    /// Categories that must reach their `min_points` (Gate D).
    pub core_categories: Vec<String>,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            weekly_food_source: "apify_loblaws".into(),
            weekly_food_max_age_days: 14,
            required_monthly_sources: vec!["statcan_cpi_csv".into(), "statcan_gas_csv".into()],
            energy_sources: vec!["oeb_scrape".into(), "statcan_energy_cpi_csv".into()],
            core_categories: vec!["food".into(), "housing".into(), "transport".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusPolicy {
    pub min_plausible_yoy: f64,
    pub max_plausible_yoy: f64,
    pub max_spread_pct: f64,
    pub min_usable_sources: usize,
}

impl Default for ConsensusPolicy {
    fn default() -> Self {
        Self {
            min_plausible_yoy: 1.0,
            max_plausible_yoy: 5.0,
            max_spread_pct: 1.0,
            min_usable_sources: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub label: String,
    pub version: String,
}

impl Default for MethodInfo {
    fn default() -> Self {
        Self {
            label: "YoY nowcast from public category proxies with month-to-date prorating".into(),
            version: "v1.2.0".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    pub categories: BTreeMap<String, CategorySpec>,
    #[serde(default)]
    pub source_sla_days: BTreeMap<String, i64>,
    #[serde(default)]
    pub gate: GatePolicy,
    #[serde(default)]
    pub consensus: ConsensusPolicy,
    #[serde(default)]
    pub method: MethodInfo,
}

impl Registry {
    /// Load from an explicit path (TOML or JSON by extension).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading registry from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let parsed: Registry = match ext.as_str() {
            "json" => serde_json::from_str(&content).context("parsing registry json")?,
            _ => toml::from_str(&content).context("parsing registry toml")?,
        };
        let reg = parsed.sanitized();
        if reg.categories.is_empty() {
            return Err(anyhow!("registry {} defines no categories", path.display()));
        }
        Ok(reg)
    }

    /// Load or fall back to the built-in seed.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load_from(path) {
            Ok(reg) => reg,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), path = %path.display(), "registry fallback to default seed");
                Self::default_seed()
            }
        }
    }

    pub fn category(&self, name: &str) -> Option<&CategorySpec> {
        self.categories.get(name)
    }

    /// Sum of all registered weights (the coverage denominator).
    pub fn total_weight(&self) -> f64 {
        self.categories.values().map(|c| c.weight).sum()
    }

    pub fn sla_days(&self, source: &str) -> Option<i64> {
        self.source_sla_days.get(source).copied()
    }

    fn sanitized(mut self) -> Self {
        for spec in self.categories.values_mut() {
            spec.weight = clamp01(spec.weight);
            let (lo, hi) = spec.value_bounds;
            if lo > hi {
                spec.value_bounds = (hi, lo);
            }
            if !spec.outlier_threshold_pct.is_finite() || spec.outlier_threshold_pct < 0.0 {
                spec.outlier_threshold_pct = 50.0;
            }
        }
        if self.gate.weekly_food_max_age_days < 0 {
            self.gate.weekly_food_max_age_days = GatePolicy::default().weekly_food_max_age_days;
        }
        if self.consensus.min_plausible_yoy > self.consensus.max_plausible_yoy {
            std::mem::swap(
                &mut self.consensus.min_plausible_yoy,
                &mut self.consensus.max_plausible_yoy,
            );
        }
        self
    }

    /// Built-in basket used when no registry file is configured.
    pub fn default_seed() -> Self {
        let mut categories = BTreeMap::new();
        for (name, weight, bounds, threshold, min_points, primary) in [
            ("food", 0.165, (0.1, 500.0), 60.0, 5, Some("apify_loblaws")),
            ("housing", 0.300, (1.0, 400.0), 30.0, 2, None),
            ("transport", 0.150, (50.0, 300.0), 40.0, 1, None),
            ("energy", 0.080, (0.1, 100.0), 50.0, 1, None),
            ("communication", 0.045, (1.0, 400.0), 30.0, 1, None),
            ("health_personal", 0.050, (1.0, 400.0), 25.0, 1, None),
            ("recreation_education", 0.095, (1.0, 400.0), 30.0, 1, None),
        ] {
            categories.insert(
                name.to_string(),
                CategorySpec {
                    weight,
                    value_bounds: bounds,
                    outlier_threshold_pct: threshold,
                    min_points,
                    primary_source: primary.map(str::to_string),
                },
            );
        }

        let mut source_sla_days = BTreeMap::new();
        for (source, days) in [
            ("apify_loblaws", 14),
            ("openfoodfacts_api", 2),
            ("oeb_scrape", 2),
            ("statcan_energy_cpi_csv", 45),
            ("statcan_food_prices", 45),
            ("statcan_gas_csv", 45),
            ("statcan_cpi_csv", 45),
            ("ised_mobile_plan_tracker", 60),
            ("crtc_cmr_report", 400),
            ("healthcanada_dpd", 90),
            ("pmprb_reports", 400),
            ("parkscanada_fees", 180),
            ("statcan_education_portal", 180),
        ] {
            source_sla_days.insert(source.to_string(), days);
        }

        Self {
            categories,
            source_sla_days,
            gate: GatePolicy::default(),
            consensus: ConsensusPolicy::default(),
            method: MethodInfo::default(),
        }
    }
}

fn clamp01(x: f64) -> f64 {
    if !x.is_finite() || x < 0.0 {
        0.0
    } else if x > 1.0 {
        1.0
    } else {
        x
    }
}
