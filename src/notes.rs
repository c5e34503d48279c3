//! Human-readable run notes.

use std::collections::BTreeMap;

use crate::aggregate::single_source_categories;
use crate::config::MethodInfo;
use crate::consensus::ConsensusWithheld;
use crate::projection::YoyWithheld;
use crate::snapshot::{round_to, CategorySummary, Freshness};

pub const DISCLAIMER: &str =
    "This is an experimental nowcast estimate and not an official CPI release.";
pub const DEPRECATED_FIELDS: &str = "Deprecated fields retained for compatibility: headline.nowcast_mom_pct and headline.consensus_spread_yoy.";
pub const MOM_FALLBACK: &str =
    "Nowcast MoM uses official MoM fallback until sufficient category history is available.";

pub struct NotesInput<'a> {
    pub method: &'a MethodInfo,
    pub categories: &'a BTreeMap<String, CategorySummary>,
    pub diversity: &'a BTreeMap<String, usize>,
    pub representativeness_ratio: f64,
    pub anomalies: usize,
    pub rejected: usize,
    pub blocked: &'a [String],
    pub mom_fallback: bool,
    /// Set when the YoY figure is null.
    pub yoy_withheld: Option<YoyWithheld>,
    pub official_yoy_display: Option<f64>,
    /// Set when the consensus figure is null.
    pub consensus_withheld: Option<ConsensusWithheld>,
}

fn names_with(categories: &BTreeMap<String, CategorySummary>, status: Freshness) -> Vec<&str> {
    categories
        .iter()
        .filter(|(_, c)| c.status == status)
        .map(|(k, _)| k.as_str())
        .collect()
}

pub fn build_notes(n: &NotesInput<'_>) -> Vec<String> {
    let mut notes = vec![
        DISCLAIMER.to_string(),
        format!(
            "Methodology {}: weighted category proxies with month-to-date YoY projection.",
            n.method.version
        ),
        "Confidence rubric: gate status + weighted coverage + anomaly rate + source diversity."
            .to_string(),
        format!(
            "Representativeness (fresh-weight share): {:?}%.",
            round_to(n.representativeness_ratio * 100.0, 1)
        ),
        "Coverage ratio is the share of the CPI basket with usable source data in this run."
            .to_string(),
    ];

    let missing = names_with(n.categories, Freshness::Missing);
    if !missing.is_empty() {
        notes.push(format!(
            "Missing categories today: {}. Confidence is downgraded.",
            missing.join(", ")
        ));
    }
    let stale = names_with(n.categories, Freshness::Stale);
    if !stale.is_empty() {
        notes.push(format!("Stale categories used: {}.", stale.join(", ")));
    }
    let single = single_source_categories(n.categories, n.diversity);
    if !single.is_empty() {
        notes.push(format!(
            "Source diversity warning: single-source categories today: {}.",
            single.join(", ")
        ));
    }
    if n.rejected > 0 {
        notes.push(format!("Dropped {} points via range checks.", n.rejected));
    }
    if n.anomalies > 0 {
        notes.push(format!(
            "Dropped {} points via day-over-day anomaly filter.",
            n.anomalies
        ));
    }
    if !n.blocked.is_empty() {
        notes.push(format!("Release gate failed: {}", n.blocked.join("; ")));
    }

    if n.mom_fallback {
        notes.push(MOM_FALLBACK.to_string());
    }
    notes.push(DEPRECATED_FIELDS.to_string());
    if let Some(reason) = n.yoy_withheld {
        notes.push(format!("Nowcast YoY unavailable: {}.", reason.code()));
    }
    if let Some(display) = n.official_yoy_display {
        notes.push(format!(
            "Official CPI YoY display uses one-decimal release-style rounding ({display:?}%)."
        ));
    }
    if let Some(reason) = n.consensus_withheld {
        notes.push(format!(
            "Consensus YoY withheld due to quality guardrails: {}.",
            reason.code()
        ));
    }
    notes
}
