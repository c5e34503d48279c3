//! Quality filter on third-party headline YoY estimates.

use serde::{Deserialize, Serialize};

use crate::config::ConsensusPolicy;
use crate::ingest::types::ConsensusPayload;
use crate::snapshot::round_to;

/// Why a consensus figure was withheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusWithheld {
    MissingPayload,
    MissingSources,
    InsufficientHighConfSources,
    CandidateSpreadTooWide,
}

impl ConsensusWithheld {
    pub fn code(self) -> &'static str {
        match self {
            ConsensusWithheld::MissingPayload => "missing_payload",
            ConsensusWithheld::MissingSources => "missing_sources",
            ConsensusWithheld::InsufficientHighConfSources => "insufficient_high_conf_sources",
            ConsensusWithheld::CandidateSpreadTooWide => "candidate_spread_too_wide",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardrailDiagnostics {
    pub accepted: bool,
    pub reason: Option<ConsensusWithheld>,
    /// Rows with a numeric candidate, whatever their confidence.
    pub candidate_count: usize,
    pub usable_count: usize,
    pub spread: Option<f64>,
}

fn is_trusted(field_confidence: Option<&str>) -> bool {
    matches!(field_confidence, Some("medium" | "high"))
}

pub fn apply_guardrails(
    payload: Option<&ConsensusPayload>,
    policy: &ConsensusPolicy,
) -> (Option<f64>, GuardrailDiagnostics) {
    let mut diag = GuardrailDiagnostics::default();

    let Some(payload) = payload else {
        diag.reason = Some(ConsensusWithheld::MissingPayload);
        return (None, diag);
    };
    if payload.sources.is_none() {
        diag.reason = Some(ConsensusWithheld::MissingSources);
        return (None, diag);
    }

    let rows = payload.candidates();
    diag.candidate_count = rows.iter().filter(|c| c.value().is_some()).count();

    let usable: Vec<f64> = rows
        .iter()
        .filter(|c| is_trusted(c.field_confidence.as_deref()))
        .filter_map(|c| c.value())
        .filter(|v| (policy.min_plausible_yoy..=policy.max_plausible_yoy).contains(v))
        .collect();
    diag.usable_count = usable.len();

    if usable.len() < policy.min_usable_sources.max(1) {
        diag.reason = Some(ConsensusWithheld::InsufficientHighConfSources);
        return (None, diag);
    }

    let max = usable.iter().copied().fold(f64::MIN, f64::max);
    let min = usable.iter().copied().fold(f64::MAX, f64::min);
    let spread = max - min;
    diag.spread = Some(round_to(spread, 3));
    if spread > policy.max_spread_pct {
        diag.reason = Some(ConsensusWithheld::CandidateSpreadTooWide);
        return (None, diag);
    }

    diag.accepted = true;
    let mean = usable.iter().sum::<f64>() / usable.len() as f64;
    (Some(round_to(mean, 3)), diag)
}
