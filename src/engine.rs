//! # Nowcast Engine
//! Pure assembly of one run's [`Snapshot`] from collected inputs and history.
//! No I/O, suitable for unit tests and replaying captured inputs.
//!
//! Stage order: normalize → anomaly filter → freshness → categories →
//! headline projection → consensus → release gate → confidence/score → notes.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::aggregate;
use crate::anomaly::filter_anomalies;
use crate::config::Registry;
use crate::consensus::apply_guardrails;
use crate::freshness::{classify_sources, PriorSuccess};
use crate::gate;
use crate::history::HistoricalStore;
use crate::ingest::normalize;
use crate::ingest::types::{
    CollectorBatch, ConsensusPayload, OfficialIndexRow, OfficialSummary, ReleaseEventsPayload,
};
use crate::notes::{build_notes, NotesInput};
use crate::projection;
use crate::release_events::next_release;
use crate::scoring::{confidence, signal_quality_score, QualityInputs};
use crate::snapshot::{
    round_to, Confidence, ConsensusDetail, Fallbacks, Headline, Meta, ProjectionMeta,
    ReleaseBlock, Snapshot,
};

/// Fresh `run_<12 hex>` identifier.
pub fn new_run_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("run_{}", &hex[..12])
}

pub struct RunContext<'a> {
    pub run_id: String,
    /// Whole-second UTC instant the run is stamped with.
    pub now: DateTime<Utc>,
    pub registry: &'a Registry,
}

/// Everything gathered from collectors and reference feeds for one run.
#[derive(Debug, Clone, Default)]
pub struct RunInputs {
    pub batch: CollectorBatch,
    pub official: OfficialSummary,
    pub series: Vec<OfficialIndexRow>,
    pub consensus: Option<ConsensusPayload>,
    pub release_events: ReleaseEventsPayload,
    pub prior_success: PriorSuccess,
}

fn consensus_detail(
    payload: Option<&ConsensusPayload>,
    headline_yoy: Option<f64>,
    guardrails: crate::consensus::GuardrailDiagnostics,
) -> ConsensusDetail {
    match payload {
        Some(p) => ConsensusDetail {
            headline_yoy,
            headline_mom: p.headline_mom,
            source_count: p.source_count.unwrap_or(0),
            confidence: p.confidence.clone().unwrap_or_else(|| "low".to_string()),
            as_of: p.as_of.clone(),
            source_urls: p.candidates().into_iter().map(|c| c.url).collect(),
            sources: p.sources.clone().unwrap_or_default(),
            errors: p.errors.clone(),
            guardrails,
        },
        None => ConsensusDetail {
            headline_yoy,
            headline_mom: None,
            source_count: 0,
            confidence: "low".to_string(),
            as_of: None,
            source_urls: Vec::new(),
            sources: Vec::new(),
            errors: Vec::new(),
            guardrails,
        },
    }
}

/// Build, gate and score one run.
pub fn build_snapshot(ctx: &RunContext<'_>, inputs: RunInputs, history: &HistoricalStore) -> Snapshot {
    let registry = ctx.registry;
    let now = ctx.now;
    let today = now.date_naive();
    let prior_levels = history.latest_levels();

    // 1–3: observation quality and source freshness
    let total_raw = inputs.batch.observations.len();
    let normalized = normalize(inputs.batch.observations, registry);
    let after_dedupe = normalized.after_dedupe;
    let (rejected, unroutable) = (normalized.rejected, normalized.unroutable);
    let filtered = filter_anomalies(normalized.observations, &prior_levels, registry);
    let anomalies = filtered.anomalies;
    let observations = filtered.kept;
    let source_health = classify_sources(&inputs.batch.health, &inputs.prior_success, registry, now);

    // 4: categories
    let mut categories = aggregate::summarize_categories(&observations, &source_health, registry);
    aggregate::apply_daily_changes(&mut categories, &prior_levels);
    let coverage_ratio = aggregate::coverage_ratio(&categories, registry);
    let representativeness_ratio = aggregate::representativeness_ratio(&categories, registry);
    let diversity = aggregate::source_diversity(&observations);
    let contributions = aggregate::contributions(&categories);
    let top_driver = aggregate::top_driver(&contributions);

    // 5: headline
    let mut official = inputs.official;
    let official_yoy_display = official.yoy_pct.map(|v| round_to(v, 1));
    official.yoy_display_pct = official_yoy_display;

    let computed_mom = projection::weighted_mom(&categories, &prior_levels);
    let (nowcast_mom, mom_fallback) = projection::resolve_mom(computed_mom, official.mom_pct);
    let lead_signal = projection::lead_signal(nowcast_mom);
    let (nowcast_yoy, yoy_diag) = projection::project_yoy(today, nowcast_mom, &inputs.series);

    // 6: consensus
    let (consensus_yoy, guardrails) =
        apply_guardrails(inputs.consensus.as_ref(), &registry.consensus);
    let deviation = projection::deviation(nowcast_yoy, consensus_yoy);
    let consensus_withheld = guardrails.reason.filter(|_| consensus_yoy.is_none());
    let yoy_withheld = yoy_diag.reason.filter(|_| nowcast_yoy.is_none());

    let next = next_release(&inputs.release_events, now);

    let mut headline = Headline {
        nowcast_mom_pct: nowcast_mom,
        nowcast_yoy_pct: nowcast_yoy,
        confidence: Confidence::Low,
        coverage_ratio,
        signal_quality_score: 0,
        lead_signal,
        next_release_at_utc: next.as_ref().map(|n| n.release_at_utc.clone()),
        consensus_yoy,
        consensus_spread_yoy: None,
        deviation_yoy_pct: deviation,
        method_label: registry.method.label.clone(),
    };
    headline.fill_legacy_aliases();

    let mut snapshot = Snapshot {
        as_of_date: today,
        timestamp: now,
        headline,
        categories,
        official_cpi: official,
        source_health,
        notes: Vec::new(),
        meta: Meta {
            method_version: registry.method.version.clone(),
            total_raw_points: total_raw,
            total_points_after_dedupe: after_dedupe,
            total_points_after_quality_filters: observations.len(),
            anomaly_points: anomalies,
            rejected_points: rejected,
            unroutable_points: unroutable,
            representativeness_ratio,
            source_diversity_by_category: diversity,
            category_contributions: contributions,
            top_driver,
            release_intelligence: next,
            release_events: inputs.release_events,
            fallbacks: Fallbacks {
                nowcast_from_official_mom: mom_fallback,
            },
            projection: ProjectionMeta {
                nowcast_yoy_prorated: yoy_diag,
            },
            consensus: consensus_detail(inputs.consensus.as_ref(), consensus_yoy, guardrails),
        },
        release: ReleaseBlock::started(ctx.run_id.clone(), now),
    };

    // 8: gate, then everything that depends on it
    let blocked = gate::finalize(&mut snapshot, registry, now);

    let quality = QualityInputs {
        coverage_ratio,
        anomalies,
        blocked: !blocked.is_empty(),
        categories: &snapshot.categories,
        diversity: &snapshot.meta.source_diversity_by_category,
    };
    let score = signal_quality_score(&quality);
    let conf = confidence(&quality);
    let notes = build_notes(&NotesInput {
        method: &registry.method,
        categories: &snapshot.categories,
        diversity: &snapshot.meta.source_diversity_by_category,
        representativeness_ratio,
        anomalies,
        rejected,
        blocked: &blocked,
        mom_fallback,
        yoy_withheld,
        official_yoy_display,
        consensus_withheld,
    });
    snapshot.headline.signal_quality_score = score;
    snapshot.headline.confidence = conf;
    snapshot.notes = notes;

    tracing::info!(
        target: "nowcast",
        run_id = %snapshot.release.run_id,
        raw = total_raw,
        kept = snapshot.meta.total_points_after_quality_filters,
        rejected,
        anomalies,
        unroutable,
        coverage = coverage_ratio,
        score,
        confidence = ?conf,
        "snapshot assembled"
    );
    snapshot
}
