//! Confidence and signal-quality score.
//!
//! Both are computed after the release gate: a blocked run is always `low`
//! and loses 35 score points.

use std::collections::BTreeMap;

use crate::aggregate::single_source_categories;
use crate::snapshot::{CategorySummary, Confidence, Freshness};

pub const HIGH_COVERAGE: f64 = 0.90;
pub const MEDIUM_COVERAGE: f64 = 0.60;

/// Everything the scorer looks at, borrowed from the assembled snapshot.
#[derive(Clone, Copy, Debug)]
pub struct QualityInputs<'a> {
    pub coverage_ratio: f64,
    pub anomalies: usize,
    pub blocked: bool,
    pub categories: &'a BTreeMap<String, CategorySummary>,
    pub diversity: &'a BTreeMap<String, usize>,
}

impl QualityInputs<'_> {
    fn single_source_count(&self) -> usize {
        single_source_categories(self.categories, self.diversity).len()
    }

    fn any_missing(&self) -> bool {
        self.categories
            .values()
            .any(|c| c.status == Freshness::Missing)
    }
}

pub fn confidence(q: &QualityInputs<'_>) -> Confidence {
    if q.blocked {
        return Confidence::Low;
    }

    let mut c = if q.coverage_ratio >= HIGH_COVERAGE {
        Confidence::High
    } else if q.coverage_ratio >= MEDIUM_COVERAGE {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    if q.anomalies > 0 {
        c = c.downgrade();
    }
    if c == Confidence::High && q.single_source_count() > 0 {
        c = Confidence::Medium;
    }
    c
}

/// 0–100 composite.
pub fn signal_quality_score(q: &QualityInputs<'_>) -> u8 {
    // Ties go to the even integer: coverage 0.125 scores 12, not 13.
    let mut score = (q.coverage_ratio * 100.0).round_ties_even() as i64;
    if q.blocked {
        score -= 35;
    }
    score -= q.anomalies.min(20) as i64;
    if q.any_missing() {
        score -= 10;
    }
    score -= (4 * q.single_source_count()).min(20) as i64;
    score.clamp(0, 100) as u8
}
