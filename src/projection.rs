//! Headline month-over-month figure and the prorated
//! year-over-year projection against the official index series.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::ingest::types::OfficialIndexRow;
use crate::snapshot::{round_to, CategorySummary, LeadSignal};

/// Dead band around zero for the lead signal, in percent.
pub const LEAD_SIGNAL_BAND: f64 = 0.02;

/// Calendar month, rendered and parsed as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (y, m) = s.trim().split_once('-')?;
        if y.len() != 4 || m.len() != 2 {
            return None;
        }
        Self::new(y.parse().ok()?, m.parse().ok()?)
    }

    pub fn prev(self) -> Self {
        if self.month == 1 {
            Self { year: self.year - 1, month: 12 }
        } else {
            Self { year: self.year, month: self.month - 1 }
        }
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    pub fn year_earlier(self) -> Self {
        Self { year: self.year - 1, month: self.month }
    }

    pub fn days_in_month(self) -> u32 {
        let first = NaiveDate::from_ymd_opt(self.year, self.month, 1);
        let next = self.next();
        let next_first = NaiveDate::from_ymd_opt(next.year, next.month, 1);
        match (first, next_first) {
            (Some(a), Some(b)) => (b - a).num_days() as u32,
            _ => 30,
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Why a YoY projection was withheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YoyWithheld {
    MissingNowcastMom,
    MissingRequiredOfficialIndex,
    InvalidRequiredOfficialIndex,
}

impl YoyWithheld {
    pub fn code(self) -> &'static str {
        match self {
            YoyWithheld::MissingNowcastMom => "missing_nowcast_mom",
            YoyWithheld::MissingRequiredOfficialIndex => "missing_required_official_index",
            YoyWithheld::InvalidRequiredOfficialIndex => "invalid_required_official_index",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YoyDiagnostics {
    pub prorate_factor: Option<f64>,
    pub base_month: Option<String>,
    pub reference_month: Option<String>,
    pub projected_index: Option<f64>,
    pub base_index: Option<f64>,
    pub reference_index: Option<f64>,
    pub reason: Option<YoyWithheld>,
}

/// Weighted mean of per-category changes versus `prior_levels`, normalized by
/// the weight that actually contributed. `None` when nothing contributed.
pub fn weighted_mom(
    categories: &BTreeMap<String, CategorySummary>,
    prior_levels: &BTreeMap<String, f64>,
) -> Option<f64> {
    let mut weighted = 0.0;
    let mut effective = 0.0;
    for (name, c) in categories {
        let (Some(current), Some(&prior)) = (c.proxy_level, prior_levels.get(name)) else {
            continue;
        };
        if prior == 0.0 {
            continue;
        }
        weighted += (current / prior - 1.0) * 100.0 * c.weight;
        effective += c.weight;
    }
    (effective > 0.0).then(|| round_to(weighted / effective, 3))
}

/// Falls back to the official MoM when no category baseline exists yet.
/// Returns the figure and whether the fallback was taken.
pub fn resolve_mom(computed: Option<f64>, official_mom: Option<f64>) -> (Option<f64>, bool) {
    match (computed, official_mom) {
        (Some(v), _) => (Some(v), false),
        (None, Some(official)) => (Some(round_to(official, 3)), true),
        (None, None) => (None, false),
    }
}

/// Share of the run month elapsed when the projected month is the run month,
/// otherwise a full month.
pub fn prorate_factor(run_date: NaiveDate, projected: MonthKey) -> f64 {
    let run_month = MonthKey::of(run_date);
    if projected == run_month {
        f64::from(run_date.day()) / f64::from(run_month.days_in_month())
    } else {
        1.0
    }
}

pub fn project_yoy(
    run_date: NaiveDate,
    nowcast_mom: Option<f64>,
    series: &[OfficialIndexRow],
) -> (Option<f64>, YoyDiagnostics) {
    let mut diag = YoyDiagnostics::default();

    let Some(mom) = nowcast_mom else {
        diag.reason = Some(YoyWithheld::MissingNowcastMom);
        return (None, diag);
    };

    // Later rows for the same month replace earlier ones.
    let by_month: BTreeMap<MonthKey, &OfficialIndexRow> = series
        .iter()
        .filter_map(|row| MonthKey::parse(&row.ref_date).map(|k| (k, row)))
        .collect();

    let preferred = MonthKey::of(run_date).prev();
    let base_key = if by_month.contains_key(&preferred) {
        preferred
    } else if let Some((&latest, _)) = by_month.last_key_value() {
        latest
    } else {
        diag.reason = Some(YoyWithheld::MissingRequiredOfficialIndex);
        return (None, diag);
    };

    let projected = base_key.next();
    let ref_key = projected.year_earlier();
    diag.base_month = Some(base_key.to_string());
    diag.reference_month = Some(ref_key.to_string());

    let (Some(base), Some(reference)) = (by_month.get(&base_key), by_month.get(&ref_key)) else {
        diag.reason = Some(YoyWithheld::MissingRequiredOfficialIndex);
        return (None, diag);
    };

    let valid = |v: Option<f64>| v.filter(|x| x.is_finite() && *x != 0.0);
    let (Some(base_index), Some(reference_index)) =
        (valid(base.index_value), valid(reference.index_value))
    else {
        diag.reason = Some(YoyWithheld::InvalidRequiredOfficialIndex);
        return (None, diag);
    };

    let factor = prorate_factor(run_date, projected);
    let projected_index = base_index * (1.0 + mom / 100.0 * factor);
    let yoy = (projected_index / reference_index - 1.0) * 100.0;

    diag.prorate_factor = Some(round_to(factor, 4));
    diag.projected_index = Some(round_to(projected_index, 4));
    diag.base_index = Some(base_index);
    diag.reference_index = Some(reference_index);
    (Some(round_to(yoy, 3)), diag)
}

pub fn lead_signal(mom: Option<f64>) -> LeadSignal {
    match mom {
        None => LeadSignal::InsufficientData,
        Some(v) if v > LEAD_SIGNAL_BAND => LeadSignal::Up,
        Some(v) if v < -LEAD_SIGNAL_BAND => LeadSignal::Down,
        Some(_) => LeadSignal::Flat,
    }
}

/// Nowcast YoY minus consensus YoY, when both exist.
pub fn deviation(nowcast_yoy: Option<f64>, consensus_yoy: Option<f64>) -> Option<f64> {
    Some(round_to(nowcast_yoy? - consensus_yoy?, 3))
}
