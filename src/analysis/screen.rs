//! Join metric records to their industry's cutoff row and keep the tickers that clear every
//! selected threshold.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::{CutoffDirection, CutoffRecord, Metric, MetricRecord};

/// One metric to screen on and the percentile whose cutoff it must clear
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSelection {
    pub metric: Metric,
    pub percentile: u8,
}

#[derive(Debug, Clone, Default)]
pub struct ScreenCriteria {
    pub selections: Vec<MetricSelection>,
    /// Restrict to one industry; `None` screens every industry against its own cutoffs
    pub industry: Option<String>,
    /// Inclusive market-cap bounds
    pub market_cap_range: Option<(f64, f64)>,
    pub direction: CutoffDirection,
}

/// A ticker clears a cutoff only when both values are defined.
pub fn passes(value: Option<f64>, cutoff: Option<f64>, direction: CutoffDirection) -> bool {
    match (value, cutoff) {
        (Some(value), Some(cutoff)) => match direction {
            CutoffDirection::Top => value >= cutoff,
            CutoffDirection::Bottom => value <= cutoff,
        },
        _ => false,
    }
}

/// Cutoff rows keyed by (industry, percentile)
pub struct CutoffIndex<'a> {
    rows: HashMap<(&'a str, u8), &'a CutoffRecord>,
}

impl<'a> CutoffIndex<'a> {
    pub fn new(cutoffs: &'a [CutoffRecord]) -> Self {
        let rows = cutoffs
            .iter()
            .map(|row| ((row.industry.as_str(), row.percentile), row))
            .collect();
        Self { rows }
    }

    pub fn get(&self, industry: &str, percentile: u8) -> Option<&'a CutoffRecord> {
        self.rows.get(&(industry, percentile)).copied()
    }

    /// Cutoff value for one metric, `None` if the row or the cell is missing
    pub fn cutoff(&self, industry: &str, metric: Metric, percentile: u8) -> Option<f64> {
        self.get(industry, percentile).and_then(|row| row.value(metric))
    }
}

/// Apply `criteria` and return the passing records, best first.
pub fn screen(
    records: &[MetricRecord],
    cutoffs: &[CutoffRecord],
    criteria: &ScreenCriteria,
) -> Vec<MetricRecord> {
    let index = CutoffIndex::new(cutoffs);

    let mut passing: Vec<MetricRecord> = records
        .iter()
        .filter(|record| match &criteria.industry {
            Some(industry) => record.industry.as_deref() == Some(industry.as_str()),
            None => true,
        })
        .filter(|record| match criteria.market_cap_range {
            Some((low, high)) => record.market_cap.is_some_and(|cap| cap >= low && cap <= high),
            None => true,
        })
        .filter(|record| {
            let Some(industry) = record.industry.as_deref() else {
                return false;
            };
            criteria.selections.iter().all(|selection| {
                let cutoff = index.cutoff(industry, selection.metric, selection.percentile);
                passes(record.value(selection.metric), cutoff, criteria.direction)
            })
        })
        .cloned()
        .collect();

    passing.sort_by(|a, b| rank_order(a, b, &criteria.selections));
    passing
}

/// Descending by each selected metric, then market cap, then ticker ascending
fn rank_order(a: &MetricRecord, b: &MetricRecord, selections: &[MetricSelection]) -> Ordering {
    let descending = |x: Option<f64>, y: Option<f64>| match (x, y) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    selections
        .iter()
        .map(|s| descending(a.value(s.metric), b.value(s.metric)))
        .chain(std::iter::once(descending(a.market_cap, b.market_cap)))
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or_else(|| a.ticker.cmp(&b.ticker))
}

/// Distinct industries present in the metrics table, sorted
pub fn known_industries(records: &[MetricRecord]) -> Vec<String> {
    let mut industries: Vec<String> = records
        .iter()
        .filter_map(|r| r.industry.clone())
        .filter(|i| !i.trim().is_empty())
        .collect();
    industries.sort();
    industries.dedup();
    industries
}

/// Match a user-typed industry against known names: case-insensitive exact match first,
/// then the best fuzzy match.
pub fn resolve_industry(query: &str, known: &[String]) -> Option<String> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }
    if let Some(exact) = known.iter().find(|k| k.eq_ignore_ascii_case(query)) {
        return Some(exact.clone());
    }

    let matcher = SkimMatcherV2::default();
    known
        .iter()
        .filter_map(|k| matcher.fuzzy_match(k, query).map(|score| (score, k)))
        .max_by(|(sa, ka), (sb, kb)| sa.cmp(sb).then_with(|| kb.cmp(ka)))
        .map(|(_, k)| k.clone())
}
