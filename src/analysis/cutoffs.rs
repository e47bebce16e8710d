use std::collections::BTreeMap;

use crate::models::{CutoffDirection, CutoffRecord, Metric, MetricRecord};

/// Quantile of `values` at `level` percent, interpolating linearly between closest ranks.
///
/// Returns `None` for an empty input. Non-finite values are ignored.
pub fn quantile(values: &[f64], level: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let rank = (sorted.len() - 1) as f64 * (level / 100.0).clamp(0.0, 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Group records by industry, ignoring records without one.
fn by_industry(records: &[MetricRecord]) -> BTreeMap<&str, Vec<&MetricRecord>> {
    let mut groups: BTreeMap<&str, Vec<&MetricRecord>> = BTreeMap::new();
    for record in records {
        if let Some(industry) = record.industry.as_deref().filter(|i| !i.trim().is_empty()) {
            groups.entry(industry).or_default().push(record);
        }
    }
    groups
}

/// Compute exactly the requested quantile of each metric per (industry, percentile).
///
/// Rows come out ordered by industry name, then by the order of `percentiles`.
pub fn aggregate(
    records: &[MetricRecord],
    percentiles: &[u8],
    metrics: &[Metric],
) -> Vec<CutoffRecord> {
    aggregate_with_direction(records, percentiles, metrics, CutoffDirection::Bottom)
}

/// Cutoffs for "top `p` percent" screening: the `(100 - p)`-th quantile, labelled `p`.
pub fn aggregate_top(
    records: &[MetricRecord],
    percentiles: &[u8],
    metrics: &[Metric],
) -> Vec<CutoffRecord> {
    aggregate_with_direction(records, percentiles, metrics, CutoffDirection::Top)
}

pub fn aggregate_with_direction(
    records: &[MetricRecord],
    percentiles: &[u8],
    metrics: &[Metric],
    direction: CutoffDirection,
) -> Vec<CutoffRecord> {
    let mut cutoffs = Vec::new();

    for (industry, group) in by_industry(records) {
        let defined: Vec<(Metric, Vec<f64>)> = metrics
            .iter()
            .map(|&metric| {
                let values = group.iter().filter_map(|r| r.value(metric)).collect();
                (metric, values)
            })
            .collect();

        for &percentile in percentiles {
            let level = match direction {
                CutoffDirection::Top => 100.0 - f64::from(percentile),
                CutoffDirection::Bottom => f64::from(percentile),
            };
            cutoffs.push(CutoffRecord {
                industry: industry.to_string(),
                percentile,
                values: defined
                    .iter()
                    .map(|(metric, values)| (*metric, quantile(values, level)))
                    .collect(),
            });
        }
    }

    cutoffs
}
