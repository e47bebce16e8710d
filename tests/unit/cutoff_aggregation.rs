use pretty_assertions::assert_eq;

use crate::common::fixtures::metric_record;
use industry_screener::analysis::{aggregate, aggregate_top};
use industry_screener::models::Metric;

#[test]
fn test_software_median_and_single_retail_value() {
    let records = vec![
        metric_record("A.NS", "Software", Some(0.10)),
        metric_record("B.NS", "Software", Some(0.30)),
        metric_record("C.NS", "Retail", Some(0.05)),
    ];

    let cutoffs = aggregate(&records, &[50], &[Metric::RevenueCagr]);

    let cells: Vec<(&str, Option<f64>)> = cutoffs
        .iter()
        .map(|c| (c.industry.as_str(), c.value(Metric::RevenueCagr)))
        .collect();
    assert_eq!(cells.len(), 2);
    assert_eq!(cells[0].0, "Retail");
    assert_eq!(cells[0].1, Some(0.05));
    assert_eq!(cells[1].0, "Software");
    assert!((cells[1].1.unwrap() - 0.20).abs() < 1e-12);
}

#[test]
fn test_industries_are_isolated() {
    let mut records = vec![
        metric_record("A.NS", "Software", Some(0.10)),
        metric_record("B.NS", "Software", Some(0.30)),
        metric_record("C.NS", "Retail", Some(0.05)),
        metric_record("D.NS", "Retail", Some(0.07)),
    ];
    let before = aggregate_top(&records, &[5, 10], &[Metric::RevenueCagr]);

    records[2].revenue_cagr = Some(4.0);
    let after = aggregate_top(&records, &[5, 10], &[Metric::RevenueCagr]);

    let software = |rows: &[industry_screener::models::CutoffRecord]| {
        rows.iter()
            .filter(|r| r.industry == "Software")
            .cloned()
            .collect::<Vec<_>>()
    };
    assert_eq!(software(&before), software(&after));
    assert_ne!(before, after);
}

#[test]
fn test_empty_partition_still_emits_row() {
    let records = vec![
        metric_record("A.NS", "Retail", None),
        metric_record("B.NS", "Retail", None),
    ];

    let cutoffs = aggregate(&records, &[1, 5], &[Metric::RevenueCagr, Metric::Roce]);

    assert_eq!(cutoffs.len(), 2);
    assert!(cutoffs
        .iter()
        .all(|c| c.value(Metric::RevenueCagr).is_none() && c.value(Metric::Roce).is_none()));
}

#[test]
fn test_scaling_one_industry_scales_its_cutoffs() {
    let records: Vec<_> = [
        ("A.NS", "Software", 0.10, 0.21),
        ("B.NS", "Software", 0.30, 0.14),
        ("C.NS", "Software", 0.22, 0.35),
        ("D.NS", "Software", 0.05, 0.18),
        ("E.NS", "Retail", 0.05, 0.09),
        ("F.NS", "Retail", 0.12, 0.11),
    ]
    .into_iter()
    .map(|(ticker, industry, growth, roce)| {
        let mut record = metric_record(ticker, industry, Some(growth));
        record.roce = Some(roce);
        record
    })
    .collect();
    let percentiles = [1, 5, 10, 50, 90];
    let metrics = [Metric::RevenueCagr, Metric::Roce];

    for k in [0.5, 3.0, 1_000.0] {
        let scaled: Vec<_> = records
            .iter()
            .cloned()
            .map(|mut record| {
                if record.industry.as_deref() == Some("Software") {
                    record.revenue_cagr = record.revenue_cagr.map(|v| v * k);
                    record.roce = record.roce.map(|v| v * k);
                }
                record
            })
            .collect();

        for aggregated in [aggregate, aggregate_top] {
            let before = aggregated(&records, &percentiles, &metrics);
            let after = aggregated(&scaled, &percentiles, &metrics);
            assert_eq!(before.len(), after.len());

            for (old, new) in before.iter().zip(&after) {
                assert_eq!((old.industry.as_str(), old.percentile), (new.industry.as_str(), new.percentile));
                let factor = if old.industry == "Software" { k } else { 1.0 };
                for &metric in &metrics {
                    let expected = old.value(metric).unwrap() * factor;
                    let actual = new.value(metric).unwrap();
                    assert!(
                        (actual - expected).abs() <= 1e-9 * expected.abs().max(1.0),
                        "{} p{} {}: {} vs {}",
                        old.industry,
                        old.percentile,
                        metric,
                        actual,
                        expected
                    );
                }
            }
        }
    }
}
