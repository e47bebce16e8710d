//! Metric extraction over whole companies, including provider label fallbacks

use pretty_assertions::assert_eq;

use crate::common::fixtures::{growing_company, yearly, CompanyBuilder};
use industry_screener::analysis::metrics::cagr;
use industry_screener::analysis::{extract_company, resolve_line_items, LineItem};

fn assert_close(actual: Option<f64>, expected: f64) {
    let actual = actual.expect("value should be defined");
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn test_revenue_growth_is_recovered_exactly() {
    let company = growing_company("INFY.NS", "Information Technology Services", 0.12, 5);

    let record = extract_company(&company, 4);

    assert_close(record.revenue_cagr, 0.12);
    assert_close(record.net_income_cagr, 0.12);
    assert_close(record.net_profit_margin_avg, 0.1);
    assert_eq!(record.industry.as_deref(), Some("Information Technology Services"));
    assert_eq!(record.market_cap, Some(5.0e10));
}

#[test]
fn test_negative_point_makes_growth_undefined() {
    assert_eq!(cagr(&yearly(2021, &[100.0, -5.0, 120.0]), 3), None);
    assert_eq!(cagr(&yearly(2021, &[100.0]), 1), None);
}

#[test]
fn test_short_history_is_undefined_not_zero() {
    let company = growing_company("NEW.NS", "Software", 0.2, 2);

    let record = extract_company(&company, 4);

    assert_eq!(record.revenue_cagr, None);
    assert_eq!(record.net_profit_margin_avg, None);
}

#[test]
fn test_fallback_labels_and_margin_average() {
    let company = CompanyBuilder::new("HDFCBANK.NS")
        .industry("  Banks - Regional  ")
        .income("Operating Revenue", 2021, &[100.0, 100.0, 100.0])
        .income("Net Income Common Stockholders", 2021, &[10.0, 20.0, 30.0])
        .income("Operating Income", 2021, &[15.0, 18.0, 21.0])
        .cash_flow("Operating Cash Flow", 2021, &[40.0, 44.0, 48.4])
        .balance("Total Assets", 2021, &[200.0, 200.0, 200.0])
        .balance("Current Liabilities", 2021, &[50.0, 50.0, 50.0])
        .build();

    let series = resolve_line_items(&company);
    assert_eq!(series[&LineItem::Revenue].len(), 3);
    assert!(series[&LineItem::Eps].is_empty());

    let record = extract_company(&company, 3);
    assert_eq!(record.industry.as_deref(), Some("Banks - Regional"));
    assert_close(record.net_profit_margin_avg, 0.20);
    assert_close(record.operating_cashflow_cagr, 0.1);
    assert_close(record.roce, 0.12);
    assert_eq!(record.eps_cagr, None);
}
