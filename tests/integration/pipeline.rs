//! Qualify → ingest → cutoffs through the on-disk tables, driven by an in-memory provider

use pretty_assertions::assert_eq;
use std::fs;
use tempfile::tempdir;

use crate::common::fake_provider::FakeProvider;
use crate::common::fixtures::{empty_company, growing_company};
use crate::common::{logging, test_config};
use industry_screener::analysis::aggregate_with_direction;
use industry_screener::api::ProviderError;
use industry_screener::data_collector::{DataCollector, RunSummary};
use industry_screener::models::{Config, Metric};
use industry_screener::tables;
use industry_screener::universe;

fn sample_provider() -> FakeProvider {
    FakeProvider::new()
        .with_company(growing_company("A.NS", "Software", 0.10, 4))
        .with_company(growing_company("B.NS", "Software", 0.30, 4))
        .with_company(growing_company("C.NS", "Retail", 0.05, 4))
        .with_company(growing_company("FLAKY.NS", "Banks", 0.08, 4))
        .with_flaky("FLAKY.NS", 1)
        .with_failure("GONE.NS", ProviderError::NotFound("GONE.NS".to_string()))
        .with_failure("DOWN.NS", ProviderError::Timeout)
}

fn screen_config(data_dir: &std::path::Path) -> Config {
    Config {
        min_years: 4,
        percentiles: vec![50],
        screen_metrics: vec![Metric::RevenueCagr],
        ..test_config(data_dir)
    }
}

#[test_log::test(tokio::test)]
async fn test_end_to_end_industry_medians() {
    logging::log_test_step("Collecting metrics for six tickers");
    let dir = tempdir().unwrap();
    let config = screen_config(dir.path());
    let tickers = ["A.NS", "B.NS", "GONE.NS", "C.NS", "FLAKY.NS", "DOWN.NS"];

    let collector = DataCollector::new(sample_provider(), &config);
    let result = collector.collect(&tickers).await;

    assert_eq!(
        result.summary,
        RunSummary {
            total_tickers: 6,
            processed: 5,
            no_data: 1,
            no_data_tickers: vec!["GONE.NS".to_string()],
            failed: 1,
            failed_tickers: vec!["DOWN.NS".to_string()],
        }
    );

    let gone = result
        .records
        .iter()
        .find(|r| r.ticker == "GONE.NS")
        .expect("permanent failures keep their row");
    assert_eq!(gone.industry, None);
    assert!(Metric::ALL.iter().all(|&m| gone.value(m).is_none()));
    assert!(result.records.iter().all(|r| r.ticker != "DOWN.NS"));

    tables::write_metrics(&config.metrics_path(), &result.records).unwrap();
    let records = tables::read_metrics(&config.metrics_path()).unwrap();
    assert_eq!(records, result.records);

    logging::log_test_step("Aggregating cutoffs");
    let cutoffs = aggregate_with_direction(
        &records,
        &config.percentiles,
        &config.screen_metrics,
        config.cutoff_direction,
    );
    tables::write_cutoffs(&config.cutoffs_path(), &cutoffs, &config.screen_metrics).unwrap();
    let (metrics, stored) = tables::read_cutoffs(&config.cutoffs_path()).unwrap();
    logging::log_test_data("Cutoffs", &stored);

    assert_eq!(metrics, vec![Metric::RevenueCagr]);
    let cell = |industry: &str| {
        stored
            .iter()
            .find(|c| c.industry == industry && c.percentile == 50)
            .and_then(|c| c.value(Metric::RevenueCagr))
            .unwrap()
    };
    assert!((cell("Software") - 0.20).abs() < 1e-9);
    assert!((cell("Retail") - 0.05).abs() < 1e-9);
    assert!((cell("Banks") - 0.08).abs() < 1e-9);
}

#[test_log::test(tokio::test)]
async fn test_cutoffs_table_is_byte_identical_on_rerun() {
    let dir = tempdir().unwrap();
    let config = Config {
        percentiles: vec![1, 5, 10],
        screen_metrics: vec![Metric::RevenueCagr, Metric::NetProfitMarginAvg],
        ..screen_config(dir.path())
    };

    let collector = DataCollector::new(sample_provider(), &config);
    let result = collector.collect(&["A.NS", "B.NS", "C.NS"]).await;
    tables::write_metrics(&config.metrics_path(), &result.records).unwrap();

    let run = |path: &std::path::Path| {
        let records = tables::read_metrics(&config.metrics_path()).unwrap();
        let cutoffs = aggregate_with_direction(
            &records,
            &config.percentiles,
            &config.screen_metrics,
            config.cutoff_direction,
        );
        tables::write_cutoffs(path, &cutoffs, &config.screen_metrics).unwrap();
        fs::read(path).unwrap()
    };

    let first = run(&config.cutoffs_path());
    let second = run(&config.cutoffs_path());
    assert_eq!(first, second);
    assert_eq!(
        String::from_utf8(first).unwrap().lines().count(),
        1 + 2 * 3,
        "header plus one row per (industry, percentile)"
    );
}

#[test_log::test(tokio::test)]
async fn test_qualified_file_feeds_ingest() {
    let dir = tempdir().unwrap();
    let config = screen_config(dir.path());
    let provider = sample_provider().with_company(empty_company("SHELL.NS"));
    let candidates: Vec<String> = ["A.NS", "SHELL.NS", "GONE.NS", "C.NS"]
        .iter()
        .map(|t| t.to_string())
        .collect();

    // growing_company reports fiscal years 2020..=2023
    let required = universe::required_years(2024, config.min_years);
    let result = universe::qualify(&provider, &candidates, &required, &config.retry).await;
    tables::write_coverage(&config.qualified_path(), &result.qualified).unwrap();
    tables::write_coverage(&config.excluded_path(), &result.excluded).unwrap();

    let qualified = tables::read_ticker_column(&config.qualified_path(), "YF_Ticker").unwrap();
    let excluded = tables::read_ticker_column(&config.excluded_path(), "YF_Ticker").unwrap();
    assert_eq!(qualified, vec!["A.NS", "C.NS"]);
    assert_eq!(excluded, vec!["SHELL.NS", "GONE.NS"]);

    let collector = DataCollector::new(provider, &config);
    let metrics = collector.collect(&qualified).await;
    assert_eq!(metrics.summary.processed, 2);
    assert!(metrics.records.iter().all(|r| r.revenue_cagr.is_some()));
}
