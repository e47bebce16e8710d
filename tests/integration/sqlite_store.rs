use chrono::Utc;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::common::fake_provider::FakeProvider;
use crate::common::fixtures::growing_company;
use crate::common::test_config;
use industry_screener::analysis::aggregate_top;
use industry_screener::data_collector::DataCollector;
use industry_screener::database::DatabaseManager;
use industry_screener::models::Metric;
use industry_screener::tables;

#[test_log::test(tokio::test)]
async fn test_sqlite_mirrors_csv_tables() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let provider = FakeProvider::new()
        .with_company(growing_company("TCS.NS", "Information Technology Services", 0.09, 5))
        .with_company(growing_company("INFY.NS", "Information Technology Services", 0.11, 5))
        .with_company(growing_company("SBIN.NS", "Banks - Regional", 0.14, 3));

    let result = DataCollector::new(provider, &config)
        .collect(&["TCS.NS", "INFY.NS", "SBIN.NS"])
        .await;
    let cutoffs = aggregate_top(&result.records, &config.percentiles, &config.screen_metrics);

    tables::write_metrics(&config.metrics_path(), &result.records).unwrap();
    tables::write_cutoffs(&config.cutoffs_path(), &cutoffs, &config.screen_metrics).unwrap();

    let db_path = dir.path().join("screener.db");
    let db = DatabaseManager::new(&db_path).await.unwrap();
    db.replace_metrics(&result.records).await.unwrap();
    db.replace_cutoffs(&cutoffs, &config.screen_metrics).await.unwrap();
    db.set_last_run(Utc::now()).await.unwrap();

    assert_eq!(
        db.load_metrics().await.unwrap(),
        tables::read_metrics(&config.metrics_path()).unwrap()
    );
    assert_eq!(
        db.load_cutoffs().await.unwrap(),
        tables::read_cutoffs(&config.cutoffs_path()).unwrap()
    );

    let (metric_rows, cutoff_rows, last_run) = db.get_stats().await.unwrap();
    assert_eq!(metric_rows, 3);
    assert_eq!(cutoff_rows, 2 * config.percentiles.len());
    assert!(last_run.is_some());
    db.close().await;
}

#[test_log::test(tokio::test)]
async fn test_rerun_replaces_cutoff_columns() {
    let dir = tempdir().unwrap();
    let db = DatabaseManager::new(&dir.path().join("screener.db")).await.unwrap();
    let records = vec![];

    db.replace_cutoffs(
        &aggregate_top(&records, &[1], &[Metric::RevenueCagr, Metric::Roce]),
        &[Metric::RevenueCagr, Metric::Roce],
    )
    .await
    .unwrap();
    db.replace_cutoffs(&[], &[Metric::EpsCagr]).await.unwrap();

    let (metrics, cutoffs) = db.load_cutoffs().await.unwrap();
    assert_eq!(metrics, vec![Metric::EpsCagr]);
    assert!(cutoffs.is_empty());
}
