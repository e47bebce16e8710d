//! Batch metric collection
//!
//! Tickers are processed one at a time. Each provider fetch runs under the configured
//! [`RetryPolicy`]. A ticker whose transient failures outlast the policy is dropped from the
//! run; a permanent provider error yields a row with every ratio undefined. Both are
//! reported in the [`RunSummary`].

use std::collections::HashSet;
use std::future::Future;
use tracing::{debug, info, warn};

use crate::analysis::extract_company;
use crate::api::{FinancialDataProvider, ProviderError};
use crate::models::{Config, MetricRecord, RetryPolicy};

/// Outcome counts for one batch run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub total_tickers: usize,
    /// Rows written to the metrics table, `no_data` rows included
    pub processed: usize,
    pub no_data: usize,
    pub no_data_tickers: Vec<String>,
    pub failed: usize,
    pub failed_tickers: Vec<String>,
}

/// Metrics table for a run plus its summary
#[derive(Debug)]
pub struct CollectionResult {
    pub records: Vec<MetricRecord>,
    pub summary: RunSummary,
}

/// Run `op` until it succeeds, fails permanently, or the policy runs out of attempts.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    ticker: &str,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempts = 0;

    loop {
        attempts += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempts < policy.max_attempts => {
                let delay = policy.backoff_for(attempts);
                warn!(
                    "[{}] {} (attempt {}/{}), retrying in {:?}",
                    ticker, e, attempts, policy.max_attempts, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Distinct, non-blank tickers in first-seen order
pub fn unique_tickers<S: AsRef<str>>(tickers: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    tickers
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

/// Fetches statements and derives metrics for a batch of tickers
pub struct DataCollector<P> {
    provider: P,
    retry: RetryPolicy,
    min_years: usize,
}

impl<P: FinancialDataProvider> DataCollector<P> {
    pub fn new(provider: P, config: &Config) -> Self {
        Self {
            provider,
            retry: config.retry.clone(),
            min_years: config.min_years,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Fetch and extract one ticker
    pub async fn collect_one(&self, ticker: &str) -> Result<MetricRecord, ProviderError> {
        let company = with_retry(&self.retry, ticker, || self.provider.fetch_company(ticker)).await?;
        let record = extract_company(&company, self.min_years);
        debug!("[{}] extracted metrics: {:?}", ticker, record);
        Ok(record)
    }

    /// Process every ticker sequentially and collect the metrics table
    pub async fn collect<S: AsRef<str>>(&self, tickers: &[S]) -> CollectionResult {
        let tickers = unique_tickers(tickers);
        let total = tickers.len();
        info!("📊 Processing {} tickers", total);

        let mut records = Vec::with_capacity(total);
        let mut summary = RunSummary {
            total_tickers: total,
            ..RunSummary::default()
        };

        for (idx, ticker) in tickers.iter().enumerate() {
            match self.collect_one(ticker).await {
                Ok(record) => {
                    records.push(record);
                    summary.processed += 1;
                }
                Err(e) if !e.is_transient() => {
                    warn!("⚠️ [{}] No usable data ({}), ratios left undefined", ticker, e);
                    records.push(MetricRecord::undefined(ticker.as_str(), None));
                    summary.processed += 1;
                    summary.no_data += 1;
                    summary.no_data_tickers.push(ticker.clone());
                }
                Err(e) => {
                    warn!("❌ [{}] Failed after retries: {}", ticker, e);
                    summary.failed += 1;
                    summary.failed_tickers.push(ticker.clone());
                }
            }

            if (idx + 1) % 50 == 0 || idx + 1 == total {
                info!("Processed {}/{} tickers", idx + 1, total);
            }
        }

        info!(
            "✅ Collection completed: {} processed ({} without data), {} failed",
            summary.processed, summary.no_data, summary.failed
        );
        CollectionResult { records, summary }
    }
}
