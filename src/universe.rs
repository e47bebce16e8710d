//! Ticker universe: exchange equity lists and annual-coverage qualification.

use anyhow::Result;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use tracing::{info, warn};

use crate::api::FinancialDataProvider;
use crate::data_collector::with_retry;
use crate::models::RetryPolicy;
use crate::tables::read_ticker_column;

/// Yahoo suffixes for the supported exchanges
pub const NSE_SUFFIX: &str = ".NS";
pub const BSE_SUFFIX: &str = ".BO";

/// A ticker and the calendar years its income statement covers
#[derive(Debug, Clone, PartialEq)]
pub struct TickerCoverage {
    pub ticker: String,
    pub years: BTreeSet<i32>,
}

#[derive(Debug, Default)]
pub struct Qualification {
    pub qualified: Vec<TickerCoverage>,
    pub excluded: Vec<TickerCoverage>,
}

/// Provider tickers from the NSE list (`Ticker` column) and BSE list (`TckrSymb` column).
///
/// NSE symbols come first; duplicates keep their first position.
pub fn load_exchange_tickers(nse_list: Option<&Path>, bse_list: Option<&Path>) -> Result<Vec<String>> {
    let mut tickers = Vec::new();

    if let Some(path) = nse_list {
        let symbols = read_ticker_column(path, "Ticker")?;
        info!("📋 Loaded {} NSE symbols from {}", symbols.len(), path.display());
        tickers.extend(symbols.into_iter().map(|s| format!("{}{}", s, NSE_SUFFIX)));
    }
    if let Some(path) = bse_list {
        let symbols = read_ticker_column(path, "TckrSymb")?;
        info!("📋 Loaded {} BSE symbols from {}", symbols.len(), path.display());
        tickers.extend(symbols.into_iter().map(|s| format!("{}{}", s, BSE_SUFFIX)));
    }

    let mut seen = HashSet::new();
    tickers.retain(|t| seen.insert(t.clone()));
    Ok(tickers)
}

/// The `min_years` calendar years before `current_year`
pub fn required_years(current_year: i32, min_years: usize) -> BTreeSet<i32> {
    let span = i32::try_from(min_years).unwrap_or(i32::MAX);
    (current_year.saturating_sub(span)..current_year).collect()
}

/// Split tickers by whether their reported years cover every required year.
///
/// A ticker whose years cannot be fetched is excluded with no years.
pub async fn qualify<P: FinancialDataProvider>(
    provider: &P,
    tickers: &[String],
    required: &BTreeSet<i32>,
    retry: &RetryPolicy,
) -> Qualification {
    info!(
        "🔎 Validating {} tickers against years {:?}",
        tickers.len(),
        required
    );
    let mut result = Qualification::default();

    for (idx, ticker) in tickers.iter().enumerate() {
        let years = match with_retry(retry, ticker, || provider.annual_report_years(ticker)).await {
            Ok(years) => years,
            Err(e) => {
                warn!("[{}] Could not fetch report years: {}", ticker, e);
                BTreeSet::new()
            }
        };

        let coverage = TickerCoverage {
            ticker: ticker.clone(),
            years,
        };
        if required.is_subset(&coverage.years) {
            result.qualified.push(coverage);
        } else {
            result.excluded.push(coverage);
        }

        if (idx + 1) % 50 == 0 || idx + 1 == tickers.len() {
            info!("Validated {}/{} tickers", idx + 1, tickers.len());
        }
    }

    info!(
        "✅ Qualified: {}, Excluded: {}",
        result.qualified.len(),
        result.excluded.len()
    );
    result
}
