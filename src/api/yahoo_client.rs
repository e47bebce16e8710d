use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};
use url::Url;

use super::{ApiRateLimiter, FinancialDataProvider, ProviderError};
use crate::models::{CompanyFinancials, CompanyInfo, Config, FinancialSeries, StatementTable};

/// Annual series requested from the fundamentals timeseries endpoint, per statement
const INCOME_TYPES: &[&str] = &[
    "TotalRevenue",
    "OperatingRevenue",
    "NetIncome",
    "NetIncomeCommonStockholders",
    "DilutedEPS",
    "BasicEPS",
    "EBIT",
    "OperatingIncome",
];
const CASH_FLOW_TYPES: &[&str] = &["OperatingCashFlow"];
const BALANCE_SHEET_TYPES: &[&str] = &["TotalAssets", "CurrentLiabilities"];

/// How far back statement history is requested
const HISTORY_YEARS: i64 = 10;

#[derive(Debug, Deserialize)]
struct TimeseriesEnvelope {
    timeseries: TimeseriesBody,
}

#[derive(Debug, Deserialize)]
struct TimeseriesBody {
    #[serde(default)]
    result: Option<Vec<TimeseriesResult>>,
}

#[derive(Debug, Deserialize)]
struct TimeseriesResult {
    meta: TimeseriesMeta,
    #[serde(flatten)]
    series: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct TimeseriesMeta {
    #[serde(rename = "type", default)]
    kind: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ReportedPoint {
    #[serde(rename = "asOfDate")]
    as_of_date: NaiveDate,
    #[serde(rename = "reportedValue")]
    reported_value: Option<RawNumber>,
}

#[derive(Debug, Deserialize)]
struct RawNumber {
    raw: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryEnvelope {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryBody,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryBody {
    #[serde(default)]
    result: Option<Vec<QuoteSummaryResult>>,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResult {
    #[serde(rename = "assetProfile")]
    asset_profile: Option<AssetProfile>,
    price: Option<PriceModule>,
}

#[derive(Debug, Deserialize)]
struct AssetProfile {
    industry: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceModule {
    #[serde(rename = "marketCap")]
    market_cap: Option<RawNumber>,
}

/// Yahoo Finance client for annual fundamentals and company profiles
pub struct YahooClient {
    client: Client,
    base_url: Url,
    rate_limiter: ApiRateLimiter,
}

impl YahooClient {
    /// Create a new Yahoo client
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = Url::parse(&config.yahoo_base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("Yahoo base URL {} cannot carry a path", base_url));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent("Mozilla/5.0 (compatible; industry-screener/1.0)")
            .build()?;

        info!("Yahoo client targeting {}", base_url);
        Ok(Self {
            client,
            base_url,
            rate_limiter: ApiRateLimiter::new(config.rate_limit_per_minute),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::InvalidRequest(format!("bad base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Make a rate-limited GET request and decode the JSON body
    async fn get_json(&self, url: Url, ticker: &str) -> Result<Value, ProviderError> {
        self.rate_limiter.wait().await;
        debug!("Making request to: {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(ticker.to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    /// Fetch annual timeseries for the given types, keyed by provider type name
    async fn fetch_timeseries(
        &self,
        ticker: &str,
        types: &[&str],
    ) -> Result<HashMap<String, FinancialSeries>, ProviderError> {
        let now = Utc::now();
        let start = now - ChronoDuration::days(365 * HISTORY_YEARS);
        let type_param = types
            .iter()
            .map(|t| format!("annual{}", t))
            .collect::<Vec<_>>()
            .join(",");

        let mut url = self.endpoint(&[
            "ws",
            "fundamentals-timeseries",
            "v1",
            "finance",
            "timeseries",
            ticker,
        ])?;
        url.query_pairs_mut()
            .append_pair("symbol", ticker)
            .append_pair("type", &type_param)
            .append_pair("period1", &start.timestamp().to_string())
            .append_pair("period2", &now.timestamp().to_string());

        let json = self.get_json(url, ticker).await?;
        parse_timeseries(json)
    }

    async fn fetch_info(&self, ticker: &str) -> Result<CompanyInfo, ProviderError> {
        let mut url = self.endpoint(&["v10", "finance", "quoteSummary", ticker])?;
        url.query_pairs_mut().append_pair("modules", "assetProfile,price");

        match self.get_json(url, ticker).await {
            Ok(json) => parse_quote_summary(json),
            Err(ProviderError::NotFound(_)) => {
                warn!("No profile for {}, industry and market cap left empty", ticker);
                Ok(CompanyInfo::default())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl FinancialDataProvider for YahooClient {
    async fn fetch_company(&self, ticker: &str) -> Result<CompanyFinancials, ProviderError> {
        let all_types: Vec<&str> = INCOME_TYPES
            .iter()
            .chain(CASH_FLOW_TYPES)
            .chain(BALANCE_SHEET_TYPES)
            .copied()
            .collect();
        let mut series = self.fetch_timeseries(ticker, &all_types).await?;
        let info = self.fetch_info(ticker).await?;

        let mut take = |types: &[&str]| {
            let mut table = StatementTable::new();
            for kind in types {
                if let Some(values) = series.remove(*kind) {
                    table.insert(statement_label(kind), values);
                }
            }
            table
        };

        Ok(CompanyFinancials {
            ticker: ticker.to_string(),
            income_statement: take(INCOME_TYPES),
            cash_flow: take(CASH_FLOW_TYPES),
            balance_sheet: take(BALANCE_SHEET_TYPES),
            info,
        })
    }

    async fn annual_report_years(&self, ticker: &str) -> Result<BTreeSet<i32>, ProviderError> {
        let mut table = StatementTable::new();
        for (kind, values) in self.fetch_timeseries(ticker, INCOME_TYPES).await? {
            table.insert(statement_label(&kind), values);
        }
        Ok(table.report_years())
    }
}

/// Turn a timeseries response into series keyed by type name without the `annual` prefix
fn parse_timeseries(json: Value) -> Result<HashMap<String, FinancialSeries>, ProviderError> {
    let envelope: TimeseriesEnvelope =
        serde_json::from_value(json).map_err(|e| ProviderError::Decode(e.to_string()))?;

    let mut out = HashMap::new();
    for result in envelope.timeseries.result.unwrap_or_default() {
        let Some(kind) = result.meta.kind.first() else {
            continue;
        };
        let Some(raw_points) = result.series.get(kind) else {
            continue; // type requested but nothing reported
        };
        let points: Vec<Option<ReportedPoint>> = serde_json::from_value(raw_points.clone())
            .map_err(|e| ProviderError::Decode(format!("{}: {}", kind, e)))?;

        let series = FinancialSeries::new(points.into_iter().flatten().map(|p| {
            (p.as_of_date, p.reported_value.and_then(|v| v.raw))
        }));
        let name = kind.strip_prefix("annual").unwrap_or(kind).to_string();
        out.insert(name, series);
    }
    Ok(out)
}

fn parse_quote_summary(json: Value) -> Result<CompanyInfo, ProviderError> {
    let envelope: QuoteSummaryEnvelope =
        serde_json::from_value(json).map_err(|e| ProviderError::Decode(e.to_string()))?;

    let Some(result) = envelope
        .quote_summary
        .result
        .and_then(|results| results.into_iter().next())
    else {
        return Ok(CompanyInfo::default());
    };

    Ok(CompanyInfo {
        industry: result
            .asset_profile
            .and_then(|p| p.industry)
            .filter(|i| !i.trim().is_empty()),
        market_cap: result
            .price
            .and_then(|p| p.market_cap)
            .and_then(|m| m.raw),
    })
}

/// `TotalRevenue` -> `Total Revenue`, `DilutedEPS` -> `Diluted EPS`, `EBIT` -> `EBIT`
pub fn statement_label(kind: &str) -> String {
    let chars: Vec<char> = kind.chars().collect();
    let mut label = String::with_capacity(kind.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && c.is_uppercase() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                label.push(' ');
            }
        }
        label.push(c);
    }
    label
}
