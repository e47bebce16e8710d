use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Annual values of one statement line item, ascending by period-end date.
///
/// Periods may be missing entirely and a present period may carry no value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinancialSeries {
    points: Vec<(NaiveDate, Option<f64>)>,
}

impl FinancialSeries {
    /// Build a series from unordered points. A later point for the same date wins.
    pub fn new(points: impl IntoIterator<Item = (NaiveDate, Option<f64>)>) -> Self {
        let by_date: BTreeMap<NaiveDate, Option<f64>> = points.into_iter().collect();
        Self {
            points: by_date.into_iter().collect(),
        }
    }

    /// Build a fully populated series.
    pub fn from_values(points: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        Self::new(points.into_iter().map(|(date, value)| (date, Some(value))))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[(NaiveDate, Option<f64>)] {
        &self.points
    }

    /// Points with a finite value, still ascending by date.
    pub fn defined(&self) -> Vec<(NaiveDate, f64)> {
        self.points
            .iter()
            .filter_map(|(date, value)| match value {
                Some(v) if v.is_finite() => Some((*date, *v)),
                _ => None,
            })
            .collect()
    }
}

/// One statement (income, cash flow or balance sheet) keyed by provider label.
#[derive(Debug, Clone, Default)]
pub struct StatementTable {
    rows: HashMap<String, FinancialSeries>,
}

impl StatementTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, series: FinancialSeries) {
        self.rows.insert(label.into(), series);
    }

    pub fn with_row(mut self, label: impl Into<String>, series: FinancialSeries) -> Self {
        self.insert(label, series);
        self
    }

    pub fn get(&self, label: &str) -> Option<&FinancialSeries> {
        self.rows.get(label)
    }

    /// First row present under any of `labels`, in order, or an empty series.
    pub fn row(&self, labels: &[&str]) -> FinancialSeries {
        labels
            .iter()
            .find_map(|label| self.rows.get(*label))
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    /// Calendar years of every period that carries at least one defined value.
    pub fn report_years(&self) -> BTreeSet<i32> {
        self.rows
            .values()
            .flat_map(|series| series.defined())
            .map(|(date, _)| date.year())
            .collect()
    }
}

/// Company profile fields the pipeline needs from the provider
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyInfo {
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
}

/// Everything fetched from the provider for one ticker
#[derive(Debug, Clone, Default)]
pub struct CompanyFinancials {
    pub ticker: String,
    pub income_statement: StatementTable,
    pub cash_flow: StatementTable,
    pub balance_sheet: StatementTable,
    pub info: CompanyInfo,
}

/// Derived ratios, named exactly like their table columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    RevenueCagr,
    NetProfitMarginAvg,
    NetIncomeCagr,
    EpsCagr,
    OperatingCashflowCagr,
    Roce,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::RevenueCagr,
        Metric::NetProfitMarginAvg,
        Metric::NetIncomeCagr,
        Metric::EpsCagr,
        Metric::OperatingCashflowCagr,
        Metric::Roce,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            Metric::RevenueCagr => "revenue_cagr",
            Metric::NetProfitMarginAvg => "net_profit_margin_avg",
            Metric::NetIncomeCagr => "net_income_cagr",
            Metric::EpsCagr => "eps_cagr",
            Metric::OperatingCashflowCagr => "operating_cashflow_cagr",
            Metric::Roce => "roce",
        }
    }

    /// Compound growth rates need at least two points in their window
    pub fn is_growth(&self) -> bool {
        !matches!(self, Metric::NetProfitMarginAvg | Metric::Roce)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Metric {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Metric::ALL
            .into_iter()
            .find(|metric| metric.column() == name)
            .ok_or_else(|| ConfigError::UnknownMetric(name.to_string()))
    }
}

/// One row of the Metrics Table. `None` means the ratio is undefined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub ticker: String,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
    pub revenue_cagr: Option<f64>,
    pub net_profit_margin_avg: Option<f64>,
    pub net_income_cagr: Option<f64>,
    pub eps_cagr: Option<f64>,
    pub operating_cashflow_cagr: Option<f64>,
    pub roce: Option<f64>,
}

impl MetricRecord {
    /// A record with every ratio undefined
    pub fn undefined(ticker: impl Into<String>, industry: Option<String>) -> Self {
        Self {
            ticker: ticker.into(),
            industry,
            market_cap: None,
            revenue_cagr: None,
            net_profit_margin_avg: None,
            net_income_cagr: None,
            eps_cagr: None,
            operating_cashflow_cagr: None,
            roce: None,
        }
    }

    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::RevenueCagr => self.revenue_cagr,
            Metric::NetProfitMarginAvg => self.net_profit_margin_avg,
            Metric::NetIncomeCagr => self.net_income_cagr,
            Metric::EpsCagr => self.eps_cagr,
            Metric::OperatingCashflowCagr => self.operating_cashflow_cagr,
            Metric::Roce => self.roce,
        }
    }
}

/// One row of the Cutoffs Table: per-metric quantiles for an industry.
#[derive(Debug, Clone, PartialEq)]
pub struct CutoffRecord {
    pub industry: String,
    pub percentile: u8,
    /// Screened metrics in column order, `None` when the industry has no defined values
    pub values: Vec<(Metric, Option<f64>)>,
}

impl CutoffRecord {
    pub fn value(&self, metric: Metric) -> Option<f64> {
        self.values
            .iter()
            .find(|(m, _)| *m == metric)
            .and_then(|(_, value)| *value)
    }
}

/// Which tail of an industry's distribution a "percentile" selects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CutoffDirection {
    /// Percentile `p` keeps the top `p` percent, i.e. the `(100 - p)`-th quantile
    #[default]
    Top,
    /// Percentile `p` keeps the bottom `p` percent, i.e. the `p`-th quantile
    Bottom,
}

impl CutoffDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CutoffDirection::Top => "top",
            CutoffDirection::Bottom => "bottom",
        }
    }
}

impl fmt::Display for CutoffDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CutoffDirection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "top" => Ok(CutoffDirection::Top),
            "bottom" => Ok(CutoffDirection::Bottom),
            other => Err(ConfigError::InvalidValue {
                key: "CUTOFF_DIRECTION",
                value: other.to_string(),
            }),
        }
    }
}

/// Bounded retry with exponential backoff for transient provider failures
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_backoff: Duration::from_secs(1),
            multiplier: 2,
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given failed attempt (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown metric '{0}'")]
    UnknownMetric(String),
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("at least one percentile must be selected")]
    NoPercentiles,
    #[error("percentile {0} is outside 1..=99")]
    PercentileOutOfRange(u8),
    #[error("at least one metric must be selected")]
    NoMetrics,
    #[error("minimum years must be at least 1")]
    ZeroMinYears,
    #[error("{0} needs at least 2 years of data, got min_years = {1}")]
    GrowthWindowTooShort(Metric, usize),
    #[error("retry policy needs at least one attempt")]
    ZeroAttempts,
    #[error("no tickers to process")]
    NoTickers,
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub min_years: usize,
    pub percentiles: Vec<u8>,
    pub screen_metrics: Vec<Metric>,
    pub cutoff_direction: CutoffDirection,
    pub rate_limit_per_minute: u32,
    pub retry: RetryPolicy,
    pub cache_ttl: Duration,
    pub cache_capacity: u64,
    pub yahoo_base_url: String,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            min_years: 4,
            percentiles: vec![1, 5, 10],
            screen_metrics: vec![Metric::RevenueCagr, Metric::NetProfitMarginAvg],
            cutoff_direction: CutoffDirection::Top,
            rate_limit_per_minute: 240,
            retry: RetryPolicy::default(),
            cache_ttl: Duration::from_secs(86_400),
            cache_capacity: 10_000,
            yahoo_base_url: "https://query2.finance.yahoo.com".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let defaults = Config::default();
        let retry = RetryPolicy {
            max_attempts: env_parsed("MAX_RETRIES", defaults.retry.max_attempts)?,
            initial_backoff: Duration::from_millis(env_parsed(
                "RETRY_BACKOFF_MS",
                defaults.retry.initial_backoff.as_millis() as u64,
            )?),
            ..defaults.retry.clone()
        };

        let config = Config {
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            min_years: env_parsed("MIN_YEARS", defaults.min_years)?,
            percentiles: match std::env::var("PERCENTILES") {
                Ok(raw) => parse_percentiles(&raw)?,
                Err(_) => defaults.percentiles,
            },
            screen_metrics: match std::env::var("SCREEN_METRICS") {
                Ok(raw) => parse_metrics(&raw)?,
                Err(_) => defaults.screen_metrics,
            },
            cutoff_direction: match std::env::var("CUTOFF_DIRECTION") {
                Ok(raw) => raw.parse()?,
                Err(_) => defaults.cutoff_direction,
            },
            rate_limit_per_minute: env_parsed(
                "RATE_LIMIT_PER_MINUTE",
                defaults.rate_limit_per_minute,
            )?,
            retry,
            cache_ttl: Duration::from_secs(env_parsed(
                "CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )?),
            cache_capacity: env_parsed("CACHE_CAPACITY", defaults.cache_capacity)?,
            yahoo_base_url: std::env::var("YAHOO_BASE_URL").unwrap_or(defaults.yahoo_base_url),
            request_timeout: defaults.request_timeout,
        };

        Ok(config)
    }

    /// Reject settings that would silently produce an empty result set
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_years == 0 {
            return Err(ConfigError::ZeroMinYears);
        }
        if self.percentiles.is_empty() {
            return Err(ConfigError::NoPercentiles);
        }
        if let Some(&p) = self.percentiles.iter().find(|&&p| !(1..=99).contains(&p)) {
            return Err(ConfigError::PercentileOutOfRange(p));
        }
        if self.screen_metrics.is_empty() {
            return Err(ConfigError::NoMetrics);
        }
        if self.min_years < 2 {
            if let Some(&metric) = self.screen_metrics.iter().find(|m| m.is_growth()) {
                return Err(ConfigError::GrowthWindowTooShort(metric, self.min_years));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.data_dir.join("metrics_table.csv")
    }

    pub fn cutoffs_path(&self) -> PathBuf {
        self.data_dir.join("cutoffs_table.csv")
    }

    pub fn qualified_path(&self) -> PathBuf {
        self.data_dir.join("qualified_tickers.csv")
    }

    pub fn excluded_path(&self) -> PathBuf {
        self.data_dir.join("excluded_tickers.csv")
    }

    pub fn nse_list_path(&self) -> PathBuf {
        self.data_dir.join("nse_equity_list.csv")
    }

    pub fn bse_list_path(&self) -> PathBuf {
        self.data_dir.join("bse_equity_list.csv")
    }
}

fn env_parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Parse a comma-separated percentile list such as `1,5,10`
pub fn parse_percentiles(raw: &str) -> Result<Vec<u8>, ConfigError> {
    let mut percentiles = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let p: u8 = part.parse().map_err(|_| ConfigError::InvalidValue {
            key: "PERCENTILES",
            value: part.to_string(),
        })?;
        if !percentiles.contains(&p) {
            percentiles.push(p);
        }
    }
    Ok(percentiles)
}

/// Parse a comma-separated list of metric column names
pub fn parse_metrics(raw: &str) -> Result<Vec<Metric>, ConfigError> {
    let mut metrics = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let metric: Metric = part.parse()?;
        if !metrics.contains(&metric) {
            metrics.push(metric);
        }
    }
    Ok(metrics)
}
