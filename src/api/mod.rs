use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::collections::BTreeSet;
use std::num::NonZeroU32;
use thiserror::Error;

use crate::models::CompanyFinancials;

pub mod cache;
pub mod yahoo_client;

pub use cache::CachedProvider;
pub use yahoo_client::YahooClient;

/// Failures talking to the market-data provider
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("rate limited by provider")]
    RateLimited,
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("ticker {0} not found")]
    NotFound(String),
    #[error("failed to decode provider response: {0}")]
    Decode(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Whether retrying the same request later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited | ProviderError::Timeout | ProviderError::Network(_) => true,
            ProviderError::Http { status, .. } => *status >= 500,
            ProviderError::NotFound(_)
            | ProviderError::Decode(_)
            | ProviderError::InvalidRequest(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ProviderError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}

/// Source of annual statements and company profile data
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FinancialDataProvider: Send + Sync {
    /// Annual income statement, cash flow, balance sheet and profile for one ticker.
    ///
    /// A ticker the provider knows but has no statements for returns empty tables.
    async fn fetch_company(&self, ticker: &str) -> Result<CompanyFinancials, ProviderError>;

    /// Calendar years with income statement data
    async fn annual_report_years(&self, ticker: &str) -> Result<BTreeSet<i32>, ProviderError> {
        Ok(self.fetch_company(ticker).await?.income_statement.report_years())
    }
}

/// Paces outgoing requests evenly at a fixed rate
pub struct ApiRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl ApiRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(per_minute).allow_burst(NonZeroU32::MIN);

        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}
