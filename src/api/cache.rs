use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{FinancialDataProvider, ProviderError};
use crate::models::CompanyFinancials;

/// Bounded, time-limited cache of successful provider fetches keyed by ticker
pub struct CachedProvider<P> {
    inner: P,
    cache: Cache<String, Arc<CompanyFinancials>>,
}

impl<P: FinancialDataProvider> CachedProvider<P> {
    pub fn new(inner: P, capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        Self { inner, cache }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn cached_entries(&self) -> u64 {
        self.cache.entry_count()
    }
}

fn cache_key(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}

#[async_trait]
impl<P: FinancialDataProvider> FinancialDataProvider for CachedProvider<P> {
    async fn fetch_company(&self, ticker: &str) -> Result<CompanyFinancials, ProviderError> {
        let key = cache_key(ticker);
        if let Some(hit) = self.cache.get(&key).await {
            debug!("Cache hit for {}", key);
            let mut company = hit.as_ref().clone();
            company.ticker = ticker.to_string();
            return Ok(company);
        }

        let company = self.inner.fetch_company(ticker).await?;
        self.cache.insert(key, Arc::new(company.clone())).await;
        Ok(company)
    }
}
