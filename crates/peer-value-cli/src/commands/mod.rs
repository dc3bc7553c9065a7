pub mod fund;
pub mod peers;
pub mod run;
pub mod stock;

use std::sync::Arc;
use std::time::Duration;

use peer_value_core::config::MarketDataConfig;
use peer_value_core::market_data::yahoo::{YahooConfig, YahooProvider};
use peer_value_core::market_data::{FinancialDataProvider, MarketDataCache, StaticProvider};
use peer_value_core::Currency;

use crate::input;

/// Global flags shared by every subcommand.
pub struct Context {
    pub currency: Currency,
    pub snapshots: Option<String>,
    pub concurrency: usize,
}

/// The provider for one invocation plus its run-scoped cache.
pub struct MarketData {
    provider: Box<dyn FinancialDataProvider>,
    cache: Option<Arc<MarketDataCache>>,
}

impl MarketData {
    pub fn provider(&self) -> &dyn FinancialDataProvider {
        self.provider.as_ref()
    }

    pub fn log_cache_stats(&self) {
        if let Some(cache) = &self.cache {
            let stats = cache.stats();
            tracing::debug!(
                hits = stats.hits,
                misses = stats.misses,
                snapshots = stats.snapshots,
                rates = stats.rates,
                "market data cache"
            );
        }
    }
}

impl Context {
    pub fn market_data(&self) -> Result<MarketData, Box<dyn std::error::Error>> {
        let settings = MarketDataConfig {
            concurrency: self.concurrency,
            ..MarketDataConfig::default()
        };
        self.market_data_with(&self.currency, &settings)
    }

    /// `--snapshots` wins over the live feed. Snapshot files are taken to be
    /// in the reporting currency already.
    pub fn market_data_with(
        &self,
        currency: &Currency,
        settings: &MarketDataConfig,
    ) -> Result<MarketData, Box<dyn std::error::Error>> {
        if let Some(ref path) = self.snapshots {
            let text = input::file::read_text(path)?;
            let provider = StaticProvider::from_json(&text)?;
            tracing::info!(path = %path, snapshots = provider.len(), "using offline snapshot set");
            return Ok(MarketData {
                provider: Box::new(provider),
                cache: None,
            });
        }

        let cache = Arc::new(MarketDataCache::new());
        let config = YahooConfig {
            reporting_currency: currency.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
            request_delay: Duration::from_millis(settings.request_delay_ms),
            ..YahooConfig::default()
        };
        let provider = YahooProvider::new(config, Arc::clone(&cache))?;
        Ok(MarketData {
            provider: Box::new(provider),
            cache: Some(cache),
        })
    }
}

/// Trim and upper-case tickers, dropping blanks.
pub fn normalize_tickers(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|t| t.trim().to_ascii_uppercase())
        .filter(|t| !t.is_empty())
        .collect()
}
