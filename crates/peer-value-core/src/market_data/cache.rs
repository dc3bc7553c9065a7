use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::FinancialSnapshot;
use crate::types::{Currency, Rate};

/// Run-scoped memo of snapshots (by ticker) and FX rates (by currency pair).
///
/// Constructed once per top-level invocation and injected into the provider.
/// Each key owns a single-flight cell: concurrent misses for the same key
/// share one fetch. Entries never expire; failures are cached too, so a
/// ticker that failed once is not retried within the same run.
#[derive(Debug, Default)]
pub struct MarketDataCache {
    snapshots: DashMap<String, Arc<OnceCell<FinancialSnapshot>>>,
    rates: DashMap<(Currency, Currency), Arc<OnceCell<Option<Rate>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub snapshots: usize,
    pub rates: usize,
}

impl MarketDataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, ticker: &str) -> Option<FinancialSnapshot> {
        self.snapshots
            .get(&normalize_key(ticker))
            .and_then(|cell| cell.get().cloned())
    }

    /// Cached snapshot for `ticker`, running `fetch` only on a miss.
    ///
    /// Callers arriving while a fetch is in flight wait for it and count
    /// as hits.
    pub async fn snapshot_or_fetch<F, Fut>(&self, ticker: &str, fetch: F) -> FinancialSnapshot
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FinancialSnapshot>,
    {
        let key = normalize_key(ticker);
        // The map guard is released before any await.
        let cell = Arc::clone(&self.snapshots.entry(key.clone()).or_default());
        let (snapshot, fetched) = self.fill(&cell, fetch).await;
        if !fetched {
            tracing::trace!(ticker = %key, "snapshot cache hit");
        }
        snapshot
    }

    /// Cached rate for `from -> to`, running `fetch` only on a miss.
    pub async fn rate_or_fetch<F, Fut>(&self, from: &Currency, to: &Currency, fetch: F) -> Option<Rate>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<Rate>>,
    {
        let key = (from.clone(), to.clone());
        let cell = Arc::clone(&self.rates.entry(key).or_default());
        self.fill(&cell, fetch).await.0
    }

    /// Value of `cell`, initializing it with `fetch` if nobody has yet.
    /// The flag is true when this call ran the fetch.
    async fn fill<T, F, Fut>(&self, cell: &OnceCell<T>, fetch: F) -> (T, bool)
    where
        T: Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut fetched = false;
        let value = cell
            .get_or_init(|| {
                fetched = true;
                fetch()
            })
            .await
            .clone();

        let counter = if fetched { &self.misses } else { &self.hits };
        counter.fetch_add(1, Ordering::Relaxed);
        (value, fetched)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            snapshots: self.snapshots.iter().filter(|c| c.initialized()).count(),
            rates: self.rates.iter().filter(|c| c.initialized()).count(),
        }
    }
}

fn normalize_key(ticker: &str) -> String {
    ticker.trim().to_ascii_uppercase()
}
