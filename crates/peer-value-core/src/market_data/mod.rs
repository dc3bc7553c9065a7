//! Market-data collaborator boundary.
//!
//! The valuation core only sees [`FinancialSnapshot`]s obtained through the
//! [`FinancialDataProvider`] trait. Everything feed-specific (alternative
//! field names, currency normalization, pacing, caching) lives here.

pub mod cache;
pub mod resolve;
pub mod static_provider;

#[cfg(feature = "yahoo")]
pub mod yahoo;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Currency, Money, Rate};

pub use cache::{CacheStats, MarketDataCache};
pub use static_provider::StaticProvider;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One entity's fundamentals at a point in time, with all monetary fields
/// normalized to the reporting currency.
///
/// `success` is true exactly when a price was obtainable and no fetch error
/// was recorded. When it is false every numeric field is unusable, whatever
/// it happens to contain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSnapshot {
    pub ticker: String,
    /// Display name; falls back to the ticker
    #[serde(default)]
    pub name: String,
    /// Current share price
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,
    /// Shares outstanding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debt: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ebitda: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue: Option<Money>,
    /// Earnings per share
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eps: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_income: Option<Money>,
    /// Currency the feed quoted the entity in, before normalization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
    #[serde(default)]
    pub success: bool,
    /// Why the fetch failed, when it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FinancialSnapshot {
    /// A snapshot with only a ticker; `success` follows the price.
    pub fn new(ticker: impl Into<String>) -> Self {
        let ticker = ticker.into();
        Self {
            name: ticker.clone(),
            ticker,
            price: None,
            shares: None,
            debt: None,
            cash: None,
            ebitda: None,
            revenue: None,
            eps: None,
            net_income: None,
            currency: None,
            success: false,
            error: None,
        }
    }

    /// Failure marker for a ticker the provider could not serve.
    pub fn unavailable(ticker: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::new(ticker)
        }
    }

    /// Recompute `success` and fill an empty name. Call after building a
    /// snapshot field by field or after deserializing one.
    pub fn finalize(mut self) -> Self {
        if self.name.trim().is_empty() {
            self.name = self.ticker.clone();
        }
        self.success = self.price.is_some() && self.error.is_none();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_price(mut self, price: Money) -> Self {
        self.price = Some(price);
        self.finalize()
    }

    pub fn with_shares(mut self, shares: Decimal) -> Self {
        self.shares = Some(shares);
        self
    }

    pub fn with_debt(mut self, debt: Money) -> Self {
        self.debt = Some(debt);
        self
    }

    pub fn with_cash(mut self, cash: Money) -> Self {
        self.cash = Some(cash);
        self
    }

    pub fn with_ebitda(mut self, ebitda: Money) -> Self {
        self.ebitda = Some(ebitda);
        self
    }

    pub fn with_revenue(mut self, revenue: Money) -> Self {
        self.revenue = Some(revenue);
        self
    }

    pub fn with_eps(mut self, eps: Money) -> Self {
        self.eps = Some(eps);
        self
    }

    /// Price, but only when the snapshot is usable.
    pub fn usable_price(&self) -> Option<Money> {
        if self.success {
            self.price
        } else {
            None
        }
    }

    /// Human-readable reason for an unusable snapshot.
    pub fn failure_reason(&self) -> String {
        match &self.error {
            Some(e) => e.clone(),
            None if self.price.is_none() => "no price data available".into(),
            None => "snapshot marked unusable".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Provider contract
// ---------------------------------------------------------------------------

/// Source of fundamentals and FX rates.
///
/// Implementations never fail outward: a ticker that cannot be served
/// resolves to a snapshot with `success == false`, and an unknown rate to
/// `None`.
#[async_trait]
pub trait FinancialDataProvider: Send + Sync {
    /// Best-effort fundamentals normalized to the reporting currency.
    async fn get_snapshot(&self, ticker: &str) -> FinancialSnapshot;

    /// Units of `to` per one unit of `from`.
    async fn get_exchange_rate(&self, from: &Currency, to: &Currency) -> Option<Rate>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_success_follows_price() {
        let s = FinancialSnapshot::new("KO").finalize();
        assert!(!s.success);
        assert_eq!(s.name, "KO");

        let s = FinancialSnapshot::new("KO").with_price(dec!(60));
        assert!(s.success);
        assert_eq!(s.usable_price(), Some(dec!(60)));
    }

    #[test]
    fn test_unavailable_never_usable() {
        let mut s = FinancialSnapshot::unavailable("XYZ", "timed out");
        s.price = Some(dec!(10));
        let s = s.finalize();
        assert!(!s.success);
        assert_eq!(s.usable_price(), None);
        assert_eq!(s.failure_reason(), "timed out");
    }

    #[test]
    fn test_deserialized_snapshot_derives_status() {
        let json = r#"{"ticker": "PEP", "price": "150.5", "eps": "6.1"}"#;
        let s: FinancialSnapshot = serde_json::from_str(json).unwrap();
        let s = s.finalize();
        assert!(s.success);
        assert_eq!(s.name, "PEP");
        assert_eq!(s.eps, Some(dec!(6.1)));
    }
}
