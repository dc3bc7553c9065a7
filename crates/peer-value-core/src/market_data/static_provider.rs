use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use super::{FinancialDataProvider, FinancialSnapshot};
use crate::error::PeerValueError;
use crate::types::{Currency, Rate};
use crate::PeerValueResult;

/// In-memory provider over a fixed set of snapshots and FX rates.
///
/// Used for offline runs and tests. Tickers are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    snapshots: HashMap<String, FinancialSnapshot>,
    rates: HashMap<(Currency, Currency), Rate>,
}

#[derive(Debug, Deserialize)]
struct SnapshotFile {
    /// Kept raw so an explicit `"success": false` survives `finalize`
    #[serde(default)]
    snapshots: Vec<Value>,
    #[serde(default)]
    rates: Vec<RateEntry>,
}

#[derive(Debug, Deserialize)]
struct RateEntry {
    from: Currency,
    to: Currency,
    rate: Rate,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(mut self, snapshot: FinancialSnapshot) -> Self {
        self.insert(snapshot);
        self
    }

    pub fn insert(&mut self, snapshot: FinancialSnapshot) {
        self.snapshots
            .insert(snapshot.ticker.trim().to_ascii_uppercase(), snapshot);
    }

    pub fn with_rate(mut self, from: Currency, to: Currency, rate: Rate) -> Self {
        self.rates.insert((from, to), rate);
        self
    }

    /// Parse `{"snapshots": [...], "rates": [{"from", "to", "rate"}]}`.
    /// Each snapshot's `success` is derived from its fields, except that an
    /// entry marked `"success": false` stays unusable.
    pub fn from_json(json: &str) -> PeerValueResult<Self> {
        let file: SnapshotFile = serde_json::from_str(json)?;
        let mut provider = Self::new();
        for raw in file.snapshots {
            let marked_unusable = raw.get("success").and_then(Value::as_bool) == Some(false);
            let snapshot: FinancialSnapshot = serde_json::from_value(raw)?;
            if snapshot.ticker.trim().is_empty() {
                return Err(PeerValueError::config("snapshots", "snapshot without ticker"));
            }
            let mut snapshot = snapshot.finalize();
            if marked_unusable {
                snapshot.success = false;
            }
            provider.insert(snapshot);
        }
        for entry in file.rates {
            if entry.rate <= Decimal::ZERO {
                return Err(PeerValueError::config(
                    "snapshots",
                    format!("rate {}->{} must be positive", entry.from, entry.to),
                ));
            }
            provider.rates.insert((entry.from, entry.to), entry.rate);
        }
        Ok(provider)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[async_trait]
impl FinancialDataProvider for StaticProvider {
    async fn get_snapshot(&self, ticker: &str) -> FinancialSnapshot {
        match self.snapshots.get(&ticker.trim().to_ascii_uppercase()) {
            Some(s) => s.clone(),
            None => FinancialSnapshot::unavailable(ticker, "not found in snapshot set"),
        }
    }

    async fn get_exchange_rate(&self, from: &Currency, to: &Currency) -> Option<Rate> {
        if from == to {
            return Some(Decimal::ONE);
        }
        if let Some(rate) = self.rates.get(&(from.clone(), to.clone())) {
            return Some(*rate);
        }
        self.rates
            .get(&(to.clone(), from.clone()))
            .filter(|r| !r.is_zero())
            .and_then(|r| Decimal::ONE.checked_div(*r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let p = StaticProvider::new().with_snapshot(FinancialSnapshot::new("KO").with_price(dec!(60)));
        assert!(p.get_snapshot("ko").await.success);

        let missing = p.get_snapshot("PEP").await;
        assert!(!missing.success);
        assert_eq!(missing.failure_reason(), "not found in snapshot set");
    }

    #[tokio::test]
    async fn test_inverse_rate() {
        let p = StaticProvider::new().with_rate(Currency::EUR, Currency::USD, dec!(1.25));
        assert_eq!(
            p.get_exchange_rate(&Currency::USD, &Currency::EUR).await,
            Some(dec!(0.8))
        );
        assert_eq!(
            p.get_exchange_rate(&Currency::PLN, &Currency::PLN).await,
            Some(Decimal::ONE)
        );
        assert_eq!(p.get_exchange_rate(&Currency::GBP, &Currency::EUR).await, None);
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "snapshots": [
                {"ticker": "KO", "name": "Coca-Cola", "price": "60", "eps": "2.5"},
                {"ticker": "NOPX", "shares": "100"}
            ],
            "rates": [{"from": "USD", "to": "EUR", "rate": "0.92"}]
        }"#;
        let p = StaticProvider::from_json(json).unwrap();
        assert_eq!(p.len(), 2);
        assert!(p.snapshots["KO"].success);
        assert!(!p.snapshots["NOPX"].success);
        assert_eq!(p.rates[&(Currency::USD, Currency::EUR)], dec!(0.92));
    }

    #[tokio::test]
    async fn test_from_json_keeps_explicit_failure() {
        let json = r#"{"snapshots": [
            {"ticker": "X", "price": "10", "success": false},
            {"ticker": "Y", "price": "10", "success": true}
        ]}"#;
        let p = StaticProvider::from_json(json).unwrap();

        let x = p.get_snapshot("X").await;
        assert!(!x.success);
        assert_eq!(x.usable_price(), None);
        assert_eq!(x.failure_reason(), "snapshot marked unusable");
        assert!(p.get_snapshot("Y").await.success);
    }

    #[test]
    fn test_from_json_rejects_bad_rate() {
        let json = r#"{"rates": [{"from": "USD", "to": "EUR", "rate": "0"}]}"#;
        assert!(StaticProvider::from_json(json).is_err());
    }
}
