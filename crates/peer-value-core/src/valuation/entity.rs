use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::peer_multiples::MultipleSet;
use super::weights::normalize_weights;
use crate::error::PeerValueError;
use crate::market_data::FinancialSnapshot;
use crate::types::{Money, Rate, ValuationMethod, WeightTriple};
use crate::PeerValueResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A method left out of the blend, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodExclusion {
    pub method: ValuationMethod,
    pub reason: String,
}

/// Per-entity fair value estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub ticker: String,
    pub name: String,
    /// Weighted per-share estimate, 2 dp
    pub fair_price: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_price: Option<Money>,
    /// `(fair / current - 1) * 100`, 1 dp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub premium_discount_pct: Option<Rate>,
    /// Price per method actually blended
    pub method_prices: BTreeMap<ValuationMethod, Money>,
    /// Normalized weights of the blended methods; sums to 1
    pub weights_used: BTreeMap<ValuationMethod, Rate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_methods: Vec<MethodExclusion>,
    /// Tickers of the peers behind the multiples
    #[serde(default)]
    pub peers_used: Vec<String>,
    pub peer_count: usize,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Blend the three peer-multiple methods into one fair price per share.
///
/// Methods whose inputs are unusable are dropped and their weight spread
/// proportionally over the remaining ones. A method price at or below zero
/// is dropped the same way. Pure: identical inputs give identical output.
pub fn valuate(
    snapshot: &FinancialSnapshot,
    multiples: &MultipleSet,
    weights: &WeightTriple,
) -> PeerValueResult<ValuationResult> {
    let ticker = snapshot.ticker.as_str();
    if !snapshot.success {
        return Err(PeerValueError::DataUnavailable {
            ticker: ticker.to_string(),
        });
    }

    let mut excluded: Vec<MethodExclusion> = Vec::new();
    let mut candidates: BTreeMap<ValuationMethod, Money> = BTreeMap::new();
    for method in ValuationMethod::ALL {
        match method_price(method, snapshot, multiples) {
            Ok(price) => {
                candidates.insert(method, price);
            }
            Err(reason) => excluded.push(MethodExclusion { method, reason }),
        }
    }

    let available: BTreeMap<ValuationMethod, Rate> = candidates
        .keys()
        .map(|m| (*m, weights.weight(*m)))
        .collect();
    let normalized = normalize_weights(ticker, &available)?;
    tracing::debug!(ticker, weights = ?normalized, "normalized weights");

    let mut method_prices: BTreeMap<ValuationMethod, Money> = BTreeMap::new();
    for (method, price) in candidates {
        if price > Decimal::ZERO {
            method_prices.insert(method, price);
        } else {
            excluded.push(MethodExclusion {
                method,
                reason: format!("non-positive price {}", price.round_dp(2)),
            });
        }
    }
    if method_prices.is_empty() {
        return Err(PeerValueError::NoPositiveValuation {
            ticker: ticker.to_string(),
        });
    }

    let weights_used = if method_prices.len() == normalized.len() {
        normalized
    } else {
        let surviving: BTreeMap<ValuationMethod, Rate> = method_prices
            .keys()
            .map(|m| (*m, normalized.get(m).copied().unwrap_or_default()))
            .collect();
        normalize_weights(ticker, &surviving)?
    };

    let fair_price = method_prices
        .iter()
        .map(|(m, p)| *p * weights_used.get(m).copied().unwrap_or_default())
        .sum::<Decimal>()
        .round_dp(2);

    let current_price = snapshot.usable_price();
    let premium_discount_pct = current_price
        .filter(|p| *p > Decimal::ZERO)
        .and_then(|p| fair_price.checked_div(p))
        .map(|ratio| ((ratio - Decimal::ONE) * dec!(100)).round_dp(1));

    excluded.sort_by_key(|e| e.method);

    Ok(ValuationResult {
        ticker: ticker.to_string(),
        name: snapshot.name.clone(),
        fair_price,
        current_price,
        premium_discount_pct,
        method_prices,
        weights_used,
        excluded_methods: excluded,
        peers_used: multiples
            .contributing_peers
            .iter()
            .map(|p| p.ticker.clone())
            .collect(),
        peer_count: multiples.peer_count,
    })
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Price implied by one method, or why the method is unavailable.
fn method_price(
    method: ValuationMethod,
    s: &FinancialSnapshot,
    multiples: &MultipleSet,
) -> Result<Money, String> {
    let multiple = multiples
        .value(method)
        .ok_or_else(|| "no peer multiple".to_string())?;

    match method {
        ValuationMethod::EvEbitda => {
            let ebitda = nonzero(s.ebitda, "ebitda")?;
            let shares = nonzero(s.shares, "shares")?;
            multiple
                .checked_mul(ebitda)
                .and_then(|ev| ev.checked_sub(s.debt.unwrap_or_default()))
                .and_then(|equity| equity.checked_add(s.cash.unwrap_or_default()))
                .and_then(|equity| equity.checked_div(shares))
                .ok_or_else(|| "overflow".to_string())
        }
        ValuationMethod::PriceEarnings => {
            let eps = nonzero(s.eps, "eps")?;
            multiple.checked_mul(eps).ok_or_else(|| "overflow".to_string())
        }
        ValuationMethod::PriceSales => {
            let revenue = nonzero(s.revenue, "revenue")?;
            let shares = nonzero(s.shares, "shares")?;
            revenue
                .checked_div(shares)
                .and_then(|per_share| multiple.checked_mul(per_share))
                .ok_or_else(|| "overflow".to_string())
        }
    }
}

fn nonzero(value: Option<Decimal>, field: &str) -> Result<Decimal, String> {
    match value {
        None => Err(format!("missing {field}")),
        Some(v) if v.is_zero() => Err(format!("{field} is zero")),
        Some(v) => Ok(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn target() -> FinancialSnapshot {
        FinancialSnapshot::new("TGT")
            .with_name("Target Co")
            .with_shares(dec!(10))
            .with_ebitda(dec!(50))
            .with_debt(dec!(20))
            .with_cash(dec!(10))
            .with_eps(dec!(5))
            .with_revenue(dec!(300))
            .with_price(dec!(100))
    }

    fn multiples() -> MultipleSet {
        MultipleSet::from_means(Some(dec!(8)), Some(dec!(15)), Some(dec!(2)))
    }

    #[test]
    fn test_all_methods_blend() {
        let w = WeightTriple::new(dec!(0.4), dec!(0.3), dec!(0.3));
        let r = valuate(&target(), &multiples(), &w).unwrap();

        assert_eq!(r.method_prices[&ValuationMethod::EvEbitda], dec!(39));
        assert_eq!(r.method_prices[&ValuationMethod::PriceEarnings], dec!(75));
        assert_eq!(r.method_prices[&ValuationMethod::PriceSales], dec!(60));
        assert_eq!(r.fair_price, dec!(56.1));
        assert_eq!(r.premium_discount_pct, Some(dec!(-43.9)));
        assert_eq!(r.current_price, Some(dec!(100)));
        assert!(r.excluded_methods.is_empty());
    }

    #[test]
    fn test_missing_method_redistributes() {
        let w = WeightTriple::new(dec!(0.4), dec!(0.3), dec!(0.3));
        let m = MultipleSet::from_means(Some(dec!(8)), None, Some(dec!(2)));
        let r = valuate(&target(), &m, &w).unwrap();

        assert_eq!(r.weights_used.len(), 2);
        assert_eq!(r.weights_used.values().copied().sum::<Decimal>(), Decimal::ONE);
        // 39 * 4/7 + 60 * 3/7 = 48
        assert_eq!(r.fair_price, dec!(48));
        assert_eq!(r.excluded_methods.len(), 1);
        assert_eq!(r.excluded_methods[0].method, ValuationMethod::PriceEarnings);
        assert_eq!(r.excluded_methods[0].reason, "no peer multiple");
    }

    #[test]
    fn test_negative_method_price_dropped() {
        // EV price = (8*1 - 200 + 10) / 10 < 0
        let s = target().with_ebitda(dec!(1)).with_debt(dec!(200));
        let w = WeightTriple::new(dec!(0.4), dec!(0.3), dec!(0.3));
        let r = valuate(&s, &multiples(), &w).unwrap();

        assert!(!r.method_prices.contains_key(&ValuationMethod::EvEbitda));
        // 75 * 0.5 + 60 * 0.5
        assert_eq!(r.fair_price, dec!(67.5));
        assert!(r.excluded_methods[0].reason.starts_with("non-positive price"));
    }

    #[test]
    fn test_only_method_non_positive_fails() {
        let s = target().with_ebitda(dec!(1)).with_debt(dec!(200));
        let m = MultipleSet::from_means(Some(dec!(8)), None, None);
        let err = valuate(&s, &m, &WeightTriple::default()).unwrap_err();
        assert_eq!(err.to_string(), "no valid positive valuation results");
    }

    #[test]
    fn test_error_gates() {
        let w = WeightTriple::default();
        let err = valuate(&FinancialSnapshot::unavailable("X", "gone"), &multiples(), &w).unwrap_err();
        assert_eq!(err.to_string(), "ticker data unavailable");

        let err = valuate(&target(), &MultipleSet::empty(), &w).unwrap_err();
        assert!(matches!(err, PeerValueError::InsufficientMethodData { .. }));

        let zero = WeightTriple::new(dec!(0), dec!(0), dec!(0));
        let err = valuate(&target(), &multiples(), &zero).unwrap_err();
        assert_eq!(err.to_string(), "all available methods have zero weight");
    }

    #[test]
    fn test_zero_target_fields_are_unavailable() {
        let s = target().with_shares(Decimal::ZERO);
        let r = valuate(&s, &multiples(), &WeightTriple::default()).unwrap();
        assert_eq!(r.method_prices.len(), 1);
        assert_eq!(r.fair_price, dec!(75));
        assert_eq!(r.premium_discount_pct, Some(dec!(-25)));
    }

    #[test]
    fn test_idempotent() {
        let w = WeightTriple::new(dec!(0.2), dec!(0.5), dec!(0.3));
        let a = valuate(&target(), &multiples(), &w).unwrap();
        let b = valuate(&target(), &multiples(), &w).unwrap();
        assert_eq!(a, b);
    }
}
