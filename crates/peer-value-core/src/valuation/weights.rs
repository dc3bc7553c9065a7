use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::error::PeerValueError;
use crate::types::{Rate, ValuationMethod};
use crate::PeerValueResult;

/// Rescale the weights of the available methods so they sum to one.
///
/// Each method keeps its share relative to the other available methods;
/// methods absent from `available` are excluded entirely. The largest
/// weight absorbs the division remainder, so the result sums to exactly 1.
///
/// Fails with `InsufficientMethodData` when nothing is available and with
/// `ZeroWeight` when the available weights sum to zero.
pub fn normalize_weights(
    ticker: &str,
    available: &BTreeMap<ValuationMethod, Rate>,
) -> PeerValueResult<BTreeMap<ValuationMethod, Rate>> {
    if available.is_empty() {
        return Err(PeerValueError::InsufficientMethodData {
            ticker: ticker.to_string(),
        });
    }

    let total: Decimal = available.values().copied().sum();
    if total.is_zero() {
        return Err(PeerValueError::ZeroWeight {
            ticker: ticker.to_string(),
        });
    }

    let mut normalized: BTreeMap<ValuationMethod, Rate> = available
        .iter()
        .map(|(method, w)| (*method, *w / total))
        .collect();

    let largest = normalized
        .iter()
        .max_by(|a, b| a.1.cmp(b.1))
        .map(|(m, _)| *m);
    if let Some(largest) = largest {
        let others: Decimal = normalized
            .iter()
            .filter(|(m, _)| **m != largest)
            .map(|(_, w)| *w)
            .sum();
        normalized.insert(largest, Decimal::ONE - others);
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn weights(entries: &[(ValuationMethod, Rate)]) -> BTreeMap<ValuationMethod, Rate> {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_proportional_redistribution() {
        let available = weights(&[
            (ValuationMethod::EvEbitda, dec!(0.4)),
            (ValuationMethod::PriceSales, dec!(0.3)),
        ]);
        let n = normalize_weights("T", &available).unwrap();

        assert_eq!(n.len(), 2);
        assert!(!n.contains_key(&ValuationMethod::PriceEarnings));
        let ev = n[&ValuationMethod::EvEbitda];
        let ps = n[&ValuationMethod::PriceSales];
        assert!((ev - dec!(0.5714285714)).abs() < dec!(0.0000000001));
        assert!((ps - dec!(0.4285714286)).abs() < dec!(0.0000000001));
        assert_eq!(ev + ps, Decimal::ONE);
    }

    #[test]
    fn test_sum_is_exactly_one() {
        let available = weights(&[
            (ValuationMethod::EvEbitda, dec!(1)),
            (ValuationMethod::PriceEarnings, dec!(1)),
            (ValuationMethod::PriceSales, dec!(1)),
        ]);
        let n = normalize_weights("T", &available).unwrap();
        assert_eq!(n.values().copied().sum::<Decimal>(), Decimal::ONE);
        assert!(n.values().all(|w| *w > Decimal::ZERO));
    }

    #[test]
    fn test_zero_weight_methods_stay_zero() {
        let available = weights(&[
            (ValuationMethod::EvEbitda, dec!(0)),
            (ValuationMethod::PriceEarnings, dec!(2)),
        ]);
        let n = normalize_weights("T", &available).unwrap();
        assert_eq!(n[&ValuationMethod::EvEbitda], Decimal::ZERO);
        assert_eq!(n[&ValuationMethod::PriceEarnings], Decimal::ONE);
    }

    #[test]
    fn test_empty_and_zero_sum() {
        let err = normalize_weights("T", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, PeerValueError::InsufficientMethodData { .. }));
        assert_eq!(err.to_string(), "insufficient data");

        let available = weights(&[(ValuationMethod::PriceSales, dec!(0))]);
        let err = normalize_weights("T", &available).unwrap_err();
        assert!(matches!(err, PeerValueError::ZeroWeight { .. }));
    }
}
