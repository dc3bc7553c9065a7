use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::clamp_concurrency;
use crate::market_data::{FinancialDataProvider, FinancialSnapshot};
use crate::types::{Money, Multiple, ValuationMethod};

/// Upper bound (exclusive) for an accepted EV/EBITDA multiple.
pub const EV_EBITDA_CAP: Multiple = dec!(50);
/// Upper bound (exclusive) for an accepted P/E multiple.
pub const P_E_CAP: Multiple = dec!(100);
/// Upper bound (exclusive) for an accepted P/S multiple.
pub const P_S_CAP: Multiple = dec!(40);

pub fn multiple_cap(method: ValuationMethod) -> Multiple {
    match method {
        ValuationMethod::EvEbitda => EV_EBITDA_CAP,
        ValuationMethod::PriceEarnings => P_E_CAP,
        ValuationMethod::PriceSales => P_S_CAP,
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Why one method produced nothing for one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodRejection {
    pub method: ValuationMethod,
    pub reason: String,
}

/// A peer that contributed no accepted multiple at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPeer {
    pub ticker: String,
    pub reason: String,
}

/// Multiples computed for a single peer. Only in-band values are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerMultiples {
    pub ticker: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ev_ebitda: Option<Multiple>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_e: Option<Multiple>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_s: Option<Multiple>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejections: Vec<MethodRejection>,
}

impl PeerMultiples {
    pub fn value(&self, method: ValuationMethod) -> Option<Multiple> {
        match method {
            ValuationMethod::EvEbitda => self.ev_ebitda,
            ValuationMethod::PriceEarnings => self.p_e,
            ValuationMethod::PriceSales => self.p_s,
        }
    }

    /// True when at least one method was accepted.
    pub fn contributes(&self) -> bool {
        ValuationMethod::ALL.iter().any(|m| self.value(*m).is_some())
    }
}

/// Cross-sectional peer means for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultipleSet {
    pub ev_ebitda: Option<Multiple>,
    pub p_e: Option<Multiple>,
    pub p_s: Option<Multiple>,
    /// Peers with at least one accepted multiple, in request order
    pub contributing_peers: Vec<PeerMultiples>,
    pub peer_count: usize,
    #[serde(default)]
    pub skipped_peers: Vec<SkippedPeer>,
}

impl MultipleSet {
    /// No peers, no multiples.
    pub fn empty() -> Self {
        Self {
            ev_ebitda: None,
            p_e: None,
            p_s: None,
            contributing_peers: Vec::new(),
            peer_count: 0,
            skipped_peers: Vec::new(),
        }
    }

    /// Peer means computed directly, without per-peer detail.
    pub fn from_means(ev_ebitda: Option<Multiple>, p_e: Option<Multiple>, p_s: Option<Multiple>) -> Self {
        Self {
            ev_ebitda,
            p_e,
            p_s,
            ..Self::empty()
        }
    }

    pub fn value(&self, method: ValuationMethod) -> Option<Multiple> {
        match method {
            ValuationMethod::EvEbitda => self.ev_ebitda,
            ValuationMethod::PriceEarnings => self.p_e,
            ValuationMethod::PriceSales => self.p_s,
        }
    }

    /// Aggregate already-fetched peer snapshots.
    ///
    /// Unusable snapshots and peers whose every multiple fell outside its
    /// band are recorded in `skipped_peers`.
    pub fn from_snapshots(snapshots: &[FinancialSnapshot]) -> Self {
        let mut set = Self::empty();

        for snapshot in snapshots {
            if !snapshot.success {
                let reason = snapshot.failure_reason();
                tracing::warn!(peer = %snapshot.ticker, %reason, "peer skipped");
                set.skipped_peers.push(SkippedPeer {
                    ticker: snapshot.ticker.clone(),
                    reason,
                });
                continue;
            }

            let peer = compute_peer_multiples(snapshot);
            tracing::debug!(
                peer = %peer.ticker,
                ev_ebitda = ?peer.ev_ebitda,
                p_e = ?peer.p_e,
                p_s = ?peer.p_s,
                "peer multiples"
            );
            if peer.contributes() {
                set.contributing_peers.push(peer);
            } else {
                let reason = peer
                    .rejections
                    .iter()
                    .map(|r| format!("{}: {}", r.method, r.reason))
                    .collect::<Vec<_>>()
                    .join("; ");
                tracing::warn!(peer = %peer.ticker, %reason, "peer contributed no multiples");
                set.skipped_peers.push(SkippedPeer {
                    ticker: peer.ticker,
                    reason,
                });
            }
        }

        set.ev_ebitda = mean_of(&set.contributing_peers, ValuationMethod::EvEbitda);
        set.p_e = mean_of(&set.contributing_peers, ValuationMethod::PriceEarnings);
        set.p_s = mean_of(&set.contributing_peers, ValuationMethod::PriceSales);
        set.peer_count = set.contributing_peers.len();
        set
    }
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Fetches peers through a provider and aggregates their multiples.
pub struct PeerMultipleCalculator<'a> {
    provider: &'a dyn FinancialDataProvider,
    concurrency: usize,
}

impl<'a> PeerMultipleCalculator<'a> {
    pub fn new(provider: &'a dyn FinancialDataProvider) -> Self {
        Self {
            provider,
            concurrency: super::DEFAULT_CONCURRENCY,
        }
    }

    /// Maximum number of in-flight peer fetches, clamped to 1..=10.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = clamp_concurrency(concurrency);
        self
    }

    /// Never fails: unreachable peers only shrink the result.
    pub async fn compute(&self, peers: &[String]) -> MultipleSet {
        let snapshots: Vec<FinancialSnapshot> = stream::iter(peers)
            .map(|peer| self.provider.get_snapshot(peer))
            .buffered(self.concurrency)
            .collect()
            .await;

        let set = MultipleSet::from_snapshots(&snapshots);
        tracing::debug!(
            requested = peers.len(),
            contributing = set.peer_count,
            "peer multiples aggregated"
        );
        set
    }
}

// ---------------------------------------------------------------------------
// Per-peer computation
// ---------------------------------------------------------------------------

/// Compute the three multiples for one peer, each independently.
pub fn compute_peer_multiples(snapshot: &FinancialSnapshot) -> PeerMultiples {
    let mut peer = PeerMultiples {
        ticker: snapshot.ticker.clone(),
        name: snapshot.name.clone(),
        ev_ebitda: None,
        p_e: None,
        p_s: None,
        rejections: Vec::new(),
    };

    let Some(price) = snapshot.usable_price() else {
        for method in ValuationMethod::ALL {
            peer.rejections.push(MethodRejection {
                method,
                reason: snapshot.failure_reason(),
            });
        }
        return peer;
    };

    for method in ValuationMethod::ALL {
        let raw = match method {
            ValuationMethod::EvEbitda => ev_ebitda(price, snapshot),
            ValuationMethod::PriceEarnings => price_earnings(price, snapshot),
            ValuationMethod::PriceSales => price_sales(price, snapshot),
        };
        match raw.and_then(|m| within_band(method, m)) {
            Ok(m) => match method {
                ValuationMethod::EvEbitda => peer.ev_ebitda = Some(m),
                ValuationMethod::PriceEarnings => peer.p_e = Some(m),
                ValuationMethod::PriceSales => peer.p_s = Some(m),
            },
            Err(reason) => peer.rejections.push(MethodRejection { method, reason }),
        }
    }
    peer
}

fn ev_ebitda(price: Money, s: &FinancialSnapshot) -> Result<Multiple, String> {
    let shares = s.shares.ok_or("missing shares")?;
    let ebitda = nonzero(s.ebitda, "ebitda")?;
    let ev = price
        .checked_mul(shares)
        .and_then(|mc| mc.checked_add(s.debt.unwrap_or_default()))
        .and_then(|v| v.checked_sub(s.cash.unwrap_or_default()))
        .ok_or("enterprise value overflow")?;
    ev.checked_div(ebitda).ok_or_else(|| "overflow".to_string())
}

fn price_earnings(price: Money, s: &FinancialSnapshot) -> Result<Multiple, String> {
    let eps = nonzero(s.eps, "eps")?;
    price.checked_div(eps).ok_or_else(|| "overflow".to_string())
}

fn price_sales(price: Money, s: &FinancialSnapshot) -> Result<Multiple, String> {
    let revenue = s.revenue.ok_or("missing revenue")?;
    let shares = nonzero(s.shares, "shares")?;
    let per_share = revenue.checked_div(shares).ok_or("overflow")?;
    if per_share.is_zero() {
        return Err("revenue per share is zero".into());
    }
    price.checked_div(per_share).ok_or_else(|| "overflow".to_string())
}

fn nonzero(value: Option<Decimal>, field: &str) -> Result<Decimal, String> {
    match value {
        None => Err(format!("missing {field}")),
        Some(v) if v.is_zero() => Err(format!("{field} is zero")),
        Some(v) => Ok(v),
    }
}

fn within_band(method: ValuationMethod, m: Multiple) -> Result<Multiple, String> {
    let cap = multiple_cap(method);
    if m > Decimal::ZERO && m < cap {
        Ok(m)
    } else {
        Err(format!("{} outside (0, {cap})", m.round_dp(2)))
    }
}

fn mean_of(peers: &[PeerMultiples], method: ValuationMethod) -> Option<Multiple> {
    let values: Vec<Multiple> = peers.iter().filter_map(|p| p.value(method)).collect();
    if values.is_empty() {
        return None;
    }
    let sum: Decimal = values.iter().copied().sum();
    Some(sum / Decimal::from(values.len() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::StaticProvider;
    use pretty_assertions::assert_eq;

    fn peer(ticker: &str) -> FinancialSnapshot {
        FinancialSnapshot::new(ticker)
            .with_shares(dec!(100))
            .with_ebitda(dec!(200))
            .with_revenue(dec!(1000))
            .with_eps(dec!(2))
            .with_debt(dec!(300))
            .with_cash(dec!(100))
            .with_price(dec!(20))
    }

    #[test]
    fn test_peer_multiples_formulas() {
        let p = compute_peer_multiples(&peer("AAA"));
        // EV = 20*100 + 300 - 100 = 2200
        assert_eq!(p.ev_ebitda, Some(dec!(11)));
        assert_eq!(p.p_e, Some(dec!(10)));
        // 20 / (1000/100)
        assert_eq!(p.p_s, Some(dec!(2)));
        assert!(p.rejections.is_empty());
    }

    #[test]
    fn test_debt_and_cash_default_to_zero() {
        let mut s = peer("AAA");
        s.debt = None;
        s.cash = None;
        assert_eq!(compute_peer_multiples(&s).ev_ebitda, Some(dec!(10)));
    }

    #[test]
    fn test_out_of_band_values_rejected() {
        // P/E = 20 / 0.1 = 200 >= 100, P/S = 20 / 0.4 = 50 >= 40
        let s = peer("HIGH").with_eps(dec!(0.1)).with_revenue(dec!(40));
        let p = compute_peer_multiples(&s);
        assert_eq!(p.p_e, None);
        assert_eq!(p.p_s, None);
        assert_eq!(p.ev_ebitda, Some(dec!(11)));
        assert_eq!(p.rejections.len(), 2);

        let s = peer("LOSS").with_eps(dec!(-1));
        assert_eq!(compute_peer_multiples(&s).p_e, None);
    }

    #[test]
    fn test_exact_cap_is_excluded() {
        // EV = 20*100 = 2000; 2000 / 40 = 50
        let mut s = peer("EDGE").with_ebitda(dec!(40));
        s.debt = None;
        s.cash = None;
        assert_eq!(compute_peer_multiples(&s).ev_ebitda, None);
    }

    #[test]
    fn test_zero_denominators() {
        let s = peer("ZERO").with_ebitda(Decimal::ZERO).with_eps(Decimal::ZERO);
        let p = compute_peer_multiples(&s);
        assert_eq!(p.ev_ebitda, None);
        assert_eq!(p.p_e, None);
        assert!(p
            .rejections
            .iter()
            .any(|r| r.reason == "ebitda is zero"));
    }

    #[test]
    fn test_means_and_peer_count() {
        let a = peer("AAA");
        // P/E 30, EV/EBITDA out of band (EV 6200 / 100 = 62), P/S 6
        let b = peer("BBB").with_eps(dec!(2)).with_ebitda(dec!(100)).with_price(dec!(60));
        // every multiple out of band
        let c = peer("CCC")
            .with_eps(dec!(-1))
            .with_ebitda(dec!(-5))
            .with_revenue(dec!(1));
        let d = FinancialSnapshot::unavailable("DDD", "timed out");

        let set = MultipleSet::from_snapshots(&[a, b, c, d]);
        assert_eq!(set.peer_count, 2);
        assert_eq!(set.ev_ebitda, Some(dec!(11)));
        assert_eq!(set.p_e, Some(dec!(20)));
        assert_eq!(set.p_s, Some(dec!(4)));
        let skipped: Vec<&str> = set.skipped_peers.iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(skipped, vec!["CCC", "DDD"]);
        assert_eq!(set.skipped_peers[1].reason, "timed out");
    }

    #[tokio::test]
    async fn test_calculator_all_peers_unreachable() {
        let provider = StaticProvider::new();
        let set = PeerMultipleCalculator::new(&provider)
            .compute(&["X".to_string(), "Y".to_string()])
            .await;
        assert_eq!(set.ev_ebitda, None);
        assert_eq!(set.p_e, None);
        assert_eq!(set.p_s, None);
        assert_eq!(set.peer_count, 0);
        assert_eq!(set.skipped_peers.len(), 2);
    }

    #[tokio::test]
    async fn test_calculator_keeps_request_order() {
        let provider = StaticProvider::new()
            .with_snapshot(peer("AAA"))
            .with_snapshot(peer("BBB"))
            .with_snapshot(peer("CCC"));
        let peers: Vec<String> = ["CCC", "AAA", "BBB"].iter().map(|s| s.to_string()).collect();
        let set = PeerMultipleCalculator::new(&provider)
            .with_concurrency(2)
            .compute(&peers)
            .await;
        let order: Vec<&str> = set.contributing_peers.iter().map(|p| p.ticker.as_str()).collect();
        assert_eq!(order, vec!["CCC", "AAA", "BBB"]);
    }
}
