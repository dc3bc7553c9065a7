use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::PeerValueError;
use crate::market_data::FinancialDataProvider;
use crate::types::{with_metadata, ComputationOutput, Money, Rate, WeightTriple};
use crate::valuation::{
    clamp_concurrency, valuate, MultipleSet, PeerMultipleCalculator, ValuationResult,
    DEFAULT_CONCURRENCY,
};
use crate::PeerValueResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One position to value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioEntry {
    pub ticker: String,
    pub peers: Vec<String>,
    #[serde(default)]
    pub weights: WeightTriple,
    pub share_count: Decimal,
}

impl PortfolioEntry {
    pub fn new(ticker: impl Into<String>, peers: Vec<String>, weights: WeightTriple, share_count: Decimal) -> Self {
        Self {
            ticker: ticker.into(),
            peers,
            weights,
            share_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub ticker: String,
    pub reason: String,
}

/// A successfully valued position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionValuation {
    pub share_count: Decimal,
    pub current_value: Money,
    pub fair_value: Money,
    pub valuation: ValuationResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioResult {
    pub total_current_value: Money,
    pub total_fair_value: Money,
    /// `(fair - current) / current * 100`
    pub premium_discount_pct: Rate,
    pub valuated_count: usize,
    pub total_count: usize,
    /// Failed entries in input order
    pub failed: Vec<FailedEntry>,
    pub positions: Vec<PositionValuation>,
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Values many positions against their peers and rolls them up.
pub struct PortfolioAggregator<'a> {
    provider: &'a dyn FinancialDataProvider,
    concurrency: usize,
}

impl<'a> PortfolioAggregator<'a> {
    pub fn new(provider: &'a dyn FinancialDataProvider) -> Self {
        Self {
            provider,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = clamp_concurrency(concurrency);
        self
    }

    /// Value every entry independently and sum the successes.
    ///
    /// A failing entry is recorded in `failed` and never affects the others.
    /// Only when nothing could be valued does the whole call fail.
    pub async fn aggregate(
        &self,
        entries: &[PortfolioEntry],
    ) -> PeerValueResult<ComputationOutput<PortfolioResult>> {
        let start = Instant::now();
        let total_count = entries.len();

        let outcomes: Vec<Result<PositionValuation, String>> = stream::iter(entries)
            .map(|entry| self.value_entry(entry))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut total_current_value = Decimal::ZERO;
        let mut total_fair_value = Decimal::ZERO;
        let mut failed = Vec::new();
        let mut positions = Vec::new();
        let mut warnings = Vec::new();

        for (entry, outcome) in entries.iter().zip(outcomes) {
            match outcome {
                Ok(position) => {
                    total_current_value += position.current_value;
                    total_fair_value += position.fair_value;
                    positions.push(position);
                }
                Err(reason) => {
                    tracing::warn!(ticker = %entry.ticker, %reason, "position skipped");
                    warnings.push(format!("{}: {}", entry.ticker, reason));
                    failed.push(FailedEntry {
                        ticker: entry.ticker.clone(),
                        reason,
                    });
                }
            }
        }

        let valuated_count = positions.len();
        if valuated_count == 0 || total_current_value.is_zero() {
            return Err(PeerValueError::ValuationFailed {
                succeeded: valuated_count,
                total: total_count,
            });
        }

        let premium_discount_pct =
            (total_fair_value - total_current_value) / total_current_value * dec!(100);
        tracing::info!(
            valuated = valuated_count,
            total = total_count,
            premium_discount_pct = %premium_discount_pct.round_dp(1),
            "portfolio valued"
        );

        let result = PortfolioResult {
            total_current_value,
            total_fair_value,
            premium_discount_pct,
            valuated_count,
            total_count,
            failed,
            positions,
        };

        Ok(with_metadata(
            "Peer Multiples Portfolio Valuation",
            &serde_json::json!({
                "entries": entries,
                "concurrency": self.concurrency,
            }),
            warnings,
            start.elapsed().as_micros() as u64,
            result,
        ))
    }

    /// Value a single company. Failures surface as errors because there
    /// is nothing else to report.
    pub async fn value_single(
        &self,
        ticker: &str,
        peers: &[String],
        weights: &WeightTriple,
    ) -> PeerValueResult<ComputationOutput<ValuationResult>> {
        let start = Instant::now();
        let snapshot = self.provider.get_snapshot(ticker).await;
        if !snapshot.success {
            return Err(PeerValueError::DataUnavailable {
                ticker: ticker.to_string(),
            });
        }

        let multiples = self.multiples(peers).await;
        let warnings: Vec<String> = multiples
            .skipped_peers
            .iter()
            .map(|p| format!("peer {} skipped: {}", p.ticker, p.reason))
            .collect();
        let valuation = valuate(&snapshot, &multiples, weights)?;
        tracing::info!(ticker, fair_price = %valuation.fair_price, "company valued");

        Ok(with_metadata(
            "Peer Multiples Valuation (EV/EBITDA, P/E, P/S)",
            &serde_json::json!({
                "ticker": ticker,
                "peers": peers,
                "weights": weights,
                "multiples": multiples,
            }),
            warnings,
            start.elapsed().as_micros() as u64,
            valuation,
        ))
    }

    async fn multiples(&self, peers: &[String]) -> MultipleSet {
        PeerMultipleCalculator::new(self.provider)
            .with_concurrency(self.concurrency)
            .compute(peers)
            .await
    }

    async fn value_entry(&self, entry: &PortfolioEntry) -> Result<PositionValuation, String> {
        let snapshot = self.provider.get_snapshot(&entry.ticker).await;
        if !snapshot.success {
            return Err("no base data".into());
        }
        let price = match snapshot.usable_price() {
            Some(p) if p > Decimal::ZERO => p,
            Some(p) => return Err(format!("invalid price ({p})")),
            None => return Err("invalid price (none)".into()),
        };
        if entry.share_count <= Decimal::ZERO {
            return Err(format!("invalid share count ({})", entry.share_count));
        }

        let multiples = self.multiples(&entry.peers).await;
        let valuation = valuate(&snapshot, &multiples, &entry.weights)
            .map_err(|e| format!("valuation failed - {e}"))?;
        if valuation.fair_price <= Decimal::ZERO {
            return Err(format!("non-positive fair price ({})", valuation.fair_price));
        }

        let current_value = price
            .checked_mul(entry.share_count)
            .ok_or("position value overflow")?;
        let fair_value = valuation
            .fair_price
            .checked_mul(entry.share_count)
            .ok_or("position value overflow")?;

        Ok(PositionValuation {
            share_count: entry.share_count,
            current_value,
            fair_value,
            valuation,
        })
    }
}
