use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::aggregate::{PortfolioAggregator, PortfolioEntry};
use super::report::{sort_rows, ReportRow, RowKind};
use crate::config::{load_holdings, Holding, Holdings, HoldingsMode, PeerMap, SourceConfig};
use crate::market_data::FinancialDataProvider;
use crate::valuation::{clamp_concurrency, valuate, PeerMultipleCalculator};

/// Something a batch run could not value, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub source: String,
    /// Absent when the whole source was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    pub reason: String,
}

/// Sorted summary of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub rows: Vec<ReportRow>,
    pub skipped: Vec<SkippedItem>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            skipped: Vec::new(),
            warnings: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    pub fn count(&self, kind: RowKind) -> usize {
        self.rows.iter().filter(|r| r.kind == kind).count()
    }
}

/// Value every configured source against one peer map.
pub async fn run_batch(
    provider: &dyn FinancialDataProvider,
    peer_map: &PeerMap,
    sources: &[SourceConfig],
    concurrency: usize,
) -> BatchReport {
    BatchRunner::new(provider, peer_map)
        .with_concurrency(concurrency)
        .run(sources)
        .await
}

/// Drives a batch run. A source that fails to load is skipped as a whole;
/// every other failure is isolated to its ticker.
pub struct BatchRunner<'a> {
    provider: &'a dyn FinancialDataProvider,
    peer_map: &'a PeerMap,
    concurrency: usize,
}

impl<'a> BatchRunner<'a> {
    pub fn new(provider: &'a dyn FinancialDataProvider, peer_map: &'a PeerMap) -> Self {
        Self {
            provider,
            peer_map,
            concurrency: crate::valuation::DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = clamp_concurrency(concurrency);
        self
    }

    pub async fn run(&self, sources: &[SourceConfig]) -> BatchReport {
        let mut report = BatchReport::new();

        for source in sources {
            tracing::info!(source = %source.name, path = %source.path.display(), "loading source");
            match load_holdings(&source.path, source.kind) {
                Ok(holdings) => self.value_source(&source.name, source.kind, &holdings, &mut report).await,
                Err(e) => {
                    tracing::warn!(source = %source.name, error = %e, "source skipped");
                    report.skipped.push(SkippedItem {
                        source: source.name.clone(),
                        ticker: None,
                        reason: e.to_string(),
                    });
                }
            }
        }

        sort_rows(&mut report.rows);
        tracing::info!(
            stocks = report.count(RowKind::Stock),
            funds = report.count(RowKind::Fund),
            skipped = report.skipped.len(),
            "batch complete"
        );
        report
    }

    /// Value one already-parsed holdings table into `report`.
    pub async fn value_source(
        &self,
        name: &str,
        kind: HoldingsMode,
        holdings: &Holdings,
        report: &mut BatchReport,
    ) {
        report.warnings.extend(holdings.warnings.iter().cloned());
        match kind {
            HoldingsMode::Stocks => self.stock_rows(name, holdings, report).await,
            HoldingsMode::Fund => self.fund_row(name, holdings, report).await,
        }
    }

    async fn stock_rows(&self, source: &str, holdings: &Holdings, report: &mut BatchReport) {
        let outcomes: Vec<Result<ReportRow, SkippedItem>> = stream::iter(&holdings.entries)
            .map(|holding| self.stock_row(source, holding))
            .buffered(self.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Ok(row) => report.rows.push(row),
                Err(skipped) => {
                    tracing::warn!(
                        source,
                        ticker = ?skipped.ticker,
                        reason = %skipped.reason,
                        "stock skipped"
                    );
                    report.skipped.push(skipped);
                }
            }
        }
    }

    async fn stock_row(&self, source: &str, holding: &Holding) -> Result<ReportRow, SkippedItem> {
        let skip = |reason: String| SkippedItem {
            source: source.to_string(),
            ticker: Some(holding.ticker.clone()),
            reason,
        };

        let peers = self
            .peer_map
            .peers_for(&holding.ticker)
            .ok_or_else(|| skip("not found in peer map".into()))?;

        let multiples = PeerMultipleCalculator::new(self.provider)
            .with_concurrency(self.concurrency)
            .compute(&peers)
            .await;
        if multiples.peer_count == 0 {
            return Err(skip("no usable peer data".into()));
        }

        let snapshot = self.provider.get_snapshot(&holding.ticker).await;
        let valuation = valuate(&snapshot, &multiples, &holding.weights).map_err(|e| skip(e.to_string()))?;
        tracing::info!(
            source,
            ticker = %valuation.ticker,
            fair_price = %valuation.fair_price,
            peers = valuation.peer_count,
            "stock valued"
        );
        Ok(ReportRow::from_valuation(source, &valuation))
    }

    async fn fund_row(&self, source: &str, holdings: &Holdings, report: &mut BatchReport) {
        let mut entries = Vec::with_capacity(holdings.len());
        for holding in &holdings.entries {
            match self.peer_map.peers_for(&holding.ticker) {
                Some(peers) => entries.push(PortfolioEntry::new(
                    holding.ticker.clone(),
                    peers,
                    holding.weights,
                    holding.shares.unwrap_or(Decimal::ZERO),
                )),
                None => report.skipped.push(SkippedItem {
                    source: source.to_string(),
                    ticker: Some(holding.ticker.clone()),
                    reason: "not found in peer map".into(),
                }),
            }
        }

        let aggregator = PortfolioAggregator::new(self.provider).with_concurrency(self.concurrency);
        match aggregator.aggregate(&entries).await {
            Ok(output) => {
                let result = output.result;
                for failed in &result.failed {
                    report.skipped.push(SkippedItem {
                        source: source.to_string(),
                        ticker: Some(failed.ticker.clone()),
                        reason: failed.reason.clone(),
                    });
                }
                report.rows.push(ReportRow::from_portfolio(source, source, &result));
            }
            Err(e) => {
                tracing::warn!(source, error = %e, "fund valuation failed");
                report.skipped.push(SkippedItem {
                    source: source.to_string(),
                    ticker: None,
                    reason: e.to_string(),
                });
            }
        }
    }
}
