use clap::Args;
use serde_json::{json, Value};
use std::time::Instant;

use peer_value_core::valuation::PeerMultipleCalculator;
use peer_value_core::with_metadata;

use super::{normalize_tickers, Context};

/// Arguments for peer multiple diagnostics
#[derive(Args)]
pub struct PeersArgs {
    /// Peer tickers, space or comma separated
    #[arg(required = true, num_args = 1.., value_delimiter = ',')]
    pub tickers: Vec<String>,
}

pub async fn run_peers(ctx: &Context, args: PeersArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let tickers = normalize_tickers(&args.tickers);
    if tickers.is_empty() {
        return Err("at least one peer ticker is required".into());
    }

    let market = ctx.market_data()?;
    let set = PeerMultipleCalculator::new(market.provider())
        .with_concurrency(ctx.concurrency)
        .compute(&tickers)
        .await;
    market.log_cache_stats();

    let warnings = set
        .skipped_peers
        .iter()
        .map(|p| format!("peer {} skipped: {}", p.ticker, p.reason))
        .collect();
    let output = with_metadata(
        "Peer Multiples (outlier-bounded means)",
        &json!({
            "peers": tickers,
            "reporting_currency": ctx.currency,
        }),
        warnings,
        start.elapsed().as_micros() as u64,
        set,
    );
    Ok(serde_json::to_value(output)?)
}
