use clap::Args;
use serde_json::Value;
use std::path::Path;

use peer_value_core::config::PeerMap;
use peer_value_core::portfolio::PortfolioAggregator;
use peer_value_core::WeightTriple;

use super::{normalize_tickers, Context};

/// Arguments for a single-company valuation
#[derive(Args)]
pub struct StockArgs {
    /// Ticker of the company to value
    pub ticker: String,

    /// Peer tickers, comma separated
    #[arg(long, value_delimiter = ',', conflicts_with = "peer_map")]
    pub peers: Vec<String>,

    /// Peer map file (JSON or YAML) to look the peers up in
    #[arg(long)]
    pub peer_map: Option<String>,

    /// Method weights as ev,pe,ps (e.g. 0.4,0.3,0.3)
    #[arg(long, default_value = "0.33,0.33,0.33")]
    pub weights: WeightTriple,
}

pub async fn run_stock(ctx: &Context, args: StockArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let ticker = args.ticker.trim().to_ascii_uppercase();
    if ticker.is_empty() {
        return Err("ticker must not be empty".into());
    }

    let peers = match args.peer_map {
        Some(ref path) => PeerMap::load(Path::new(path))?
            .peers_for(&ticker)
            .ok_or_else(|| format!("{ticker} not found in peer map {path}"))?,
        None => normalize_tickers(&args.peers),
    };
    if peers.is_empty() {
        return Err("no peers given; use --peers or --peer-map".into());
    }

    let market = ctx.market_data()?;
    let output = PortfolioAggregator::new(market.provider())
        .with_concurrency(ctx.concurrency)
        .value_single(&ticker, &peers, &args.weights)
        .await?;
    market.log_cache_stats();
    Ok(serde_json::to_value(output)?)
}
