use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;
use std::path::Path;

use peer_value_core::config::{load_holdings, HoldingsMode, PeerMap};
use peer_value_core::portfolio::{PortfolioAggregator, PortfolioEntry};

use super::Context;

/// Arguments for a fund valuation
#[derive(Args)]
pub struct FundArgs {
    /// Fund holdings CSV (ticker, price_ev_w, price_pe_w, price_ps_w, share)
    #[arg(long)]
    pub holdings: String,

    /// Peer map file (JSON or YAML)
    #[arg(long)]
    pub peer_map: String,

    /// Fund name shown in the output
    #[arg(long)]
    pub name: Option<String>,
}

pub async fn run_fund(ctx: &Context, args: FundArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let holdings = load_holdings(Path::new(&args.holdings), HoldingsMode::Fund)?;
    let peer_map = PeerMap::load(Path::new(&args.peer_map))?;

    let mut unmapped = Vec::new();
    let entries: Vec<PortfolioEntry> = holdings
        .entries
        .iter()
        .filter_map(|h| match peer_map.peers_for(&h.ticker) {
            Some(peers) => Some(PortfolioEntry::new(
                h.ticker.clone(),
                peers,
                h.weights,
                h.shares.unwrap_or(Decimal::ZERO),
            )),
            None => {
                unmapped.push(format!("{}: not found in peer map", h.ticker));
                None
            }
        })
        .collect();
    if entries.is_empty() {
        return Err(format!("no holding of {} is in the peer map", args.holdings).into());
    }

    let market = ctx.market_data()?;
    let mut output = PortfolioAggregator::new(market.provider())
        .with_concurrency(ctx.concurrency)
        .aggregate(&entries)
        .await?;
    market.log_cache_stats();

    let mut warnings = holdings.warnings.clone();
    warnings.extend(unmapped);
    warnings.append(&mut output.warnings);
    output.warnings = warnings;

    let mut value = serde_json::to_value(output)?;
    if let Value::Object(ref mut map) = value {
        let name = args.name.unwrap_or_else(|| args.holdings.clone());
        map.insert("fund".into(), Value::String(name));
    }
    Ok(value)
}
