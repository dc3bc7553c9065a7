use clap::Args;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Instant;

use peer_value_core::config::{PeerMap, RunConfig};
use peer_value_core::portfolio::run_batch;
use peer_value_core::with_metadata;

use super::Context;

/// Arguments for a batch run
#[derive(Args)]
pub struct RunArgs {
    /// Run manifest (YAML or JSON)
    #[arg(long)]
    pub config: String,
}

/// The manifest's currency and fetch policy replace the global flags.
pub async fn run_manifest(ctx: &Context, args: RunArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let config = RunConfig::load(Path::new(&args.config))?;
    let peer_map = PeerMap::load(&config.peer_map)?;
    tracing::info!(
        sources = config.sources.len(),
        targets = peer_map.len(),
        currency = %config.reporting_currency,
        "starting batch run"
    );

    let market = ctx.market_data_with(&config.reporting_currency, &config.market_data)?;
    let report = run_batch(
        market.provider(),
        &peer_map,
        &config.sources,
        config.market_data.concurrency,
    )
    .await;
    market.log_cache_stats();

    let mut warnings = report.warnings.clone();
    warnings.extend(report.skipped.iter().map(|s| match s.ticker {
        Some(ref ticker) => format!("{} / {}: {}", s.source, ticker, s.reason),
        None => format!("{}: {}", s.source, s.reason),
    }));

    let output = with_metadata(
        "Peer Multiples Batch Valuation",
        &json!({
            "reporting_currency": config.reporting_currency,
            "peer_map": config.peer_map,
            "sources": config.sources,
            "market_data": config.market_data,
        }),
        warnings,
        start.elapsed().as_micros() as u64,
        report,
    );
    Ok(serde_json::to_value(output)?)
}
