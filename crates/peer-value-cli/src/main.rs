mod commands;
mod input;
mod output;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::fund::FundArgs;
use commands::peers::PeersArgs;
use commands::run::RunArgs;
use commands::stock::StockArgs;
use commands::Context;
use peer_value_core::Currency;

/// Peer-multiple fair value estimates for stocks and funds
#[derive(Parser)]
#[command(
    name = "peerval",
    version,
    about = "Peer-multiple fair value estimates for stocks and funds",
    long_about = "Estimates the fair price of a company from the average EV/EBITDA, P/E and \
                  P/S multiples of its peer group, and rolls company valuations up to \
                  fund-level premium/discount figures."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Reporting currency for every monetary value
    #[arg(long, default_value = "EUR", global = true)]
    currency: Currency,

    /// Value offline against a JSON snapshot set instead of Yahoo Finance
    #[arg(long, global = true)]
    snapshots: Option<String>,

    /// Maximum concurrent fetches (1-10)
    #[arg(long, default_value_t = 4, global = true)]
    concurrency: usize,

    /// Log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the outlier-bounded mean multiples of a peer group
    Peers(PeersArgs),
    /// Value one company against its peers
    Stock(StockArgs),
    /// Value a fund from its holdings file
    Fund(FundArgs),
    /// Value every source listed in a run manifest
    Run(RunArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let json_logs = std::env::var("PEERVAL_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ctx = Context {
        currency: cli.currency,
        snapshots: cli.snapshots,
        concurrency: cli.concurrency,
    };

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Peers(args) => commands::peers::run_peers(&ctx, args).await,
        Commands::Stock(args) => commands::stock::run_stock(&ctx, args).await,
        Commands::Fund(args) => commands::fund::run_fund(&ctx, args).await,
        Commands::Run(args) => commands::run::run_manifest(&ctx, args).await,
        Commands::Version => {
            println!("peerval {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
