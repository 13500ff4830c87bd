use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tdr_core::TransactionKind;
use tdr_reconcile::TradeFilter;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(name = "tdr")]
#[command(about = "Trade disclosure reconciliation command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Reconcile every enabled source bundle and export the result.
    Sync(SyncArgs),
    /// Summarize the most recent runs.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
}

#[derive(Debug, Default, clap::Args)]
struct SyncArgs {
    #[arg(long)]
    ticker: Option<String>,
    /// buy, sell, award, option, exchange or other.
    #[arg(long)]
    kind: Option<String>,
    #[arg(long)]
    min_value: Option<f64>,
    #[arg(long)]
    legislators_only: bool,
    #[arg(long)]
    since: Option<NaiveDate>,
    #[arg(long)]
    until: Option<NaiveDate>,
}

fn parse_kind(label: &str) -> Result<TransactionKind> {
    let kind = match label.trim().to_ascii_lowercase().as_str() {
        "buy" => TransactionKind::Buy,
        "sell" => TransactionKind::Sell,
        "award" => TransactionKind::Award,
        "option" => TransactionKind::Option,
        "exchange" => TransactionKind::Exchange,
        "other" => TransactionKind::Other,
        other => bail!("unknown transaction kind {other:?}"),
    };
    Ok(kind)
}

impl SyncArgs {
    fn into_filter(self) -> Result<TradeFilter> {
        Ok(TradeFilter {
            ticker: self.ticker,
            transaction_kind: self.kind.as_deref().map(parse_kind).transpose()?,
            min_value: self.min_value,
            legislator_only: self.legislators_only,
            since: self.since,
            until: self.until,
        })
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tdr=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync(SyncArgs::default())) {
        Commands::Sync(args) => {
            let summary = tdr_sync::run_sync_from_env(args.into_filter()?).await?;
            info!(run_id = %summary.run_id, "sync finished");
            println!(
                "sync complete: run_id={} sources={} parsed={} rejected={} records={} run_dir={}",
                summary.run_id,
                summary.enabled_sources,
                summary.parsed_records,
                summary.rejected,
                summary.output_records,
                summary.run_dir
            );
        }
        Commands::Report { runs } => {
            println!("{}", tdr_sync::report_from_env(runs)?);
        }
    }

    Ok(())
}
