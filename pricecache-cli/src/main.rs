//! pricecache CLI: catch-up, status and plan commands.
//!
//! Commands:
//! - `catchup`: bring every cached series up to the latest session
//! - `status`: report each symbol's bucket, date range, rows and hash
//! - `plan`: print the provider batches a catch-up would issue

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use pricecache_core::config::CatchupConfig;
use pricecache_core::data::{CircuitBreaker, YahooProvider};
use pricecache_core::domain::StalenessStatus;
use pricecache_core::engine::{Catchup, CatchupStatus, FailurePolicy, LogProgress};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pricecache",
    about = "Local daily price-history cache with incremental catch-up"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and merge whatever each symbol's cache is missing.
    Catchup {
        /// Symbols to update. Defaults to the universe file.
        symbols: Vec<String>,

        #[command(flatten)]
        opts: ConfigArgs,

        /// Stop a batch at its first failing symbol.
        #[arg(long, default_value_t = false)]
        fail_fast: bool,
    },
    /// Show cache state and staleness without fetching.
    Status {
        /// Symbols to report. Defaults to every cached symbol.
        symbols: Vec<String>,

        #[command(flatten)]
        opts: ConfigArgs,

        /// Print JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the batches a catch-up would issue.
    Plan {
        /// Symbols to plan for. Defaults to the universe file.
        symbols: Vec<String>,

        #[command(flatten)]
        opts: ConfigArgs,

        /// Print JSON instead of a list.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[derive(Args)]
struct ConfigArgs {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cache directory (overrides the config file).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Desired first date of every series (YYYY-MM-DD).
    #[arg(long)]
    start: Option<String>,

    /// `|`-delimited symbol listing used when no symbols are given.
    #[arg(long)]
    universe: Option<PathBuf>,
}

impl ConfigArgs {
    fn resolve(&self) -> Result<CatchupConfig> {
        let mut config = match &self.config {
            Some(path) => CatchupConfig::from_file(path)?,
            None => CatchupConfig::default(),
        };
        if let Some(dir) = &self.data_dir {
            if dir.is_file() {
                bail!("--data-dir {} is a file, not a directory", dir.display());
            }
            config.data_dir = dir.clone();
        }
        if let Some(start) = &self.start {
            let date = NaiveDate::parse_from_str(start, "%Y-%m-%d")
                .with_context(|| format!("invalid --start '{start}', expected YYYY-MM-DD"))?;
            config.start_date = Some(date);
        }
        if let Some(universe) = &self.universe {
            config.universe_file = universe.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let today = chrono::Local::now().date_naive();

    match cli.command {
        Commands::Catchup {
            symbols,
            opts,
            fail_fast,
        } => {
            let mut config = opts.resolve()?;
            if fail_fast {
                config.failure_policy = FailurePolicy::AbortBatch;
            }
            run_catchup(config, today, symbols)
        }
        Commands::Status {
            symbols,
            opts,
            json,
        } => run_status(opts.resolve()?, today, symbols, json),
        Commands::Plan {
            symbols,
            opts,
            json,
        } => run_plan(opts.resolve()?, today, symbols, json),
    }
}

fn explicit(symbols: &[String]) -> Option<&[String]> {
    if symbols.is_empty() {
        None
    } else {
        Some(symbols)
    }
}

fn run_catchup(config: CatchupConfig, today: NaiveDate, symbols: Vec<String>) -> Result<()> {
    let catchup = Catchup::new(config, today)?;
    let circuit_breaker = Arc::new(CircuitBreaker::default_provider());
    let provider = YahooProvider::new(circuit_breaker)?;

    let report = catchup.run(&provider, explicit(&symbols), &LogProgress)?;

    for outcome in &report.outcomes {
        if let Err(e) = &outcome.result {
            eprintln!("{} ({}): {e}", outcome.symbol, outcome.period);
        }
    }
    if let Some(e) = &report.aborted {
        eprintln!("aborted: {e}");
    }

    let status = report.status();
    println!("{status}");
    if status == CatchupStatus::Error {
        std::process::exit(1);
    }
    Ok(())
}

fn run_status(
    config: CatchupConfig,
    today: NaiveDate,
    symbols: Vec<String>,
    json: bool,
) -> Result<()> {
    let catchup = Catchup::new(config, today)?;
    let store = catchup.store();
    let symbols = if symbols.is_empty() {
        store.list_symbols()?
    } else {
        catchup.resolve_symbols(Some(symbols.as_slice()))?
    };
    if symbols.is_empty() {
        println!("Cache is empty: {}", store.data_dir().display());
        return Ok(());
    }

    let classifier = catchup.classifier()?;
    let mut rows = Vec::with_capacity(symbols.len());
    for symbol in &symbols {
        let record = store.load_checked(symbol)?;
        let bucket: StalenessStatus = classifier.classify(record.as_ref());
        let behind = record.as_ref().and_then(|r| r.last_date()).map(|last| {
            catchup
                .calendar()
                .trading_days_between(last, classifier.latest_session())
        });
        rows.push((store.status(symbol)?, bucket, behind));
    }

    if json {
        let value: Vec<serde_json::Value> = rows
            .iter()
            .map(|(status, bucket, behind)| {
                serde_json::json!({
                    "symbol": status.symbol,
                    "status": bucket.to_string(),
                    "first_date": status.first_date,
                    "last_date": status.last_date,
                    "rows": status.rows,
                    "sessions_behind": behind,
                    "content_hash": status.content_hash,
                    "no_options": catchup.no_options().contains(&status.symbol),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Cache: {}", store.data_dir().display());
    println!("Latest session: {}", classifier.latest_session());
    println!();
    println!(
        "{:<8} {:<6} {:<25} {:>6} {:>6} {:<16}",
        "Symbol", "Status", "Date Range", "Rows", "Behind", "Hash"
    );
    println!("{}", "-".repeat(72));
    for (status, bucket, behind) in &rows {
        let range = match (status.first_date, status.last_date) {
            (Some(first), Some(last)) => format!("{first} to {last}"),
            _ => "(none)".to_string(),
        };
        let hash = status
            .content_hash
            .as_deref()
            .map_or("-", |h| &h[..h.len().min(16)]);
        let behind = behind.map_or("-".to_string(), |n| n.to_string());
        println!(
            "{:<8} {:<6} {:<25} {:>6} {:>6} {:<16}",
            status.symbol,
            bucket.to_string(),
            range,
            status.rows,
            behind,
            hash
        );
    }
    Ok(())
}

fn run_plan(
    config: CatchupConfig,
    today: NaiveDate,
    symbols: Vec<String>,
    json: bool,
) -> Result<()> {
    let catchup = Catchup::new(config, today)?;
    let symbols = catchup.resolve_symbols(explicit(&symbols))?;
    let batches = catchup.preview(&symbols)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&batches)?);
        return Ok(());
    }

    let requested: usize = batches.iter().map(|b| b.symbols.len()).sum();
    info!(symbols = symbols.len(), requested, "plan built");
    for (i, batch) in batches.iter().enumerate() {
        println!(
            "{:>3}. {:<4} ~{:>4}d {:>3} symbol(s): {}",
            i + 1,
            batch.period.to_string(),
            batch.period.lookback_days(),
            batch.symbols.len(),
            batch.symbols.join(" ")
        );
    }
    Ok(())
}
