//! Replay CLI: ingest, run, and store management commands.
//!
//! Commands:
//! - `ingest`: fetch klines from Binance and merge them into the Parquet store
//! - `run`: execute backtest jobs from TOML configs or command-line flags
//! - `store status`: report stored symbols, ranges and candle counts

mod obs;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use replay_core::data::{
    ingest_symbols, BinanceProvider, CircuitBreaker, KlineRequest, ParquetStore,
};
use replay_core::domain::PRICE_SCALE;
use replay_runner::{run_jobs_from_store, save_artifacts, JobConfig, JobOutcome, StrategyConfig};

use crate::obs::LogFormat;

const DEFAULT_WINDOW: usize = 20;

#[derive(Parser)]
#[command(name = "replay", about = "Replay: streaming backtest engine for exchange candles")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    /// Log filter, e.g. `info` or `replay_core=debug`. REPLAY_LOG overrides it.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch klines from Binance and merge them into the store.
    Ingest {
        /// Symbols to ingest (e.g., BTCUSDT ETHUSDT).
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Kline interval code.
        #[arg(long, default_value = "1m")]
        interval: String,

        /// Candles per request (1..=1000).
        #[arg(long, default_value_t = 1000)]
        limit: u32,

        /// Start time: epoch milliseconds, YYYY-MM-DD, or RFC 3339.
        #[arg(long)]
        start: Option<String>,

        /// End time: epoch milliseconds, YYYY-MM-DD, or RFC 3339.
        #[arg(long)]
        end: Option<String>,

        /// Store directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        store: PathBuf,

        /// Override the exchange base URL.
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Execute backtest jobs from TOML configs or flags.
    Run(RunArgs),
    /// Store management commands.
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Paths to TOML job files. Jobs run in parallel.
    #[arg(long = "config")]
    configs: Vec<PathBuf>,

    /// Symbol (flag mode).
    #[arg(long)]
    symbol: Option<String>,

    /// Start time: epoch milliseconds, YYYY-MM-DD, or RFC 3339.
    #[arg(long)]
    start: Option<String>,

    /// End time, inclusive. A bare date means the end of that day.
    #[arg(long)]
    end: Option<String>,

    /// Momentum window in candles. Defaults to 20 (flag mode).
    #[arg(long)]
    window: Option<usize>,

    /// Position size per signal. Defaults to 1.0 (flag mode).
    #[arg(long)]
    size: Option<f64>,

    /// Candles per batch (flag mode).
    #[arg(long)]
    batch_size: Option<usize>,

    /// Store directory. Defaults to ./data (flag mode).
    #[arg(long)]
    store: Option<PathBuf>,

    /// Output directory for artifacts. Overrides the config's `output.dir`.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum StoreAction {
    /// Report stored symbols, time ranges and candle counts.
    Status {
        /// Symbols to report. Defaults to everything in the store.
        symbols: Vec<String>,

        /// Store directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        store: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    obs::init_tracing(&cli.log_level, cli.log_format).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Ingest {
            symbols,
            interval,
            limit,
            start,
            end,
            store,
            base_url,
        } => run_ingest(symbols, interval, limit, start, end, store, base_url),
        Commands::Run(args) => {
            let jobs = resolve_jobs(&args)?;
            run_backtests(&jobs, args.output_dir)
        }
        Commands::Store { action } => match action {
            StoreAction::Status { symbols, store } => run_store_status(&store, &symbols),
        },
    }
}

fn run_ingest(
    symbols: Vec<String>,
    interval: String,
    limit: u32,
    start: Option<String>,
    end: Option<String>,
    store_dir: PathBuf,
    base_url: Option<String>,
) -> Result<()> {
    let start_time = start.as_deref().map(|s| parse_time(s, false)).transpose()?;
    let end_time = end.as_deref().map(|s| parse_time(s, true)).transpose()?;
    if let (Some(s), Some(e)) = (start_time, end_time) {
        if s > e {
            bail!("--start is after --end");
        }
    }

    let circuit_breaker = Arc::new(CircuitBreaker::for_exchange());
    let mut provider = BinanceProvider::new(circuit_breaker)?;
    if let Some(url) = base_url {
        provider = provider.with_base_url(url);
    }
    let store = ParquetStore::new(store_dir);

    let requests: Vec<KlineRequest> = symbols
        .iter()
        .map(|sym| KlineRequest::new(sym.as_str(), interval.as_str(), limit).with_range(start_time, end_time))
        .collect();

    let summary = ingest_symbols(&provider, &store, &requests);

    for report in &summary.reports {
        println!(
            "{:<12} fetched {:>6}  stored {:>8} ({} to {})",
            report.symbol,
            report.fetched,
            report.meta.candle_count,
            format_ts(report.meta.first_timestamp),
            format_ts(report.meta.last_timestamp),
        );
    }

    if !summary.all_succeeded() {
        for (sym, err) in &summary.errors {
            eprintln!("Error for {sym}: {err}");
        }
        std::process::exit(1);
    }

    Ok(())
}

/// Jobs from `--config` files, or one job built from flags.
///
/// The two modes are exclusive: job flags alongside `--config` are an error.
fn resolve_jobs(args: &RunArgs) -> Result<Vec<JobConfig>> {
    if args.configs.is_empty() {
        let job = config_from_flags(
            args.symbol.clone(),
            args.start.clone(),
            args.end.clone(),
            args.window,
            args.size,
            args.batch_size,
            args.store.clone(),
        )?;
        return Ok(vec![job]);
    }

    let conflicting: Vec<&str> = [
        ("--symbol", args.symbol.is_some()),
        ("--start", args.start.is_some()),
        ("--end", args.end.is_some()),
        ("--window", args.window.is_some()),
        ("--size", args.size.is_some()),
        ("--batch-size", args.batch_size.is_some()),
        ("--store", args.store.is_some()),
    ]
    .into_iter()
    .filter_map(|(flag, set)| set.then_some(flag))
    .collect();
    if !conflicting.is_empty() {
        bail!("--config cannot be combined with {}", conflicting.join(", "));
    }

    args.configs
        .iter()
        .map(|path| JobConfig::from_file(path).map_err(anyhow::Error::from))
        .collect()
}

fn config_from_flags(
    symbol: Option<String>,
    start: Option<String>,
    end: Option<String>,
    window: Option<usize>,
    size: Option<f64>,
    batch_size: Option<usize>,
    store: Option<PathBuf>,
) -> Result<JobConfig> {
    let Some(symbol) = symbol else {
        bail!("one of --config or --symbol is required");
    };
    let start_time = match start.as_deref() {
        Some(s) => parse_time(s, false)?,
        None => 0,
    };
    let end_time = match end.as_deref() {
        Some(s) => parse_time(s, true)?,
        None => now_ms(),
    };

    let window = window.unwrap_or(DEFAULT_WINDOW);
    let mut config = JobConfig::momentum(symbol, start_time, end_time, window);
    if let Some(size) = size {
        config.strategy = StrategyConfig::Momentum { window, size };
    }
    if let Some(store) = store {
        config.data.store_dir = store;
    }
    if let Some(batch_size) = batch_size {
        config.data.batch_size = batch_size;
    }
    config.validate()?;
    Ok(config)
}

fn run_backtests(jobs: &[JobConfig], output_dir: Option<PathBuf>) -> Result<()> {
    let results = run_jobs_from_store(jobs);

    let mut failed = 0;
    for (config, result) in jobs.iter().zip(results) {
        match result {
            Ok(outcome) => {
                print_summary(&outcome);
                let dir = output_dir.as_ref().or(config.output.dir.as_ref());
                if let Some(dir) = dir {
                    let job_dir = save_artifacts(&outcome, dir)?;
                    println!("Artifacts saved to: {}", job_dir.display());
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("Job {} ({}) failed: {e}", config.job_id(), config.job.symbol);
            }
        }
    }

    tracing::info!(jobs = jobs.len(), failed, "run complete");
    if failed > 0 {
        bail!("{failed} of {} job(s) failed", jobs.len());
    }
    Ok(())
}

fn run_store_status(store_dir: &Path, symbols: &[String]) -> Result<()> {
    if !store_dir.exists() {
        println!("Store directory does not exist: {}", store_dir.display());
        return Ok(());
    }

    let store = ParquetStore::new(store_dir);
    let symbols = if symbols.is_empty() {
        store.symbols()?
    } else {
        symbols.to_vec()
    };
    if symbols.is_empty() {
        println!("Store is empty: {}", store_dir.display());
        return Ok(());
    }

    let refs: Vec<&str> = symbols.iter().map(String::as_str).collect();
    println!("Store: {}", store_dir.display());
    println!();
    println!("{:<12} {:<45} {:>10}", "Symbol", "Range (UTC)", "Candles");
    println!("{}", "-".repeat(69));
    for status in store.status(&refs) {
        let range = match (status.first_timestamp, status.last_timestamp) {
            (Some(first), Some(last)) => format!("{} to {}", format_ts(first), format_ts(last)),
            _ => "(not stored)".into(),
        };
        let count = status
            .candle_count
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".into());
        println!("{:<12} {:<45} {:>10}", status.symbol, range, count);
    }

    Ok(())
}

/// Epoch milliseconds, a bare date, or an RFC 3339 timestamp.
///
/// A bare date is the start of that day, or its last millisecond when
/// `end_of_day` is set.
fn parse_time(s: &str, end_of_day: bool) -> Result<u64> {
    let s = s.trim();
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse().with_context(|| format!("invalid timestamp '{s}'"));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let time = if end_of_day {
            NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
        } else {
            NaiveTime::from_hms_opt(0, 0, 0)
        };
        let Some(time) = time else {
            bail!("invalid time of day");
        };
        return to_ms(date.and_time(time).and_utc().timestamp_millis(), s);
    }
    let parsed = DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("expected epoch ms, YYYY-MM-DD or RFC 3339, got '{s}'"))?;
    to_ms(parsed.timestamp_millis(), s)
}

fn to_ms(millis: i64, input: &str) -> Result<u64> {
    u64::try_from(millis).with_context(|| format!("'{input}' is before the Unix epoch"))
}

fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

fn format_ts(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn print_summary(outcome: &JobOutcome) {
    let result = &outcome.result;
    println!();
    println!("=== Backtest Result ===");
    println!("Job:            {}", result.job_id);
    println!("Symbol:         {}", result.symbol);
    println!("Strategy:       {}", result.strategy_id);
    println!(
        "Period:         {} to {}",
        format_ts(result.start_time),
        format_ts(result.end_time)
    );
    println!(
        "Candles:        {} in {} batch(es)",
        outcome.candles_seen, outcome.stream.batches
    );
    println!("Signals:        {}", outcome.history.len());
    println!();
    println!("--- Performance ---");
    println!(
        "Total PnL:      {} ({:.2} quote)",
        result.total_pnl,
        result.total_pnl as f64 / PRICE_SCALE as f64
    );
    println!("Sharpe:         {:.3}", result.sharpe_ratio);
    println!(
        "Max Drawdown:   {:.0} ({:.2} quote)",
        result.max_drawdown,
        result.max_drawdown / PRICE_SCALE as f64
    );
    println!("Execution Time: {} ms", result.execution_time_ms);
    println!();
}
