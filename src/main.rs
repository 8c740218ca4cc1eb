//! Dual-Venue Rebalancer - Main Entry Point
//!
//! Runs rebalance cycles against the paper venue, seeded from the local history
//! store, and manages the store's contents.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dual_venue_rebalancer::config::Config;
use dual_venue_rebalancer::exchange::{ExecutionContext, PaperVenue, SwapRecord};
use dual_venue_rebalancer::persistence::{HistoryStore, VenueListing};
use dual_venue_rebalancer::strategy::{AssetOutcome, CycleReport, Rebalancer};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Dual-Venue Rebalancer CLI
#[derive(Parser)]
#[command(name = "dual-venue-rebalancer")]
#[command(version, about = "Volume-weighted rebalancing across an AMM and an order book")]
struct Cli {
    /// Path to the SQLite history store
    #[arg(long, global = true, default_value = "data/rebalancer.db")]
    db: PathBuf,

    /// Configuration file (defaults to ./config.{toml,yaml,json} if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run rebalance cycles on the configured interval until Ctrl-C
    Run,

    /// Run a single rebalance cycle and print the outcome
    Once,

    /// Show what the history store holds
    Status,

    /// Import swap legs from a JSON-lines file
    ImportSwaps {
        /// One `SwapRecord` JSON object per line
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Import assets, AMM pools and order-book markets from a JSON file
    ImportVenues {
        /// `{"assets": [...], "pools": [...], "markets": [...]}`
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.json_logs)?;

    let config = Config::load(cli.config.as_deref())?;
    config.validate()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_loop(config, &cli.db).await,
        Commands::Once => {
            let (rebalancer, ctx) = build(config, &cli.db).await?;
            let report = rebalancer.run_rebalance_cycle(&ctx).await?;
            print_report(&report);
            Ok(())
        }
        Commands::Status => show_status(&config, &cli.db),
        Commands::ImportSwaps { file } => import_swaps(&config, &cli.db, &file),
        Commands::ImportVenues { file } => import_venues(&config, &cli.db, &file),
    }
}

/// Initialize logging to stdout and an hourly rolling file.
fn init_logging(json: bool) -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "rebalancer.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer alive for the program duration
    Box::leak(Box::new(guard));

    let filter = EnvFilter::from_default_env()
        .add_directive("dual_venue_rebalancer=debug".parse()?)
        .add_directive(Level::INFO.into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE);

    if json {
        builder.json().init();
    } else {
        builder.with_ansi(true).init();
    }

    Ok(())
}

fn open_store(config: &Config, db: &Path) -> Result<HistoryStore> {
    if let Some(parent) = db.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    HistoryStore::open(db, &config.quote.asset_id)
}

/// Open the store, seed a paper venue from it and wire up the rebalancer.
async fn build(config: Config, db: &Path) -> Result<(Rebalancer, ExecutionContext)> {
    let store = Arc::new(open_store(&config, db)?);

    let venue = PaperVenue::new(config.sizing.slippage_tolerance);
    venue
        .seed_from(
            store.as_ref(),
            &config.quote.asset_id,
            config.quote.decimals,
            &config.paper.owner,
            config.paper.initial_quote_balance,
        )
        .await
        .context("Failed to seed paper venue")?;

    let ctx = ExecutionContext::from_venue(config.paper.owner.clone(), Arc::new(venue));
    let rebalancer = Rebalancer::new(config, store.clone(), store);
    Ok((rebalancer, ctx))
}

async fn run_loop(config: Config, db: &Path) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        quote = %config.quote.asset_id,
        interval_secs = config.schedule.interval_secs,
        default_max_allocation = %config.allocation.default_max_allocation,
        min_volume_usd = %config.volume.min_volume_usd,
        "Starting Dual-Venue Rebalancer (paper venue)"
    );

    let interval_secs = config.schedule.interval_secs;
    let (rebalancer, ctx) = build(config, db).await?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received");
        shutdown_clone.store(true, Ordering::SeqCst);
    });

    let mut cycle = 0u64;
    while !shutdown.load(Ordering::SeqCst) {
        cycle += 1;
        match rebalancer.run_rebalance_cycle(&ctx).await {
            Ok(report) => info!(
                cycle,
                executed = report.executed(),
                failed = report.failed(),
                venue_failures = report.venue_failures(),
                total_value_usd = %report.snapshot.total_value_usd,
                "Cycle finished"
            ),
            Err(e) => error!(cycle, error = %e, "Cycle aborted"),
        }

        let mut remaining = interval_secs;
        while remaining > 0 && !shutdown.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(1)).await;
            remaining -= 1;
        }
    }

    info!("Dual-Venue Rebalancer shutdown complete");
    Ok(())
}

fn print_report(report: &CycleReport) {
    println!("Flatten");
    println!("   ├─ Positions closed: {}", report.flatten.positions_closed);
    println!("   ├─ Orders cancelled: {}", report.flatten.orders_cancelled);
    println!("   ├─ Markets settled:  {}", report.flatten.markets_settled);
    println!("   └─ Confirmed:        {}", report.flatten.confirmed);

    println!("\nPortfolio");
    println!("   ├─ Quote holdings:   ${:.2}", report.snapshot.quote_holdings_usd);
    println!("   ├─ Total value:      ${:.2}", report.snapshot.total_value_usd);
    println!("   ├─ Over-allocation:  {:.2}%", report.over_allocation * rust_decimal::Decimal::ONE_HUNDRED);
    println!(
        "   └─ Capping:          {} rounds{}",
        report.capping_rounds,
        if report.capping_converged { "" } else { " (not converged)" }
    );

    if !report.summaries.is_empty() {
        println!("\nAllocations");
        println!(
            "   {:<12} {:>14} {:>14} {:>8} {:>8} {:>8}",
            "ASSET", "VOLUME", "LIQUIDITY", "V/L", "TARGET", "CURRENT"
        );
        for s in &report.summaries {
            println!(
                "   {:<12} {:>14.0} {:>14.0} {:>8.2} {:>7.1}% {:>7.1}%",
                s.label(),
                s.volume_usd,
                s.liquidity_usd,
                s.vol_to_liquidity,
                s.capped_allocation * rust_decimal::Decimal::ONE_HUNDRED,
                s.current_allocation * rust_decimal::Decimal::ONE_HUNDRED,
            );
        }
    }

    println!("\nActions");
    for result in &report.results {
        match &result.outcome {
            AssetOutcome::Executed { action, report } => {
                let order = report
                    .placed_order
                    .as_ref()
                    .map(|o| format!("{} {} @ {}", o.side, o.size_base, o.price))
                    .unwrap_or_else(|| "no order".to_string());
                let position = if report.position_id.is_some() { "position opened" } else { "no position" };
                println!(
                    "   ├─ {}: {} | delta ${:.2} | {} | {}{}",
                    result.asset_id,
                    action.plan.branch,
                    action.plan.delta_usd,
                    position,
                    order,
                    if report.success() { "" } else { " | with failures" }
                );
            }
            AssetOutcome::Failed(e) if e.is_data_gap() => {
                println!("   ├─ {}: missing data: {}", result.asset_id, e)
            }
            AssetOutcome::Failed(e) => println!("   ├─ {}: failed: {}", result.asset_id, e),
            AssetOutcome::Untradable(e) => println!("   ├─ {}: skipped: {}", result.asset_id, e),
        }
    }
    println!(
        "   └─ {} executed, {} failed ({} venue errors)",
        report.executed(),
        report.failed(),
        report.venue_failures()
    );
}

fn show_status(config: &Config, db: &Path) -> Result<()> {
    if !db.exists() {
        println!("Database not found: {}", db.display());
        println!("   Import venues and swaps first (see `import-venues` and `import-swaps`).");
        return Ok(());
    }

    let store = HistoryStore::open(db, &config.quote.asset_id)?;
    let summary = store.summary()?;

    println!("History Store ({})", db.display());
    println!("   ├─ Assets:          {} ({} approved)", summary.assets, summary.approved_assets);
    println!("   ├─ AMM pools:       {}", summary.pools);
    println!("   ├─ Order books:     {}", summary.markets);
    println!("   ├─ Swap legs:       {}", summary.swaps);
    println!("   └─ Price samples:   {}", summary.prices);

    println!("\nConfiguration");
    println!("   ├─ Quote asset:     {}", config.quote.asset_id);
    println!("   ├─ Volume window:   {}h (min ${})", config.volume.window_hours, config.volume.min_volume_usd);
    println!("   ├─ Band window:     {}h", config.bands.interval_hours);
    println!("   └─ Default cap:     {}", config.allocation.default_max_allocation);
    Ok(())
}

fn import_swaps(config: &Config, db: &Path, file: &Path) -> Result<()> {
    let reader = BufReader::new(
        std::fs::File::open(file).with_context(|| format!("Failed to open {}", file.display()))?,
    );

    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<SwapRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(line = i + 1, error = %e, "Skipping malformed swap record"),
        }
    }

    let store = open_store(config, db)?;
    let inserted = store.record_swaps(&records)?;
    info!(read = records.len(), inserted, "Swaps imported");
    println!("Imported {inserted} new swap legs ({} read)", records.len());
    Ok(())
}

fn import_venues(config: &Config, db: &Path, file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let listing: VenueListing = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse venue listing {}", file.display()))?;

    let store = open_store(config, db)?;
    store.import_listing(&listing)?;
    println!(
        "Imported {} assets, {} pools, {} markets",
        listing.assets.len(),
        listing.pools.len(),
        listing.markets.len()
    );
    Ok(())
}
