//! Strategy runtime - replays a feed file through the configured strategies

use anyhow::{Context as _, Result};
use clap::Parser;
use common::{RuntimeConfig, Ts};
use engine::{Engine, FeedReader, strategies};
use instruments::Universe;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "strategy-runtime", version, about = "Run strategies over a market data feed")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Instrument reference data (JSON array)
    #[arg(long, value_name = "FILE")]
    instruments: Option<PathBuf>,

    /// Feed file (JSON lines)
    #[arg(long, value_name = "FILE")]
    feed: Option<PathBuf>,

    /// Engine clock (ns) at startup; defaults to the first record's time
    #[arg(long, value_name = "NANOS")]
    start_ns: Option<u64>,

    /// Advance the clock to this time (ns) after the feed ends
    #[arg(long, value_name = "NANOS")]
    end_ns: Option<u64>,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    if let Some(filter) = cli.log {
        config.log_filter = filter;
    }
    if cli.instruments.is_some() {
        config.instruments_path = cli.instruments;
    }
    if cli.feed.is_some() {
        config.feed_path = cli.feed;
    }
    if cli.start_ns.is_some() {
        config.start_time_ns = cli.start_ns;
    }
    if cli.end_ns.is_some() {
        config.end_time_ns = cli.end_ns;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting strategy runtime v{}", env!("CARGO_PKG_VERSION"));

    let instruments_path = config
        .instruments_path
        .as_deref()
        .context("no instruments file configured")?;
    let universe = Universe::from_json_file(instruments_path)?;
    info!(instruments = universe.len(), path = %instruments_path.display(), "Universe loaded");

    let feed_path = config.feed_path.as_deref().context("no feed file configured")?;
    let mut records = FeedReader::open(feed_path)?
        .filter_map(|record| match record {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(error = %err, "Skipping feed record");
                None
            }
        })
        .peekable();

    // Timers scheduled in init are relative to this
    let start = config
        .start_time_ns
        .map(Ts::from_nanos)
        .or_else(|| records.peek().map(|record| record.ts))
        .unwrap_or_default();
    info!(%start, "Engine clock anchored");

    let mut engine = Engine::new(universe).starting_at(start);
    for entry in &config.strategies {
        let strategy = strategies::create(&entry.name)?;
        engine.register(strategy, &entry.params)?;
    }

    let summary = engine.run(records, config.end_time_ns.map(Ts::from_nanos));
    info!(
        records = summary.records,
        dispatched = summary.dispatched,
        failures = summary.failures,
        diagnostics = summary.diagnostics,
        timers_fired = summary.timers_fired,
        final_ts = %summary.final_ts,
        "Feed complete"
    );

    engine.shutdown();
    Ok(())
}
