//! Paper-trading driver.
//!
//! Runs both ladder engines against the in-process simulated venue: a
//! random-walk market feeds depth deltas and fills crossed orders, and the
//! coordinator trades it exactly as it would a live venue.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::Rng;
use tokio::sync::mpsc::unbounded_channel;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gridladder::depth::{run_depth_consumer, DepthCache};
use gridladder::errors::Error;
use gridladder::sim::SimExchange;
use gridladder::strategy::{EngineConfig, ExecutionCoordinator};

#[derive(Debug, Parser)]
#[command(about = "Run the ladder engines against a simulated random-walk market")]
struct Cli {
    /// TOML engine configuration; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Starting mid price of the simulated market.
    #[arg(long, default_value_t = 0.1)]
    start_mid: f64,

    /// Per-step fractional volatility of the random walk.
    #[arg(long, default_value_t = 0.0005)]
    volatility: f64,

    /// How long to run, in seconds.
    #[arg(long, default_value_t = 60)]
    duration_secs: u64,
}

fn load_config(cli: &Cli) -> gridladder::Result<EngineConfig> {
    match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
            toml::from_str(&text)
                .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))
        }
        None => Ok(EngineConfig::default()),
    }
}

#[tokio::main]
async fn main() -> gridladder::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if cli.volatility <= 0.0 {
        return Err(Error::Config("volatility must be positive".to_string()));
    }
    let config = load_config(&cli)?;
    let symbol = config.symbol.clone();

    let (event_tx, event_rx) = unbounded_channel();
    let (depth_tx, depth_rx) = unbounded_channel();
    let sim = Arc::new(SimExchange::new(cli.start_mid, event_tx));
    let depth = Arc::new(DepthCache::new());

    tokio::spawn(run_depth_consumer(Arc::clone(&depth), depth_rx));

    // Random-walk market: move the mid, fill crossed orders, publish the
    // resulting depth delta.
    let driver_sim = Arc::clone(&sim);
    let driver_depth = Arc::clone(&depth);
    let driver_symbol = symbol.clone();
    let volatility = cli.volatility;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(250));
        let mut ticks: u64 = 0;
        loop {
            ticker.tick().await;
            let step = rand::thread_rng().gen_range(-volatility..volatility);
            let mid = driver_sim.mid() * (1.0 + step);
            let delta = driver_sim.advance_mid(&driver_symbol, mid);
            if depth_tx.send(delta).is_err() {
                break;
            }
            ticks += 1;
            if ticks % 40 == 0 {
                let (bids, asks) = driver_depth.top_levels(&driver_symbol, 1);
                info!(?bids, ?asks, "top of book");
            }
        }
    });

    let mut coordinator =
        ExecutionCoordinator::new(sim.clone(), Arc::clone(&depth), config, event_rx)?;
    coordinator.initialize().await?;
    info!(symbol = %symbol, start_mid = cli.start_mid, "paper session started");

    tokio::select! {
        result = coordinator.run() => result?,
        _ = tokio::time::sleep(Duration::from_secs(cli.duration_secs)) => {
            info!("paper session finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
        }
    }

    let (tier_buy_cycles, tier_sell_cycles) = coordinator.tier().profit_cycles();
    let (grid_buy_cycles, grid_sell_cycles) = coordinator.grid().profit_cycles();
    info!(
        tier_buy_cycles,
        tier_sell_cycles,
        grid_buy_cycles,
        grid_sell_cycles,
        resting = sim.resting_orders().len(),
        final_mid = sim.mid(),
        "session summary"
    );
    Ok(())
}
