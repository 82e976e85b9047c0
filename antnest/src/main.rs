use std::path::PathBuf;

use anyhow::Context;
use antnest::config::load_config;
use antnest::simulation::{FIXED_DT, Simulation, TickSummary};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the headless nest simulation.
#[derive(Parser)]
#[command(name = "antnest", version, about = "Ant colony excavation simulation")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of fixed steps to run.
    #[arg(short, long, default_value_t = 3600)]
    ticks: u64,

    /// Overrides the RNG seed from the configuration.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Log a summary every this many ticks (0 disables periodic reports).
    #[arg(short, long, default_value_t = 600)]
    report_every: u64,
}

fn report(summary: &TickSummary) {
    info!(
        tick = summary.tick,
        ants = summary.ants,
        queen = summary.queen_alive,
        brood = summary.brood,
        larvae = summary.larvae,
        food = format_args!("{:.2}", summary.stored_food),
        waste = format_args!("{:.2}", summary.waste),
        tunnels = summary.tunnels,
        frontier = summary.frontier,
        dug = summary.tiles_dug,
        workfaces = summary.workfaces.active,
        space = format_args!("{:.2}", summary.pressure.space_pressure),
        "colony"
    );
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref()).context("error loading config")?;
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    let mut sim = Simulation::new(&config);
    for _ in 0..cli.ticks {
        sim.tick(FIXED_DT);
        if cli.report_every > 0 && sim.tick % cli.report_every == 0 {
            report(&sim.summary());
        }
    }

    info!("run finished");
    report(&sim.summary());
    Ok(())
}
