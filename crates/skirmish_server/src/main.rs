//! Skirmish - dedicated headless server
//!
//! Hosts one match at a fixed tick rate.
//!
//! ```bash
//! # Two players, stop after one minute of game time, dump the final view
//! skirmish-server --players 2 --ticks 1200 --dump-view final.json
//!
//! # Custom balance, fixed seed, debug logs
//! skirmish-server --config balance.ron --seed 42 --verbose
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use skirmish_core::simulation::Simulation;
use skirmish_server::tick_loop::run_tick_loop;
use skirmish_server::{host, ServerConfig, ServerError};
use tracing::{error, info, Level};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::{fmt, prelude::*};

#[derive(Parser)]
#[command(name = "skirmish-server")]
#[command(about = "Authoritative skirmish host", long_about = None)]
#[command(version)]
struct Cli {
    /// Simulation config (RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many ticks (runs until Ctrl-C when omitted)
    #[arg(short, long)]
    ticks: Option<u64>,

    /// Override the config's random seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Players to admit at startup
    #[arg(short, long, default_value = "2")]
    players: u8,

    /// Write the final world view as JSON ("-" for stdout)
    #[arg(long)]
    dump_view: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(true))
        .with(filter)
        .init();
}

async fn serve(cli: Cli) -> Result<(), ServerError> {
    let server_config = ServerConfig {
        max_players: cli.players,
        sim_config_path: cli.config,
        max_ticks: cli.ticks,
        ..ServerConfig::default()
    };
    let mut sim_config = server_config.load_sim_config()?;
    if let Some(seed) = cli.seed {
        sim_config = sim_config.with_seed(seed);
    }
    let server_config = ServerConfig {
        tick_rate: sim_config.tick_rate,
        ..server_config
    };

    info!(
        tick_rate = server_config.tick_rate,
        seed = sim_config.seed,
        players = server_config.max_players,
        "Starting skirmish server"
    );

    let (tick_loop, mut handle) = host(&server_config, Simulation::new(sim_config));
    let mut sessions = Vec::new();
    while !handle.lobby.is_full() {
        sessions.push(handle.lobby.join()?);
    }

    let task = tokio::spawn(run_tick_loop(tick_loop));
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for Ctrl-C");
            }
            handle.shutdown();
        }
        () = wait_for_finish(&handle) => {}
    }

    let simulation = task
        .await
        .map_err(|e| ServerError::TickLoop(e.to_string()))?;

    info!(
        tick = simulation.get_tick(),
        state_hash = simulation.state_hash(),
        "Match ended"
    );

    if let Some(path) = cli.dump_view {
        dump_view(&simulation, &path)?;
    }
    Ok(())
}

/// Resolves once the tick loop stops publishing.
async fn wait_for_finish(handle: &skirmish_server::ServerHandle) {
    let mut views = handle.subscribe();
    while views.changed().await.is_ok() {}
}

fn dump_view(simulation: &Simulation, path: &Path) -> Result<(), ServerError> {
    let to_error = |message: String| ServerError::Output {
        path: path.display().to_string(),
        message,
    };
    let json = serde_json::to_string_pretty(&simulation.world_view())
        .map_err(|e| to_error(e.to_string()))?;

    if path.as_os_str() == "-" {
        println!("{json}");
    } else {
        std::fs::write(path, json).map_err(|e| to_error(e.to_string()))?;
        info!(path = %path.display(), "World view written");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match serve(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
