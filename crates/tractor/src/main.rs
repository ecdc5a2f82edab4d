// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use harrow::canbus::{CanBus, CanTransport};
use harrow::config::{Config, Topology, TractorParams};
use harrow::control::TractorController;
use harrow::sim::{SimMotorBank, SimMotorParams};
use harrow_bus::{BusConfig, EventBus};

#[derive(Parser)]
#[command(name = "harrow", version, about = "Tractor control runtime on the harrow event bus.")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    subcommand: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Print the default tractor geometry as JSON.
    GenConfig,
}

// Single-threaded dispatch: every bus callback, timer fire, and reader runs
// on one cooperative scheduler. Handlers must stay inside the tick budget.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    if let Some(Commands::GenConfig) = cli.subcommand {
        match TractorParams::default().to_json_pretty() {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let config = cli.config;
    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }
    init_tracing(&config);

    if let Err(e) = run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging from config.
///
/// Priority: --log-level / HARROW_LOG_LEVEL > RUST_LOG > default ("info").
fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter = if std::env::var("HARROW_LOG_LEVEL").is_err() && config.log_level == "info" {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    } else {
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

async fn run(config: Config) -> anyhow::Result<()> {
    let params = match config.tractor_config {
        Some(ref path) => TractorParams::load(path)?,
        None => TractorParams::default(),
    };

    let bus = EventBus::bind(BusConfig::new(config.service.as_str())).await?;
    let shutdown = CancellationToken::new();

    let transport = if config.can_interface == "sim" {
        let (tractor_side, sim_side) = CanTransport::virtual_pair();
        let mut motors = vec![
            SimMotorParams { node_id: params.left_motor_node },
            SimMotorParams { node_id: params.right_motor_node },
        ];
        if params.topology == Topology::FourMotorSkidSteer {
            motors.push(SimMotorParams { node_id: params.left_aft_motor_node });
            motors.push(SimMotorParams { node_id: params.right_aft_motor_node });
        }
        let _sim_bank = SimMotorBank::new(sim_side, motors).spawn(config.rate_hz, shutdown.clone());
        tractor_side
    } else {
        CanTransport::open(&config.can_interface)?
    };
    let can = CanBus::new(transport);

    let controller = TractorController::new(&bus, &can, &params, config.rate_hz);
    let control_loop = tokio::spawn(controller.run(shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    shutdown.cancel();
    let _ = control_loop.await;
    Ok(())
}
