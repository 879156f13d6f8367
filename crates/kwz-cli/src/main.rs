mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod utils;

use crate::cli::{Cli, Commands};
use crate::error::{CliError, Result};
use clap::Parser;
use kwzflow::engine::comm::WorkerGroup;
use tracing::{debug, error, info};

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run_app(cli) {
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

#[cfg(feature = "mpi")]
fn worker_group() -> Result<WorkerGroup> {
    use kwzflow::engine::comm::mpi::MpiCommunicator;
    use kwzflow::engine::error::EngineError;

    let comm = MpiCommunicator::initialize().map_err(EngineError::from)?;
    Ok(WorkerGroup::new(Box::new(comm)))
}

#[cfg(not(feature = "mpi"))]
fn worker_group() -> Result<WorkerGroup> {
    Ok(WorkerGroup::solo())
}

fn run_app(cli: Cli) -> Result<()> {
    let group = match &cli.command {
        Commands::Run(_) => Some(worker_group()?),
        _ => None,
    };
    let (rank, size) = group.as_ref().map_or((0, 1), |g| (g.rank(), g.size()));

    let worker = logging::setup_logging(&logging::LogSettings {
        verbosity: cli.verbose,
        quiet: cli.quiet,
        file: cli.log_file.clone(),
        rank,
        workers: size,
    })?;
    let _worker = worker.entered();

    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default().into_hooks();
    eyre_hook.install().map_err(|e| CliError::Other(e.into()))?;
    std::panic::set_hook(Box::new(move |pi| {
        error!("{}", panic_hook.panic_report(pi));
    }));

    info!(
        rank,
        workers = size,
        "🚀 kwz CLI v{} starting up.",
        env!("CARGO_PKG_VERSION")
    );
    debug!("Full CLI arguments parsed: {:?}", &cli);

    let command_result = match cli.command {
        Commands::Run(args) => {
            info!("Dispatching to 'run' command.");
            match &group {
                Some(group) => commands::run::run(args, group),
                None => Err(CliError::Other(anyhow::anyhow!(
                    "worker group was not initialized"
                ))),
            }
        }
        Commands::Status(args) => {
            info!("Dispatching to 'status' command.");
            commands::status::run(args)
        }
        Commands::Npt(args) => {
            info!("Dispatching to 'npt' command.");
            commands::npt::run(args)
        }
    };

    match &command_result {
        Ok(_) => {
            info!("✅ Command completed successfully.");
            if rank == 0 {
                println!("✅ Command completed successfully.");
            }
        }
        Err(e) => {
            error!(exit_code = e.exit_code(), "❌ Command failed: {}", e);
        }
    }

    command_result
}
