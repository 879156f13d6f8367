use crate::cli::NptArgs;
use crate::config::builder::split_command;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use kwzflow::core::models::stage::{Ensemble, Resources, ThermoRamp, Thermostat};
use kwzflow::engine::config::EngineConfig;
use kwzflow::engine::executor::lammps::LammpsExecutor;
use kwzflow::engine::executor::script::ScriptOptions;
use kwzflow::engine::progress::{ProgressReporter, StageOutcome};
use kwzflow::workflows::npt::{self, NptRequest};
use std::path::{Path, PathBuf};
use tracing::info;

pub fn run(args: NptArgs) -> Result<()> {
    let request = build_request(&args)?;
    let launcher = match &args.launcher {
        Some(command) => split_command(command),
        None => EngineConfig::default().launcher,
    };
    if launcher.is_empty() {
        return Err(CliError::Argument("--launcher must not be empty".to_string()));
    }
    let executor = LammpsExecutor::new(
        launcher,
        ScriptOptions {
            timeout: args.timeout.clone(),
            ..Default::default()
        },
    );

    let handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(handler.get_callback());
    let result = npt::run(&request, &executor, &reporter)?;
    handler.finish();

    match result.outcome {
        StageOutcome::Failed => Err(CliError::StageFailed {
            stage: request.name.clone(),
        }),
        outcome => {
            info!(?outcome, output = %result.output.display(), "Standalone run finished");
            println!("Output: {}", result.output.display());
            Ok(())
        }
    }
}

fn build_request(args: &NptArgs) -> Result<NptRequest> {
    let (ensemble, ramp) = if args.nvt {
        (Ensemble::Nvt, ThermoRamp::nvt(args.tstart, args.tstop))
    } else {
        (
            Ensemble::Npt,
            ThermoRamp::npt(args.tstart, args.tstop, args.pstart, args.pstop),
        )
    };
    Ok(NptRequest {
        name: args.name.clone(),
        directory: absolute(&args.directory)?,
        data: args.input.data.as_deref().map(absolute).transpose()?,
        restart: args.input.restart.as_deref().map(absolute).transpose()?,
        settings: absolute(&args.settings)?,
        pair_coeffs: absolute(&args.pair_coeffs)?,
        ramp,
        steps: args.steps,
        log_every: args.log_every,
        ensemble,
        thermostat: Thermostat::NoseHoover,
        minimize: args.minimize,
        resources: Resources {
            ncores: args.ncores,
            gpu: args.gpu,
        },
        dielectric: args.dielectric,
        seed: args.seed,
    })
}

fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}
