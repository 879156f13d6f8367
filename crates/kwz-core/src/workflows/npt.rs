use crate::core::models::layout::RunFiles;
use crate::core::models::stage::{
    Ensemble, Operation, Resources, StageDescriptor, StageInputs, StageOutputs, ThermoRamp,
    Thermostat,
};
use crate::engine::config::ConfigError;
use crate::engine::error::EngineError;
use crate::engine::executor::{SimulationExecutor, StageStatus};
use crate::engine::gate::StageGate;
use crate::engine::progress::{Progress, ProgressReporter, StageOutcome};
use std::fs;
use std::path::PathBuf;
use tracing::{info, instrument};

/// Input of a standalone run: exactly one of `data` and `restart` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct NptRequest {
    pub name: String,
    pub directory: PathBuf,
    pub data: Option<PathBuf>,
    pub restart: Option<PathBuf>,
    pub settings: PathBuf,
    pub pair_coeffs: PathBuf,
    pub ramp: ThermoRamp,
    pub steps: u64,
    pub log_every: u64,
    pub ensemble: Ensemble,
    pub thermostat: Thermostat,
    pub minimize: bool,
    pub resources: Resources,
    pub dielectric: Option<f64>,
    pub seed: u64,
}

impl NptRequest {
    pub fn descriptor(&self) -> Result<StageDescriptor, ConfigError> {
        if self.data.is_some() == self.restart.is_some() {
            return Err(ConfigError::InvalidValue {
                parameter: "input",
                reason: "exactly one of a data file or a restart file is required".to_string(),
            });
        }
        if self.ensemble == Ensemble::Npt && (self.ramp.pstart.is_none() || self.ramp.pstop.is_none()) {
            return Err(ConfigError::MissingParameter("pressure ramp"));
        }
        if self.log_every == 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "log_every",
                reason: "must be positive".to_string(),
            });
        }

        let files = RunFiles::with_stem(&self.directory, &self.name);
        Ok(StageDescriptor {
            name: self.name.clone(),
            directory: self.directory.clone(),
            inputs: StageInputs {
                data: self.data.clone(),
                restart: self.restart.clone(),
            },
            outputs: StageOutputs {
                primary: files.restart,
                intermediate: Some(files.intermediate),
                trajectory: Some(files.trajectory),
                log: files.log,
                data: None,
            },
            settings: self.settings.clone(),
            pair_coeffs: self.pair_coeffs.clone(),
            ramp: self.ramp,
            steps: self.steps,
            log_every: self.log_every,
            resources: self.resources,
            dielectric: self.dielectric,
            solvate_atoms: None,
            group: None,
            seed: self.seed,
            operation: Operation::Dynamics {
                ensemble: self.ensemble,
                thermostat: self.thermostat,
                minimize: self.minimize,
                unwrap: false,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NptResult {
    pub outcome: StageOutcome,
    pub output: PathBuf,
}

/// Runs one dynamics stage outside the cycle protocol. A present output is
/// reused; an interrupted engine is reported like in a full run.
#[instrument(skip_all, name = "npt_workflow", fields(stage = %request.name))]
pub fn run(
    request: &NptRequest,
    executor: &dyn SimulationExecutor,
    reporter: &ProgressReporter,
) -> Result<NptResult, EngineError> {
    let stage = request.descriptor()?;
    reporter.report(Progress::StageStart {
        name: stage.name.clone(),
    });

    let outcome = if StageGate::is_complete(&stage) {
        info!("Output already present, nothing to run");
        StageOutcome::Reused
    } else {
        fs::create_dir_all(&stage.directory).map_err(|e| EngineError::io(&stage.directory, e))?;
        match executor.run(&stage)? {
            StageStatus::Completed => StageOutcome::Completed,
            StageStatus::Failed => StageOutcome::Failed,
            StageStatus::Interrupted => {
                return Err(EngineError::WallTimeReached {
                    stage: stage.name.clone(),
                });
            }
        }
    };

    reporter.report(Progress::StageFinish {
        name: stage.name.clone(),
        outcome,
    });
    Ok(NptResult {
        outcome,
        output: stage.outputs.primary,
    })
}
