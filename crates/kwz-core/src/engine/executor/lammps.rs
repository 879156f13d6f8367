use super::script::{ScriptOptions, can_resume, render};
use super::{SimulationExecutor, StageStatus};
use crate::core::io::lmplog::LmpLog;
use crate::core::models::stage::StageDescriptor;
use crate::engine::config::{AnalysisConfig, EngineConfig};
use crate::engine::error::EngineError;
use crate::engine::gate::StageGate;
use std::fs::{self, File};
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Runs stages by rendering a LAMMPS input script and launching the engine
/// through a configurable command template.
pub struct LammpsExecutor {
    launcher: Vec<String>,
    options: ScriptOptions,
}

impl LammpsExecutor {
    pub fn new(launcher: Vec<String>, options: ScriptOptions) -> Self {
        Self { launcher, options }
    }

    pub fn from_config(engine: &EngineConfig, analysis: &AnalysisConfig) -> Self {
        Self::new(
            engine.launcher.clone(),
            ScriptOptions {
                timeout: engine.timeout.clone(),
                cluster_cutoff: analysis.cluster_cutoff,
            },
        )
    }

    /// The launch command with `{ncores}`, `{script}` and `{log}` expanded.
    pub fn command_for(&self, stage: &StageDescriptor) -> Vec<String> {
        let ncores = stage.resources.ncores.to_string();
        let script = stage.script_path().display().to_string();
        let log = stage.outputs.log.display().to_string();
        self.launcher
            .iter()
            .map(|arg| {
                arg.replace("{ncores}", &ncores)
                    .replace("{script}", &script)
                    .replace("{log}", &log)
            })
            .collect()
    }
}

impl SimulationExecutor for LammpsExecutor {
    fn run(&self, stage: &StageDescriptor) -> Result<StageStatus, EngineError> {
        fs::create_dir_all(&stage.directory).map_err(|e| EngineError::io(&stage.directory, e))?;

        let script_path = stage.script_path();
        fs::write(&script_path, render(stage, &self.options))
            .map_err(|e| EngineError::io(&script_path, e))?;

        let log_offset = fs::metadata(&stage.outputs.log).map_or(0, |m| m.len());
        let command = self.command_for(stage);
        let (program, args) = command
            .split_first()
            .ok_or_else(|| EngineError::Internal("empty launcher command".to_string()))?;

        let stdout_path = stage.stdout_path();
        let stdout = File::create(&stdout_path).map_err(|e| EngineError::io(&stdout_path, e))?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| EngineError::io(&stdout_path, e))?;

        info!(
            stage = %stage.name,
            resume = can_resume(stage),
            command = %command.join(" "),
            "Launching engine"
        );
        let status = Command::new(program)
            .args(args)
            .current_dir(&stage.directory)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()
            .map_err(|source| EngineError::Launch {
                program: program.clone(),
                source,
            })?;

        let outcome = classify(stage, status.success(), log_offset);
        match outcome {
            StageStatus::Completed => info!(stage = %stage.name, "Stage completed"),
            StageStatus::Interrupted => warn!(stage = %stage.name, "Engine wall-time budget reached"),
            StageStatus::Failed => warn!(stage = %stage.name, exit = ?status.code(), "Stage failed"),
        }
        Ok(outcome)
    }
}

/// Maps an engine exit to a stage status. Only log text written after
/// `log_offset` (the log size before launch) is considered.
pub fn classify(stage: &StageDescriptor, exited_ok: bool, log_offset: u64) -> StageStatus {
    if exited_ok && StageGate::is_complete(stage) {
        StageStatus::Completed
    } else if wall_time_reached(&stage.outputs.log, log_offset) {
        StageStatus::Interrupted
    } else {
        StageStatus::Failed
    }
}

fn wall_time_reached(log: &Path, offset: u64) -> bool {
    let read = || -> std::io::Result<bool> {
        let mut file = File::open(log)?;
        file.seek(SeekFrom::Start(offset))?;
        let parsed = LmpLog::read_from(&mut BufReader::new(file))
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(parsed.wall_time_reached())
    };
    read().unwrap_or_else(|e| {
        debug!(log = %log.display(), error = %e, "No readable engine log");
        false
    })
}
