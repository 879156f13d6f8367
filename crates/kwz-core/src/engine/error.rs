use std::io;
use std::path::PathBuf;
use thiserror::Error;

use super::comm::CommError;
use super::config::ConfigError;
use crate::core::io::lmpdat::LmpdatError;
use crate::core::io::lmplog::LogError;
use crate::core::models::stage::StageKind;

pub const EXIT_SYSPREP_CEILING: i32 = 100;
pub const EXIT_QUENCH_CEILING: i32 = 101;
pub const EXIT_VOID_EXHAUSTED: i32 = 102;
pub const EXIT_WALL_TIME: i32 = 103;
pub const EXIT_RESET_CEILING: i32 = 104;
pub const EXIT_FATAL: i32 = 1;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Stage '{stage}' failed {attempts} times, giving up")]
    RetryCeilingExceeded {
        stage: StageKind,
        attempts: u32,
        exit_code: i32,
    },

    #[error("Could not create voids free of clashes after {attempts} attempts")]
    VoidSpaceExhausted { attempts: u32 },

    #[error("Engine wall-time budget reached during '{stage}'; resubmit to resume")]
    WallTimeReached { stage: String },

    #[error("Cycle {cycle} was reset {resets} times, giving up")]
    ResetCeilingExceeded { cycle: usize, resets: u32 },

    #[error("Failed to quarantine '{path}': {source}")]
    Quarantine {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Required input '{0}' does not exist")]
    MissingInput(PathBuf),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to launch engine '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid frame record '{path}': {message}")]
    FrameRecord { path: PathBuf, message: String },

    #[error("No frame of the annealing trajectories in '{0}' could be selected")]
    NoFrame(PathBuf),

    #[error("Thermo log error: {0}")]
    Log(#[from] LogError),

    #[error("Data file error: {0}")]
    Lmpdat(#[from] LmpdatError),

    #[error("Worker communication failed: {0}")]
    Communication(#[from] CommError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Coordinator aborted the run: {message}")]
    Aborted { code: i32, message: String },

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code reported to the job scheduler.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::RetryCeilingExceeded { exit_code, .. } => *exit_code,
            EngineError::VoidSpaceExhausted { .. } => EXIT_VOID_EXHAUSTED,
            EngineError::WallTimeReached { .. } => EXIT_WALL_TIME,
            EngineError::ResetCeilingExceeded { .. } => EXIT_RESET_CEILING,
            EngineError::Aborted { code, .. } => *code,
            _ => EXIT_FATAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalated_failures_have_distinct_exit_codes() {
        let codes = [
            EngineError::RetryCeilingExceeded {
                stage: StageKind::Sysprep,
                attempts: 21,
                exit_code: EXIT_SYSPREP_CEILING,
            }
            .exit_code(),
            EngineError::RetryCeilingExceeded {
                stage: StageKind::Quench,
                attempts: 21,
                exit_code: EXIT_QUENCH_CEILING,
            }
            .exit_code(),
            EngineError::VoidSpaceExhausted { attempts: 5 }.exit_code(),
            EngineError::WallTimeReached {
                stage: "anneal_0".to_string(),
            }
            .exit_code(),
            EngineError::ResetCeilingExceeded { cycle: 0, resets: 3 }.exit_code(),
            EngineError::MissingInput(PathBuf::from("main.lmpdat")).exit_code(),
        ];
        assert_eq!(codes, [100, 101, 102, 103, 104, 1]);
    }

    #[test]
    fn aborted_carries_coordinator_code() {
        let err = EngineError::Aborted {
            code: 101,
            message: "quench".to_string(),
        };
        assert_eq!(err.exit_code(), 101);
    }
}
