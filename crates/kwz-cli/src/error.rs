use kwzflow::engine::config::ConfigError;
use kwzflow::engine::error::{EXIT_FATAL, EngineError};
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] EngineError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse file '{path}': {source}", path = path.display())]
    FileParsing {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("Stage '{stage}' failed; see its log for details")]
    StageFailed { stage: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl CliError {
    /// Process exit status. Engine errors keep their protocol-specific codes
    /// so batch scripts can tell a retry ceiling from a wall-time stop.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Core(e) => e.exit_code(),
            _ => EXIT_FATAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kwzflow::engine::error::{EXIT_VOID_EXHAUSTED, EXIT_WALL_TIME};

    #[test]
    fn engine_errors_keep_their_exit_codes() {
        let err: CliError = EngineError::VoidSpaceExhausted { attempts: 5 }.into();
        assert_eq!(err.exit_code(), EXIT_VOID_EXHAUSTED);

        let err: CliError = EngineError::WallTimeReached {
            stage: "quench_3".to_string(),
        }
        .into();
        assert_eq!(err.exit_code(), EXIT_WALL_TIME);
    }

    #[test]
    fn cli_errors_are_fatal() {
        let err = CliError::Argument("bad".to_string());
        assert_eq!(err.exit_code(), EXIT_FATAL);
        let err: CliError = ConfigError::MissingParameter("cycles").into();
        assert!(matches!(err, CliError::Config(ref m) if m.contains("cycles")));
    }
}
