pub mod lammps;
pub mod script;

use super::error::EngineError;
use crate::core::models::stage::StageDescriptor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    /// The engine exited cleanly and wrote the canonical output.
    Completed,
    /// The engine crashed, did not converge or left no canonical output.
    Failed,
    /// The engine stopped on its own wall-time budget; the stage resumes
    /// from its intermediate restart on the next submission.
    Interrupted,
}

impl StageStatus {
    pub fn is_success(self) -> bool {
        self == StageStatus::Completed
    }
}

/// Runs one simulation stage to completion. Blocks until the engine exits.
///
/// `Err` is reserved for environment failures such as an engine that cannot
/// be launched; simulation outcomes are reported through [`StageStatus`].
pub trait SimulationExecutor {
    fn run(&self, stage: &StageDescriptor) -> Result<StageStatus, EngineError>;
}
