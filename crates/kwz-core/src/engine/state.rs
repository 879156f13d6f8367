use super::config::RetryConfig;
use super::error::{EXIT_QUENCH_CEILING, EXIT_SYSPREP_CEILING, EngineError};
use crate::core::models::stage::StageKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleStage {
    Sysprep,
    Quench,
    Anneal,
    Requench,
    Done,
}

impl CycleStage {
    pub fn kind(self) -> Option<StageKind> {
        match self {
            CycleStage::Sysprep => Some(StageKind::Sysprep),
            CycleStage::Quench => Some(StageKind::Quench),
            CycleStage::Anneal => Some(StageKind::Anneal),
            CycleStage::Requench => Some(StageKind::Requench),
            CycleStage::Done => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptCounters {
    pub sysprep: u32,
    pub quench: u32,
}

/// Mutable progress of one aggregation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleState {
    pub cycle: usize,
    pub stage: CycleStage,
    pub attempts: AttemptCounters,
    /// Full-cycle resets performed so far; never cleared within a cycle.
    pub resets: u32,
}

impl CycleState {
    pub fn new(cycle: usize) -> Self {
        Self {
            cycle,
            stage: CycleStage::Sysprep,
            attempts: AttemptCounters::default(),
            resets: 0,
        }
    }

    pub fn advance(&mut self, stage: CycleStage) {
        self.stage = stage;
    }

    pub fn is_done(&self) -> bool {
        self.stage == CycleStage::Done
    }

    /// Restarts the cycle at sysprep with fresh attempt budgets.
    pub fn reset_cycle(&mut self, ceiling: Option<u32>) -> Result<(), EngineError> {
        self.attempts = AttemptCounters::default();
        self.stage = CycleStage::Sysprep;
        self.resets += 1;
        match ceiling {
            Some(limit) if self.resets > limit => Err(EngineError::ResetCeilingExceeded {
                cycle: self.cycle,
                resets: self.resets,
            }),
            _ => Ok(()),
        }
    }
}

/// Bounded retry budget of a single stage with its escalation exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub stage: StageKind,
    pub ceiling: u32,
    pub exit_code: i32,
}

impl RetryPolicy {
    pub fn sysprep(config: &RetryConfig) -> Self {
        Self {
            stage: StageKind::Sysprep,
            ceiling: config.sysprep_ceiling,
            exit_code: EXIT_SYSPREP_CEILING,
        }
    }

    pub fn quench(config: &RetryConfig) -> Self {
        Self {
            stage: StageKind::Quench,
            ceiling: config.quench_ceiling,
            exit_code: EXIT_QUENCH_CEILING,
        }
    }

    /// Counts one failed attempt. The stage may be tried `ceiling + 1` times
    /// in total before this escalates.
    pub fn register_failure(&self, counter: &mut u32) -> Result<(), EngineError> {
        *counter += 1;
        if *counter > self.ceiling {
            return Err(EngineError::RetryCeilingExceeded {
                stage: self.stage,
                attempts: *counter,
                exit_code: self.exit_code,
            });
        }
        Ok(())
    }
}
