use super::error::EngineError;
use super::gate::StageGate;
use super::state::CycleStage;
use crate::core::models::layout::{CycleLayout, parse_stage_dir};
use crate::core::models::stage::StageKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;

/// On-disk progress of one cycle, as reported by `kwz status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStatus {
    pub cycle: usize,
    /// Stages whose canonical output exists.
    pub completed: Vec<StageKind>,
    /// Quarantined directories belonging to this cycle.
    pub quarantined: usize,
}

impl CycleStatus {
    pub fn is_complete(&self) -> bool {
        self.completed.contains(&StageKind::Requench)
    }
}

/// Derives the cycle to resume from the stage directories under the root.
pub struct CycleSequencer {
    root: PathBuf,
}

impl CycleSequencer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entries(&self) -> Result<Vec<String>, EngineError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::io(&self.root, e)),
        };
        Ok(entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect())
    }

    /// Highest cycle index among active stage directories, if any.
    pub fn current_cycle(&self) -> Result<Option<usize>, EngineError> {
        Ok(self
            .entries()?
            .iter()
            .filter_map(|name| parse_stage_dir(name))
            .map(|(_, cycle)| cycle)
            .max())
    }

    /// The cycle to work on next: the current one, or its successor once its
    /// requench output exists.
    pub fn resume_cycle(&self) -> Result<usize, EngineError> {
        let resume = match self.current_cycle()? {
            None => 0,
            Some(cycle) => {
                let layout = CycleLayout::new(&self.root, cycle);
                if StageGate::stage_complete(&layout, StageKind::Requench) {
                    cycle + 1
                } else {
                    cycle
                }
            }
        };
        debug!(root = %self.root.display(), resume, "Resolved resume cycle");
        Ok(resume)
    }

    pub fn remaining_cycles(&self, total: usize) -> Result<Range<usize>, EngineError> {
        let start = self.resume_cycle()?;
        Ok(start.min(total)..total)
    }

    /// Furthest stage that still has to run, judged by the latest canonical
    /// output present. Earlier stages are not re-checked once a later one is done.
    pub fn resume_stage(layout: &CycleLayout) -> CycleStage {
        let done = |kind| StageGate::stage_complete(layout, kind);
        if done(StageKind::Requench) {
            CycleStage::Done
        } else if done(StageKind::Anneal) {
            CycleStage::Requench
        } else if done(StageKind::Quench) {
            CycleStage::Anneal
        } else if done(StageKind::Sysprep) {
            CycleStage::Quench
        } else {
            CycleStage::Sysprep
        }
    }

    /// Status of every cycle with an active or quarantined directory.
    pub fn survey(&self) -> Result<Vec<CycleStatus>, EngineError> {
        let mut quarantined: BTreeMap<usize, usize> = BTreeMap::new();
        let mut cycles = BTreeSet::new();
        for name in self.entries()? {
            if let Some((_, cycle)) = parse_stage_dir(&name) {
                cycles.insert(cycle);
            } else if let Some((active, _)) = name.split_once("_failed_") {
                if let Some((_, cycle)) = parse_stage_dir(active) {
                    *quarantined.entry(cycle).or_default() += 1;
                    cycles.insert(cycle);
                }
            }
        }

        Ok(cycles
            .into_iter()
            .map(|cycle| {
                let layout = CycleLayout::new(&self.root, cycle);
                CycleStatus {
                    cycle,
                    completed: StageKind::ALL
                        .into_iter()
                        .filter(|&kind| StageGate::stage_complete(&layout, kind))
                        .collect(),
                    quarantined: quarantined.get(&cycle).copied().unwrap_or(0),
                }
            })
            .collect())
    }
}
