use super::config::{InvalidationScope, KwzConfig};
use super::coordinator::{Coordinator, Crew, StageRun};
use super::error::EngineError;
use super::frames::{BestFrame, is_equilibrated, select_anneal_frame};
use super::gate::StageGate;
use super::plan::StagePlanner;
use super::progress::{Progress, ProgressReporter, StageOutcome};
use super::sequencer::CycleSequencer;
use super::state::{CycleStage, CycleState, RetryPolicy};
use crate::core::io::lmplog::read_series;
use crate::core::models::layout::CycleLayout;
use crate::core::models::stage::{StageDescriptor, StageKind};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum SegmentVerdict {
    Finished,
    Extend,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum VoidOutcome {
    Clear,
    Failed,
}

/// Drives one aggregation cycle through sysprep, quench, anneal and requench.
///
/// Every worker runs the same state machine; each transition is decided by
/// the coordinator and broadcast before anyone moves on, so all workers
/// observe identical state sequences.
pub struct CycleController<'a> {
    config: &'a KwzConfig,
    crew: &'a Crew<'a>,
    reporter: &'a ProgressReporter<'a>,
}

impl<'a> CycleController<'a> {
    pub fn new(config: &'a KwzConfig, crew: &'a Crew<'a>, reporter: &'a ProgressReporter<'a>) -> Self {
        Self {
            config,
            crew,
            reporter,
        }
    }

    pub fn run_cycle(&self, cycle: usize) -> Result<CycleState, EngineError> {
        let planner = StagePlanner::new(self.config, cycle);
        let mut state = CycleState::new(cycle);

        self.crew.barrier()?;
        let resume = self.crew.decide(|c| {
            c.record_cycle_start(cycle)?;
            Ok(CycleSequencer::resume_stage(planner.layout()))
        })?;
        state.advance(resume);
        self.reporter.report(Progress::CycleStart { cycle });
        info!(cycle, stage = ?resume, "Starting cycle");

        let sysprep_policy = RetryPolicy::sysprep(&self.config.retry);
        let quench_policy = RetryPolicy::quench(&self.config.retry);

        while !state.is_done() {
            match state.stage {
                CycleStage::Sysprep => self.sysprep(&planner, &mut state, &sysprep_policy)?,
                CycleStage::Quench => self.quench(&planner, &mut state, &quench_policy)?,
                CycleStage::Anneal => self.anneal(&planner, &mut state)?,
                CycleStage::Requench => self.requench(&planner, &mut state)?,
                CycleStage::Done => {}
            }
        }

        self.reporter.report(Progress::CycleFinish { cycle });
        info!(cycle, resets = state.resets, "Cycle finished");
        Ok(state)
    }

    /// Runs `stage` on the coordinator, reporting its outcome.
    fn launch(&self, c: &Coordinator<'_>, stage: &StageDescriptor) -> Result<bool, EngineError> {
        self.reporter.report(Progress::StageStart {
            name: stage.name.clone(),
        });
        let run = c.run_stage(stage)?;
        let outcome = match run {
            StageRun::Reused => StageOutcome::Reused,
            StageRun::Completed => StageOutcome::Completed,
            StageRun::Failed => StageOutcome::Failed,
        };
        self.reporter.report(Progress::StageFinish {
            name: stage.name.clone(),
            outcome,
        });
        Ok(run.succeeded())
    }

    fn sysprep(
        &self,
        planner: &StagePlanner<'_>,
        state: &mut CycleState,
        policy: &RetryPolicy,
    ) -> Result<(), EngineError> {
        let layout = planner.layout();
        let attempt = state.attempts.sysprep;
        let ok = self.crew.decide(|c| {
            let ok = self.launch(c, &planner.sysprep(attempt))?;
            if !ok {
                c.quarantine(&layout.stage_dirs(&[StageKind::Sysprep]))?;
            }
            Ok(ok)
        })?;

        if ok {
            state.advance(CycleStage::Quench);
        } else {
            warn!(cycle = state.cycle, attempt, "Docking failed");
            policy.register_failure(&mut state.attempts.sysprep)?;
        }
        Ok(())
    }

    fn quench(
        &self,
        planner: &StagePlanner<'_>,
        state: &mut CycleState,
        policy: &RetryPolicy,
    ) -> Result<(), EngineError> {
        let layout = planner.layout();
        let attempt = state.attempts.quench;
        let scope = self.config.retry.quench_scope;
        let ok = self.crew.decide(|c| {
            let ok = self.launch(c, &planner.quench(attempt))?;
            if !ok {
                let kinds: &[StageKind] = match scope {
                    InvalidationScope::Stage => &[StageKind::Quench],
                    InvalidationScope::Cycle => &[StageKind::Sysprep, StageKind::Quench],
                };
                c.quarantine(&layout.stage_dirs(kinds))?;
            }
            Ok(ok)
        })?;

        if ok {
            state.advance(CycleStage::Anneal);
            return Ok(());
        }
        warn!(cycle = state.cycle, attempt, "Quench failed");
        policy.register_failure(&mut state.attempts.quench)?;
        if scope == InvalidationScope::Cycle {
            state.attempts.sysprep = 0;
            state.advance(CycleStage::Sysprep);
        }
        Ok(())
    }

    fn anneal(&self, planner: &StagePlanner<'_>, state: &mut CycleState) -> Result<(), EngineError> {
        let layout = planner.layout();
        let natoms = self.crew.decide(|c| {
            c.prepare(&layout.stage_dir(StageKind::Anneal))?;
            Ok(c.data_header(&layout.sysprep_out())?.atoms)
        })?;

        if self.config.has_solvent() && !self.solvate(planner, natoms)? {
            return self.reset(layout, state, &StageKind::ALL[..3]);
        }

        let heated = self.crew.decide(|c| {
            let heat = planner.heat(natoms);
            Ok(self.launch(c, &heat)? && c.aggregate_intact(&heat.outputs.log)?)
        })?;
        if !heated {
            warn!(cycle = state.cycle, "Aggregate did not survive heating");
            return self.reset(layout, state, &StageKind::ALL[..3]);
        }

        if !self.productive(planner, natoms)? {
            return self.reset(layout, state, &StageKind::ALL[..3]);
        }
        state.advance(CycleStage::Requench);
        Ok(())
    }

    /// Cuts and relaxes a solvent box, embeds the aggregate with clear voids
    /// and relaxes the solution. `false` when any engine run failed.
    fn solvate(&self, planner: &StagePlanner<'_>, natoms: usize) -> Result<bool, EngineError> {
        let layout = planner.layout();
        let cut = self.crew.decide(|c| {
            let bounds = c
                .data_header(&layout.sysprep_out())?
                .bounds
                .ok_or_else(|| EngineError::Internal("docked system has no box bounds".to_string()))?;
            match planner.relax_cut(bounds) {
                Some(stage) => self.launch(c, &stage),
                None => Ok(true),
            }
        })?;
        if !cut {
            return Ok(false);
        }

        let attempts = self.config.retry.void_attempts;
        let voids = self.crew.decide(|c| {
            let solvent_box = c
                .data_header(&layout.cut_solvent_data())?
                .bounds
                .ok_or_else(|| EngineError::Internal("cut solvent has no box bounds".to_string()))?;
            for attempt in 0..attempts {
                let Some(stage) = planner.void(attempt, natoms, solvent_box) else {
                    return Ok(VoidOutcome::Clear);
                };
                // Reused outputs go through the clash check as well.
                if !self.launch(c, &stage)? {
                    return Ok(VoidOutcome::Failed);
                }
                if c.voids_clear(&stage.outputs.log)? {
                    return Ok(VoidOutcome::Clear);
                }
                warn!(attempt, "Solvent left inside the aggregate");
                c.set_aside(&stage, &format!("clash_{attempt}"))?;
            }
            Err(EngineError::VoidSpaceExhausted { attempts })
        })?;
        if voids == VoidOutcome::Failed {
            return Ok(false);
        }

        self.crew.decide(|c| match planner.relax_solvent(natoms) {
            Some(stage) => self.launch(c, &stage),
            None => Ok(true),
        })
    }

    /// Extends productive annealing until the tracked energy has settled or
    /// the extension budget is spent, then promotes the last segment.
    fn productive(&self, planner: &StagePlanner<'_>, natoms: usize) -> Result<bool, EngineError> {
        let layout = planner.layout();
        let analysis = &self.config.analysis;
        let max_extensions = self.config.protocol.anneal_max_extensions;

        for segment in 0..=max_extensions {
            let verdict = self.crew.decide(|c| {
                if StageGate::stage_complete(layout, StageKind::Anneal) {
                    return Ok(SegmentVerdict::Finished);
                }
                let stage = planner.anneal_segment(segment, natoms);
                if !self.launch(c, &stage)? || !c.aggregate_intact(&stage.outputs.log)? {
                    return Ok(SegmentVerdict::Failed);
                }
                let series = read_series(&stage.outputs.log, &analysis.energy_column)?;
                if segment < max_extensions && !is_equilibrated(&series, analysis.window_percent) {
                    return Ok(SegmentVerdict::Extend);
                }
                c.promote(stage.canonical_output(), &layout.anneal_out())?;
                Ok(SegmentVerdict::Finished)
            })?;

            match verdict {
                SegmentVerdict::Finished => return Ok(true),
                SegmentVerdict::Failed => return Ok(false),
                SegmentVerdict::Extend => info!(segment, "Energy still drifting, extending anneal"),
            }
        }
        Err(EngineError::Internal("annealing ended without a verdict".to_string()))
    }

    fn requench(&self, planner: &StagePlanner<'_>, state: &mut CycleState) -> Result<(), EngineError> {
        let layout = planner.layout();
        let analysis = &self.config.analysis;
        let ok = self.crew.decide(|c| {
            c.prepare(&layout.stage_dir(StageKind::Requench))?;
            let record = layout.frame_record();
            let frame = match BestFrame::load(&record)? {
                Some(frame) => frame,
                None => {
                    let frame = select_anneal_frame(layout, &analysis.energy_column, analysis.window_percent)?;
                    frame.save(&record)?;
                    c.record(&frame.log_line())?;
                    frame
                }
            };
            let natoms = c.data_header(&layout.sysprep_out())?.atoms;
            self.launch(c, &planner.requench(frame.frame_ref(), natoms))
        })?;

        if ok {
            state.advance(CycleStage::Done);
            Ok(())
        } else {
            warn!(cycle = state.cycle, "Requench failed");
            self.reset(layout, state, &StageKind::ALL)
        }
    }

    /// Quarantines `kinds` and restarts the cycle from sysprep.
    fn reset(&self, layout: &CycleLayout, state: &mut CycleState, kinds: &[StageKind]) -> Result<(), EngineError> {
        let stamp = self.crew.decide(|c| c.quarantine(&layout.stage_dirs(kinds)))?;
        info!(cycle = state.cycle, stamp = %stamp, "Restarting cycle from docking");
        self.reporter
            .message(format!("Cycle {} restarted from docking", state.cycle));
        state.reset_cycle(self.config.retry.cycle_reset_ceiling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::cycle_log::CycleLog;
    use crate::engine::comm::WorkerGroup;
    use crate::engine::comm::local::LocalGroup;
    use crate::core::io::lmpdat::DataHeader;
    use crate::core::models::layout::AnnealStep;
    use crate::engine::config::{SolventConfig, test_config};
    use crate::engine::coordinator::Services;
    use crate::engine::error::{
        EXIT_QUENCH_CEILING, EXIT_RESET_CEILING, EXIT_SYSPREP_CEILING, EXIT_VOID_EXHAUSTED,
    };
    use crate::engine::executor::SimulationExecutor;
    use crate::engine::quarantine::target_for;
    use crate::engine::testing::{STAMP, StubExecutor, StubInspector, data_file, fixed_quarantine};
    use std::fs;
    use std::sync::atomic::Ordering;

    fn run_solo(
        config: &KwzConfig,
        executor: &StubExecutor,
        inspector: &StubInspector,
    ) -> Result<CycleState, EngineError> {
        let group = WorkerGroup::solo();
        let quarantine = fixed_quarantine();
        let log = CycleLog::in_root(&config.root);
        let crew = Crew::assign(
            &group,
            Services {
                executor,
                inspector,
                quarantine: &quarantine,
                cycle_log: &log,
            },
        );
        let reporter = ProgressReporter::new();
        CycleController::new(config, &crew, &reporter).run_cycle(0)
    }

    fn solvated_config(root: &std::path::Path) -> KwzConfig {
        let mut config = test_config(root);
        config.solvent = Some(SolventConfig {
            data: root.join("water.lmpdat"),
            settings: root.join("settings.lmpcfg"),
            pair_coeffs: root.join("pair.lmpcfg"),
            solution_pair_coeffs: root.join("solution_pair.lmpcfg"),
            gpu: false,
            overlap: 2.0,
            padding: 10.0,
        });
        config
    }

    fn aside(path: &std::path::Path, tag: &str) -> std::path::PathBuf {
        let mut aside = path.to_path_buf().into_os_string();
        aside.push(format!(".{tag}"));
        aside.into()
    }

    #[test]
    fn clean_cycle_runs_each_stage_once() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let executor = StubExecutor::succeeding();
        let inspector = StubInspector::default();

        let state = run_solo(&config, &executor, &inspector).unwrap();
        assert!(state.is_done());
        assert_eq!(
            executor.calls(),
            ["sysprep_0", "quench_0", "equil_anneal_0", "0_anneal_0", "requench_0"]
        );

        let layout = CycleLayout::new(root.path(), 0);
        assert!(layout.anneal_out().is_file());
        assert!(layout.frame_record().is_file());
        let log = fs::read_to_string(root.path().join("kwz.log")).unwrap();
        assert!(log.starts_with("Cycle: 0\n"));
        assert!(log.contains("0_anneal_0.dcd, "));
    }

    #[test]
    fn sysprep_gives_up_after_ceiling() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let executor = StubExecutor::failing_when(|name, _| name.starts_with("sysprep"));
        let inspector = StubInspector::default();

        let err = run_solo(&config, &executor, &inspector).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_SYSPREP_CEILING);
        assert_eq!(executor.count("sysprep_0"), 21);
    }

    #[test]
    fn resumed_cycle_reuses_docked_system() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let layout = CycleLayout::new(root.path(), 0);
        fs::create_dir_all(layout.stage_dir(StageKind::Sysprep)).unwrap();
        fs::write(layout.sysprep_out(), data_file(12)).unwrap();

        let executor = StubExecutor::succeeding();
        run_solo(&config, &executor, &StubInspector::default()).unwrap();
        assert_eq!(executor.count("sysprep_0"), 0);
        assert_eq!(executor.count("quench_0"), 1);
    }

    #[test]
    fn quench_failure_redocks_with_cycle_scope() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let executor = StubExecutor::failing_when(|name, previous| name == "quench_0" && previous == 0);

        run_solo(&config, &executor, &StubInspector::default()).unwrap();
        assert_eq!(executor.count("sysprep_0"), 2);
        let layout = CycleLayout::new(root.path(), 0);
        assert!(target_for(&layout.stage_dir(StageKind::Sysprep), STAMP).is_dir());
        assert!(target_for(&layout.stage_dir(StageKind::Quench), STAMP).is_dir());
    }

    #[test]
    fn quench_failure_with_stage_scope_keeps_docking() {
        let root = tempfile::tempdir().unwrap();
        let mut config = test_config(root.path());
        config.retry.quench_scope = InvalidationScope::Stage;
        let executor = StubExecutor::failing_when(|name, previous| name == "quench_0" && previous == 0);

        run_solo(&config, &executor, &StubInspector::default()).unwrap();
        assert_eq!(executor.count("sysprep_0"), 1);
        assert_eq!(executor.count("quench_0"), 2);
    }

    #[test]
    fn broken_aggregate_quarantines_three_stages_and_restarts() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let executor = StubExecutor::succeeding();
        let inspector = StubInspector::with_aggregate(vec![false]);

        let state = run_solo(&config, &executor, &inspector).unwrap();
        assert_eq!(state.resets, 1);
        let layout = CycleLayout::new(root.path(), 0);
        for kind in &StageKind::ALL[..3] {
            assert!(target_for(&layout.stage_dir(*kind), STAMP).is_dir(), "{kind} not quarantined");
        }
        assert!(!target_for(&layout.stage_dir(StageKind::Requench), STAMP).exists());
        assert_eq!(executor.count("sysprep_0"), 2);
    }

    #[test]
    fn anneal_is_extended_until_equilibrated() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let executor = StubExecutor::succeeding().drifting(&["0_anneal_0"]);

        let state = run_solo(&config, &executor, &StubInspector::default()).unwrap();
        assert!(state.is_done());
        assert_eq!(executor.count("0_anneal_0"), 1);
        assert_eq!(executor.count("1_anneal_0"), 1);
        assert_eq!(executor.count("2_anneal_0"), 0);

        let layout = CycleLayout::new(root.path(), 0);
        assert_eq!(
            fs::read(layout.anneal_out()).unwrap(),
            fs::read(layout.anneal_segment_files(1).restart).unwrap()
        );
    }

    #[test]
    fn extension_budget_caps_annealing() {
        let root = tempfile::tempdir().unwrap();
        let mut config = test_config(root.path());
        config.protocol.anneal_max_extensions = 1;
        let executor = StubExecutor::succeeding().drifting(&["0_anneal_0", "1_anneal_0"]);

        let state = run_solo(&config, &executor, &StubInspector::default()).unwrap();
        assert!(state.is_done());
        assert_eq!(executor.count("1_anneal_0"), 1);
        assert_eq!(executor.count("2_anneal_0"), 0);
    }

    #[test]
    fn every_worker_sees_the_same_reset() {
        let root = tempfile::tempdir().unwrap();
        let mut config = test_config(root.path());
        config.retry.cycle_reset_ceiling = Some(0);
        let log = CycleLog::in_root(root.path());

        let results = LocalGroup::run(3, |group| {
            let executor = StubExecutor::succeeding();
            // Non-coordinators would see an intact aggregate if they looked.
            let inspector = StubInspector::with_aggregate(vec![!group.is_coordinator()]);
            let quarantine = fixed_quarantine();
            let crew = Crew::assign(
                &group,
                Services {
                    executor: &executor,
                    inspector: &inspector,
                    quarantine: &quarantine,
                    cycle_log: &log,
                },
            );
            let reporter = ProgressReporter::new();
            let result = CycleController::new(&config, &crew, &reporter).run_cycle(0);
            (
                result.unwrap_err().exit_code(),
                executor.calls().len(),
                inspector.aggregate_calls.load(Ordering::SeqCst),
            )
        });

        let results: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
        assert!(results.iter().all(|(code, _, _)| *code == EXIT_RESET_CEILING));
        assert_eq!(results[0].1, 3);
        assert_eq!(results[0].2, 1);
        assert!(results[1..].iter().all(|(_, calls, checks)| *calls == 0 && *checks == 0));
        let anneal = CycleLayout::new(root.path(), 0).stage_dir(StageKind::Anneal);
        assert!(target_for(&anneal, STAMP).is_dir());
    }

    #[test]
    fn solvated_cycle_embeds_and_relaxes_the_solution() {
        let root = tempfile::tempdir().unwrap();
        let config = solvated_config(root.path());
        let executor = StubExecutor::succeeding();

        let state = run_solo(&config, &executor, &StubInspector::default()).unwrap();
        assert!(state.is_done());
        assert_eq!(
            executor.calls(),
            [
                "sysprep_0",
                "quench_0",
                "cut_solv_0",
                "void_solv_0",
                "relax_solv_0",
                "equil_anneal_0",
                "0_anneal_0",
                "requench_0"
            ]
        );
    }

    #[test]
    fn clashing_void_is_set_aside_and_retried() {
        let root = tempfile::tempdir().unwrap();
        let config = solvated_config(root.path());
        let executor = StubExecutor::succeeding();
        let inspector = StubInspector::with_voids(vec![false]);

        let state = run_solo(&config, &executor, &inspector).unwrap();
        assert!(state.is_done());
        assert_eq!(state.resets, 0);
        assert_eq!(executor.count("void_solv_0"), 2);
        assert_eq!(executor.count("relax_solv_0"), 1);

        let layout = CycleLayout::new(root.path(), 0);
        let void = layout.anneal_files(AnnealStep::Void).restart;
        assert!(void.is_file());
        assert!(aside(&void, "clash_0").is_file());
        assert!(aside(&layout.solution_data(), "clash_0").is_file());
    }

    #[test]
    fn void_attempts_exhausted_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let config = solvated_config(root.path());
        let executor = StubExecutor::succeeding();
        let inspector = StubInspector::with_voids(vec![false; 10]);

        let err = run_solo(&config, &executor, &inspector).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_VOID_EXHAUSTED);
        assert_eq!(executor.count("void_solv_0"), 5);
        assert_eq!(executor.count("sysprep_0"), 1);
        assert_eq!(executor.count("relax_solv_0"), 0);

        let layout = CycleLayout::new(root.path(), 0);
        let void = layout.anneal_files(AnnealStep::Void).restart;
        assert!(!void.exists());
        for attempt in 0..5 {
            assert!(aside(&void, &format!("clash_{attempt}")).is_file());
        }
        assert!(!target_for(&layout.stage_dir(StageKind::Anneal), STAMP).exists());
    }

    #[test]
    fn reused_void_output_is_still_checked_for_clashes() {
        let root = tempfile::tempdir().unwrap();
        let config = solvated_config(root.path());
        let planner = StagePlanner::new(&config, 0);
        let layout = planner.layout();

        // Outputs left behind by a run stopped right after the void engine exited.
        let earlier = StubExecutor::succeeding();
        earlier.run(&planner.sysprep(0)).unwrap();
        earlier.run(&planner.quench(0)).unwrap();
        let docked = DataHeader::read_from_path(&layout.sysprep_out()).unwrap();
        earlier.run(&planner.relax_cut(docked.bounds.unwrap()).unwrap()).unwrap();
        let solvent = DataHeader::read_from_path(&layout.cut_solvent_data()).unwrap();
        earlier
            .run(&planner.void(0, docked.atoms, solvent.bounds.unwrap()).unwrap())
            .unwrap();

        let executor = StubExecutor::succeeding();
        let inspector = StubInspector::with_voids(vec![false]);
        let state = run_solo(&config, &executor, &inspector).unwrap();
        assert!(state.is_done());
        assert_eq!(
            executor.calls(),
            ["void_solv_0", "relax_solv_0", "equil_anneal_0", "0_anneal_0", "requench_0"]
        );
        let void = layout.anneal_files(AnnealStep::Void).restart;
        assert!(aside(&void, "clash_0").is_file());
    }

    #[test]
    fn requench_failure_quarantines_all_four_stages() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let executor = StubExecutor::failing_when(|name, previous| name == "requench_0" && previous == 0);

        let state = run_solo(&config, &executor, &StubInspector::default()).unwrap();
        assert!(state.is_done());
        assert_eq!(state.resets, 1);

        let layout = CycleLayout::new(root.path(), 0);
        for kind in StageKind::ALL {
            assert!(target_for(&layout.stage_dir(kind), STAMP).is_dir(), "{kind} not quarantined");
        }
        assert_eq!(executor.count("sysprep_0"), 2);
        assert_eq!(executor.count("quench_0"), 2);
        assert_eq!(executor.count("requench_0"), 2);
        assert!(layout.requench_files().restart.is_file());
    }

    #[test]
    fn quench_gives_up_after_ceiling() {
        let root = tempfile::tempdir().unwrap();
        let mut config = test_config(root.path());
        config.retry.quench_ceiling = 2;
        // One docking failure per round: only survivable if each quench
        // failure gives sysprep a fresh counter.
        config.retry.sysprep_ceiling = 1;
        let executor = StubExecutor::failing_when(|name, previous| {
            name == "quench_0" || (name == "sysprep_0" && previous % 2 == 0)
        });

        let err = run_solo(&config, &executor, &StubInspector::default()).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_QUENCH_CEILING);
        assert_eq!(executor.count("quench_0"), 3);
        assert_eq!(executor.count("sysprep_0"), 6);
    }
}
