use super::comm::WorkerGroup;
use super::error::EngineError;
use super::executor::{SimulationExecutor, StageStatus};
use super::gate::StageGate;
use super::inspect::AggregateInspector;
use super::quarantine::FailureQuarantine;
use crate::core::io::cycle_log::CycleLog;
use crate::core::io::lmpdat::DataHeader;
use crate::core::models::stage::StageDescriptor;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Collaborators that touch the shared working tree.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub executor: &'a dyn SimulationExecutor,
    pub inspector: &'a dyn AggregateInspector,
    pub quarantine: &'a FailureQuarantine,
    pub cycle_log: &'a CycleLog,
}

/// Outcome of [`Coordinator::run_stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageRun {
    /// The canonical output already existed; nothing was launched.
    Reused,
    Completed,
    Failed,
}

impl StageRun {
    pub fn succeeded(self) -> bool {
        self != StageRun::Failed
    }
}

/// The capability held by exactly one worker: every filesystem side effect
/// and every verdict that needs to look at the working tree goes through it.
pub struct Coordinator<'a> {
    services: Services<'a>,
}

impl<'a> Coordinator<'a> {
    pub fn prepare(&self, dir: &Path) -> Result<(), EngineError> {
        fs::create_dir_all(dir).map_err(|e| EngineError::io(dir, e))
    }

    /// Runs `stage` unless its gate already holds. An engine that stops on
    /// its wall-time budget ends the whole run so it can be resubmitted.
    pub fn run_stage(&self, stage: &StageDescriptor) -> Result<StageRun, EngineError> {
        if StageGate::is_complete(stage) {
            debug!(stage = %stage.name, "Output present, reusing");
            return Ok(StageRun::Reused);
        }
        self.prepare(&stage.directory)?;
        let status = self.services.executor.run(stage)?;
        if status == StageStatus::Interrupted {
            return Err(EngineError::WallTimeReached {
                stage: stage.name.clone(),
            });
        }
        Ok(if status.is_success() {
            StageRun::Completed
        } else {
            StageRun::Failed
        })
    }

    pub fn quarantine(&self, dirs: &[PathBuf]) -> Result<String, EngineError> {
        self.services.quarantine.quarantine(dirs)
    }

    pub fn aggregate_intact(&self, log: &Path) -> Result<bool, EngineError> {
        self.services.inspector.aggregate_intact(log)
    }

    pub fn voids_clear(&self, log: &Path) -> Result<bool, EngineError> {
        self.services.inspector.voids_clear(log)
    }

    pub fn record(&self, line: &str) -> Result<(), EngineError> {
        self.services
            .cycle_log
            .append(line)
            .map_err(|e| EngineError::io(self.services.cycle_log.path(), e))
    }

    pub fn record_cycle_start(&self, cycle: usize) -> Result<(), EngineError> {
        self.services
            .cycle_log
            .cycle_started(cycle)
            .map_err(|e| EngineError::io(self.services.cycle_log.path(), e))
    }

    pub fn data_header(&self, path: &Path) -> Result<DataHeader, EngineError> {
        if !path.is_file() {
            return Err(EngineError::MissingInput(path.to_path_buf()));
        }
        Ok(DataHeader::read_from_path(path)?)
    }

    /// Copies a finished intermediate result to its canonical location.
    pub fn promote(&self, from: &Path, to: &Path) -> Result<(), EngineError> {
        fs::copy(from, to).map_err(|e| EngineError::io(from, e))?;
        info!(from = %from.display(), to = %to.display(), "Promoted output");
        Ok(())
    }

    /// Moves the outputs of a rejected attempt out of the way so the next
    /// attempt starts from scratch.
    pub fn set_aside(&self, stage: &StageDescriptor, tag: &str) -> Result<(), EngineError> {
        let outputs = [
            Some(&stage.outputs.primary),
            stage.outputs.data.as_ref(),
            stage.outputs.intermediate.as_ref(),
        ];
        for path in outputs.into_iter().flatten().filter(|p| p.exists()) {
            let mut aside = path.clone().into_os_string();
            aside.push(format!(".{tag}"));
            fs::rename(path, &aside).map_err(|e| EngineError::io(path, e))?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
enum Verdict<T> {
    Agreed(T),
    Abort { code: i32, message: String },
}

pub enum Role<'a> {
    Coordinator(Coordinator<'a>),
    Worker,
}

/// A worker's view of the group: its communicator plus its role.
pub struct Crew<'a> {
    group: &'a WorkerGroup,
    role: Role<'a>,
}

impl<'a> Crew<'a> {
    /// Rank 0 receives the coordinator capability; everyone else is a plain
    /// worker and never sees `services`.
    pub fn assign(group: &'a WorkerGroup, services: Services<'a>) -> Self {
        let role = if group.is_coordinator() {
            Role::Coordinator(Coordinator { services })
        } else {
            Role::Worker
        };
        Self { group, role }
    }

    pub fn group(&self) -> &WorkerGroup {
        self.group
    }

    pub fn is_coordinator(&self) -> bool {
        matches!(self.role, Role::Coordinator(_))
    }

    pub fn barrier(&self) -> Result<(), EngineError> {
        Ok(self.group.barrier()?)
    }

    /// Evaluates `decision` on the coordinator and hands its result to every
    /// worker, followed by a barrier. A coordinator error is broadcast as an
    /// abort so that all workers fail with the same exit code.
    pub fn decide<T, F>(&self, decision: F) -> Result<T, EngineError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&Coordinator<'a>) -> Result<T, EngineError>,
    {
        let mut local_error = None;
        let verdict = match &self.role {
            Role::Coordinator(coordinator) => Some(match decision(coordinator) {
                Ok(value) => Verdict::Agreed(value),
                Err(error) => {
                    let verdict = Verdict::Abort {
                        code: error.exit_code(),
                        message: error.to_string(),
                    };
                    local_error = Some(error);
                    verdict
                }
            }),
            Role::Worker => None,
        };

        let shared: Verdict<T> = self.group.broadcast(verdict.as_ref())?;
        self.group.barrier()?;

        match shared {
            Verdict::Agreed(value) => Ok(value),
            Verdict::Abort { code, message } => {
                Err(local_error.unwrap_or(EngineError::Aborted { code, message }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::comm::local::LocalGroup;
    use crate::engine::error::EXIT_VOID_EXHAUSTED;
    use crate::engine::testing::{StubExecutor, StubInspector, fixed_quarantine};
    use std::sync::atomic::Ordering;

    #[test]
    fn workers_adopt_the_coordinator_verdict() {
        let root = tempfile::tempdir().unwrap();
        let log = CycleLog::in_root(root.path());
        let results = LocalGroup::run(3, |group| {
            let executor = StubExecutor::succeeding();
            // Would report an intact aggregate if any worker asked it.
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
            let aggregate_ok = crew
                .decide(|c| c.aggregate_intact(Path::new("heat.lmplog")))
                .unwrap();
            (aggregate_ok, inspector.aggregate_calls.load(Ordering::SeqCst))
        });

        let results: Vec<(bool, usize)> = results.into_iter().map(|r| r.unwrap()).collect();
        assert!(results.iter().all(|(ok, _)| !ok));
        assert_eq!(results[0].1, 1);
        assert!(results[1..].iter().all(|(_, calls)| *calls == 0));
    }

    #[test]
    fn coordinator_errors_abort_every_worker_with_same_code() {
        let root = tempfile::tempdir().unwrap();
        let log = CycleLog::in_root(root.path());
        let results = LocalGroup::run(3, |group| {
            let executor = StubExecutor::succeeding();
            let inspector = StubInspector::default();
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
            crew.decide::<bool, _>(|_| Err(EngineError::VoidSpaceExhausted { attempts: 5 }))
                .unwrap_err()
                .exit_code()
        });
        assert!(results.into_iter().all(|code| code.unwrap() == EXIT_VOID_EXHAUSTED));
    }

    struct FixedStatus(StageStatus);

    impl SimulationExecutor for FixedStatus {
        fn run(&self, _stage: &StageDescriptor) -> Result<StageStatus, EngineError> {
            Ok(self.0)
        }
    }

    #[test]
    fn engine_status_maps_to_stage_run() {
        let root = tempfile::tempdir().unwrap();
        let log = CycleLog::in_root(root.path());
        let group = WorkerGroup::solo();
        let inspector = StubInspector::default();
        let quarantine = fixed_quarantine();
        let stage = crate::engine::testing::descriptor(root.path(), "heat_0");

        let run_with = |status| {
            let executor = FixedStatus(status);
            let crew = Crew::assign(
                &group,
                Services {
                    executor: &executor,
                    inspector: &inspector,
                    quarantine: &quarantine,
                    cycle_log: &log,
                },
            );
            crew.decide(|c| c.run_stage(&stage))
        };

        assert_eq!(run_with(StageStatus::Completed).unwrap(), StageRun::Completed);
        assert_eq!(run_with(StageStatus::Failed).unwrap(), StageRun::Failed);
        let err = run_with(StageStatus::Interrupted).unwrap_err();
        assert!(matches!(err, EngineError::WallTimeReached { ref stage } if stage == "heat_0"));
        assert_eq!(err.exit_code(), crate::engine::error::EXIT_WALL_TIME);
    }

    #[test]
    fn set_aside_clears_the_gate() {
        let root = tempfile::tempdir().unwrap();
        let log = CycleLog::in_root(root.path());
        let group = WorkerGroup::solo();
        let executor = StubExecutor::succeeding();
        let inspector = StubInspector::default();
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
        let stage = crate::engine::testing::descriptor(root.path(), "void_solv_0");

        let run = crew.decide(|c| c.run_stage(&stage)).unwrap();
        assert_eq!(run, StageRun::Completed);
        assert_eq!(crew.decide(|c| c.run_stage(&stage)).unwrap(), StageRun::Reused);

        crew.decide(|c| c.set_aside(&stage, "clash_0")).unwrap();
        assert!(!StageGate::is_complete(&stage));
        let mut aside = stage.outputs.primary.clone().into_os_string();
        aside.push(".clash_0");
        assert!(Path::new(&aside).is_file());
    }
}
