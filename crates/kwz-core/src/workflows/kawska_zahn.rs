use crate::core::io::cycle_log::CycleLog;
use crate::engine::comm::WorkerGroup;
use crate::engine::config::KwzConfig;
use crate::engine::controller::CycleController;
use crate::engine::coordinator::{Crew, Services};
use crate::engine::error::EngineError;
use crate::engine::executor::SimulationExecutor;
use crate::engine::inspect::AggregateInspector;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::quarantine::FailureQuarantine;
use crate::engine::sequencer::CycleSequencer;
use std::ops::Range;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KwzSummary {
    /// Cycles this invocation was responsible for.
    pub cycles: Range<usize>,
    /// Full-cycle resets across all of them.
    pub resets: u32,
}

/// Runs the aggregation protocol from wherever the working tree left off up
/// to `config.cycles`.
///
/// Must be called by every worker of `group`. Only the coordinator touches
/// the filesystem or launches the engine; the others follow its verdicts.
#[instrument(skip_all, name = "kawska_zahn_workflow", fields(rank = group.rank()))]
pub fn run(
    config: &KwzConfig,
    group: &WorkerGroup,
    executor: &dyn SimulationExecutor,
    inspector: &dyn AggregateInspector,
    reporter: &ProgressReporter,
) -> Result<KwzSummary, EngineError> {
    run_with_quarantine(config, group, executor, inspector, &FailureQuarantine::new(), reporter)
}

pub fn run_with_quarantine(
    config: &KwzConfig,
    group: &WorkerGroup,
    executor: &dyn SimulationExecutor,
    inspector: &dyn AggregateInspector,
    quarantine: &FailureQuarantine,
    reporter: &ProgressReporter,
) -> Result<KwzSummary, EngineError> {
    let cycle_log = CycleLog::in_root(&config.root);
    let crew = Crew::assign(
        group,
        Services {
            executor,
            inspector,
            quarantine,
            cycle_log: &cycle_log,
        },
    );

    let cycles = crew.decide(|c| {
        c.prepare(&config.root)?;
        CycleSequencer::new(&config.root).remaining_cycles(config.cycles)
    })?;
    info!(
        first = cycles.start,
        end = cycles.end,
        workers = group.size(),
        "Resolved cycles to run"
    );
    reporter.report(Progress::RunStart {
        first: cycles.start,
        end: cycles.end,
    });

    let controller = CycleController::new(config, &crew, reporter);
    let mut resets = 0;
    for cycle in cycles.clone() {
        let state = controller.run_cycle(cycle)?;
        resets += state.resets;
    }

    info!(resets, "Aggregation protocol complete");
    Ok(KwzSummary { cycles, resets })
}
