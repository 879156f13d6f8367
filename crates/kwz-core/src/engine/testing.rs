//! In-process doubles for the engine and the structural checks.

use super::error::EngineError;
use super::executor::{SimulationExecutor, StageStatus};
use super::inspect::AggregateInspector;
use super::quarantine::FailureQuarantine;
use crate::core::models::stage::{
    Ensemble, Operation, Resources, StageDescriptor, StageInputs, StageOutputs, ThermoRamp,
    Thermostat,
};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const STAMP: &str = "20250101_120000_000000";

pub fn fixed_quarantine() -> FailureQuarantine {
    FailureQuarantine::with_clock(Box::new(|| STAMP.to_string()))
}

type FailurePredicate = Box<dyn Fn(&str, usize) -> bool + Send + Sync>;

/// Writes plausible outputs for every stage it is handed, unless the
/// predicate (stage name, previous launches of that name) says to fail.
pub struct StubExecutor {
    fail: FailurePredicate,
    drifting: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl StubExecutor {
    pub fn succeeding() -> Self {
        Self::failing_when(|_, _| false)
    }

    pub fn failing_when(fail: impl Fn(&str, usize) -> bool + Send + Sync + 'static) -> Self {
        Self {
            fail: Box::new(fail),
            drifting: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Stages whose logs show a steadily falling energy.
    pub fn drifting(mut self, names: &[&str]) -> Self {
        self.drifting = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| *c == name).count()
    }
}

impl SimulationExecutor for StubExecutor {
    fn run(&self, stage: &StageDescriptor) -> Result<StageStatus, EngineError> {
        let previous = {
            let mut calls = self.calls.lock().unwrap();
            let previous = calls.iter().filter(|c| **c == stage.name).count();
            calls.push(stage.name.clone());
            previous
        };
        fs::create_dir_all(&stage.directory).unwrap();
        let slope = if self.drifting.contains(&stage.name) { -1.0 } else { 0.0 };
        fs::write(&stage.outputs.log, thermo_log(10, slope)).unwrap();
        if (self.fail)(&stage.name, previous) {
            return Ok(StageStatus::Failed);
        }
        if let Some(trajectory) = &stage.outputs.trajectory {
            fs::write(trajectory, b"").unwrap();
        }
        for path in [Some(&stage.outputs.primary), stage.outputs.data.as_ref()]
            .into_iter()
            .flatten()
        {
            fs::write(path, data_file(12)).unwrap();
        }
        Ok(StageStatus::Completed)
    }
}

/// Answers aggregate checks from a queue, `true` once it runs dry.
#[derive(Default)]
pub struct StubInspector {
    aggregate: Mutex<VecDeque<bool>>,
    voids: Mutex<VecDeque<bool>>,
    pub aggregate_calls: AtomicUsize,
}

impl StubInspector {
    pub fn with_aggregate(answers: Vec<bool>) -> Self {
        Self {
            aggregate: Mutex::new(answers.into()),
            ..Self::default()
        }
    }

    pub fn with_voids(answers: Vec<bool>) -> Self {
        Self {
            voids: Mutex::new(answers.into()),
            ..Self::default()
        }
    }
}

impl AggregateInspector for StubInspector {
    fn aggregate_intact(&self, _log: &Path) -> Result<bool, EngineError> {
        self.aggregate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.aggregate.lock().unwrap().pop_front().unwrap_or(true))
    }

    fn voids_clear(&self, _log: &Path) -> Result<bool, EngineError> {
        Ok(self.voids.lock().unwrap().pop_front().unwrap_or(true))
    }
}

pub fn thermo_log(rows: usize, slope: f64) -> String {
    let mut log = String::from(
        "Per MPI rank memory allocation (min/avg/max) = 1 | 1 | 1 Mbytes\n   Step c_pe_solvate_complete c_aggregate_clusters c_void_clashes\n",
    );
    for step in 0..rows {
        let energy = -100.0 + slope * step as f64;
        log.push_str(&format!("{} {energy} 1 0\n", step * 100));
    }
    log.push_str("Loop time of 1.0 on 1 procs\n");
    log
}

pub fn data_file(atoms: usize) -> String {
    format!(
        "stub data file\n\n{atoms} atoms\n\n-10.0 10.0 xlo xhi\n-10.0 10.0 ylo yhi\n-10.0 10.0 zlo zhi\n\nAtoms\n"
    )
}

pub fn descriptor(root: &Path, name: &str) -> StageDescriptor {
    let dir = root.join("anneal_0");
    StageDescriptor {
        name: name.to_string(),
        directory: dir.clone(),
        inputs: StageInputs::default(),
        outputs: StageOutputs {
            primary: dir.join(format!("{name}_out.lmprst")),
            intermediate: Some(dir.join(format!("{name}_tmp.lmprst"))),
            trajectory: Some(dir.join(format!("{name}.dcd"))),
            log: dir.join(format!("{name}.lmplog")),
            data: None,
        },
        settings: root.join("settings.lmpcfg"),
        pair_coeffs: root.join("pair.lmpcfg"),
        ramp: ThermoRamp::nvt(300.0, 300.0),
        steps: 100,
        log_every: 10,
        resources: Resources {
            ncores: 1,
            gpu: false,
        },
        dielectric: None,
        solvate_atoms: None,
        group: None,
        seed: 1,
        operation: Operation::Dynamics {
            ensemble: Ensemble::Nvt,
            thermostat: Thermostat::Berendsen,
            minimize: false,
            unwrap: false,
        },
    }
}
