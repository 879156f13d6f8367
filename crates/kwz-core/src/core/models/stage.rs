use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The four stages every aggregation cycle passes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StageKind {
    Sysprep,
    Quench,
    Anneal,
    Requench,
}

impl StageKind {
    pub const ALL: [StageKind; 4] = [
        StageKind::Sysprep,
        StageKind::Quench,
        StageKind::Anneal,
        StageKind::Requench,
    ];

    /// Directory prefix and file stem used for this stage on disk.
    pub fn name(self) -> &'static str {
        match self {
            StageKind::Sysprep => "sysprep",
            StageKind::Quench => "quench",
            StageKind::Anneal => "anneal",
            StageKind::Requench => "requench",
        }
    }

    pub fn next(self) -> Option<StageKind> {
        match self {
            StageKind::Sysprep => Some(StageKind::Quench),
            StageKind::Quench => Some(StageKind::Anneal),
            StageKind::Anneal => Some(StageKind::Requench),
            StageKind::Requench => None,
        }
    }

    pub fn from_name(name: &str) -> Option<StageKind> {
        StageKind::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Start and stop values of the thermostat (K) and, for NPT runs, the barostat (atm).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermoRamp {
    pub tstart: f64,
    pub tstop: f64,
    pub pstart: Option<f64>,
    pub pstop: Option<f64>,
}

impl ThermoRamp {
    pub fn nvt(tstart: f64, tstop: f64) -> Self {
        Self {
            tstart,
            tstop,
            pstart: None,
            pstop: None,
        }
    }

    pub fn npt(tstart: f64, tstop: f64, pstart: f64, pstop: f64) -> Self {
        Self {
            tstart,
            tstop,
            pstart: Some(pstart),
            pstop: Some(pstop),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ensemble {
    Nvt,
    /// Isotropic pressure coupling.
    Npt,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Thermostat {
    NoseHoover,
    Berendsen,
    Langevin,
}

/// Where the docking stage reads the current aggregate from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AggregateSource {
    /// The user-supplied starting system (first cycle).
    Data(PathBuf),
    /// The requenched aggregate of the previous cycle.
    Restart(PathBuf),
}

/// Orthogonal simulation box bounds as written in a data-file header.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxBounds {
    pub lo: [f64; 3],
    pub hi: [f64; 3],
}

impl BoxBounds {
    /// The box grown by `margin` on every side.
    pub fn padded(&self, margin: f64) -> Self {
        Self {
            lo: self.lo.map(|v| v - margin),
            hi: self.hi.map(|v| v + margin),
        }
    }

    pub fn center(&self) -> [f64; 3] {
        [
            0.5 * (self.lo[0] + self.hi[0]),
            0.5 * (self.lo[1] + self.hi[1]),
            0.5 * (self.lo[2] + self.hi[2]),
        ]
    }
}

/// A single trajectory frame picked for requenching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRef {
    pub trajectory: PathBuf,
    pub frame: usize,
    pub step: u64,
}

/// What the engine does with the stage's inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Append one molecule to the aggregate at a random direction and write
    /// the combined data file. No dynamics are run.
    Dock {
        aggregate: AggregateSource,
        molecule: PathBuf,
        gap: f64,
    },
    /// A (possibly minimized) MD run over the stage group.
    Dynamics {
        ensemble: Ensemble,
        thermostat: Thermostat,
        minimize: bool,
        unwrap: bool,
    },
    /// Cut the molecules inside `bounds` out of a solvent box and relax the
    /// cut box. Also writes the relaxed box as a data file.
    CutSolvent {
        bounds: BoxBounds,
        ensemble: Ensemble,
        thermostat: Thermostat,
    },
    /// Merge a relaxed solvent box around the solvate, delete overlapping
    /// solvent molecules and push the remaining solvent out of the way while
    /// the solvate is held fixed.
    Solvate {
        solvent_data: PathBuf,
        solvent_box: BoxBounds,
        overlap: f64,
    },
    /// Load one frame of the annealing trajectory, strip the solvent and
    /// quench the bare aggregate.
    Requench { frame: FrameRef, molfile_plugins: Option<PathBuf> },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StageInputs {
    pub data: Option<PathBuf>,
    pub restart: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutputs {
    /// The canonical output; its existence marks the stage as complete.
    pub primary: PathBuf,
    /// Periodic restart file the engine resumes from after an interruption.
    pub intermediate: Option<PathBuf>,
    pub trajectory: Option<PathBuf>,
    pub log: PathBuf,
    /// Additional data file written next to the primary restart.
    pub data: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    pub ncores: usize,
    pub gpu: bool,
}

/// Immutable description of one engine invocation.
///
/// Everything needed to reproduce the engine script is contained here; the
/// executor never consults the configuration directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDescriptor {
    pub name: String,
    pub directory: PathBuf,
    pub inputs: StageInputs,
    pub outputs: StageOutputs,
    pub settings: PathBuf,
    pub pair_coeffs: PathBuf,
    pub ramp: ThermoRamp,
    pub steps: u64,
    pub log_every: u64,
    pub resources: Resources,
    pub dielectric: Option<f64>,
    /// Number of leading atoms that belong to the solvate; the remainder is solvent.
    pub solvate_atoms: Option<usize>,
    /// Restricts time integration to a subset, e.g. `("solvent", "id > 120")`.
    pub group: Option<(String, String)>,
    pub seed: u64,
    pub operation: Operation,
}

impl StageDescriptor {
    pub fn canonical_output(&self) -> &Path {
        &self.outputs.primary
    }

    /// Engine input script, written next to the log.
    pub fn script_path(&self) -> PathBuf {
        self.outputs.log.with_extension("lmpin")
    }

    /// Captured standard output of the engine process.
    pub fn stdout_path(&self) -> PathBuf {
        self.outputs.log.with_extension("stdout")
    }

    /// Name of the group the stage integrates.
    pub fn group_name(&self) -> &str {
        self.group.as_ref().map_or("all", |(name, _)| name.as_str())
    }
}
