use crate::core::models::stage::ThermoRamp;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Pattern entry {index} does not refer to one of the {molecules} configured molecules")]
    InvalidPattern { index: usize, molecules: usize },
    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },
}

/// Thermostat and barostat endpoints plus run length of one protocol step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageParams {
    pub tstart: f64,
    pub tstop: f64,
    pub pstart: f64,
    pub pstop: f64,
    pub steps: u64,
}

impl StageParams {
    pub const fn new(tstart: f64, tstop: f64, pstart: f64, pstop: f64, steps: u64) -> Self {
        Self {
            tstart,
            tstop,
            pstart,
            pstop,
            steps,
        }
    }

    pub fn nvt_ramp(&self) -> ThermoRamp {
        ThermoRamp::nvt(self.tstart, self.tstop)
    }

    pub fn npt_ramp(&self) -> ThermoRamp {
        ThermoRamp::npt(self.tstart, self.tstop, self.pstart, self.pstop)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub quench: StageParams,
    pub relax_cut: StageParams,
    pub void: StageParams,
    pub relax_solvent: StageParams,
    pub heat: StageParams,
    pub anneal: StageParams,
    /// Length of every equilibration extension of the productive anneal.
    pub anneal_steps_plus: u64,
    pub anneal_max_extensions: usize,
    pub requench: StageParams,
    pub log_every: u64,
    /// Cores used for quenching; defaults to the engine core count.
    pub quench_ncores: Option<usize>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            quench: StageParams::new(5.0, 5.0, 1.0, 1.0, 250_000),
            relax_cut: StageParams::new(200.0, 250.0, 50.0, 10.0, 20_000),
            void: StageParams::new(250.0, 250.0, 300.0, 300.0, 10_000),
            relax_solvent: StageParams::new(250.0, 250.0, 10.0, 1.0, 10_000),
            heat: StageParams::new(200.0, 300.0, 50.0, 1.0, 200_000),
            anneal: StageParams::new(300.0, 300.0, 1.0, 1.0, 2_000_000),
            anneal_steps_plus: 500_000,
            anneal_max_extensions: 10,
            requench: StageParams::new(1.0, 1.0, 1.0, 1.0, 1_000),
            log_every: 1_000,
            quench_ncores: None,
        }
    }
}

/// Which stage directories a failed quench invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationScope {
    /// Only the quench directory; sysprep output is reused.
    Stage,
    /// Sysprep and quench; the molecule is docked anew.
    #[default]
    Cycle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub sysprep_ceiling: u32,
    pub quench_ceiling: u32,
    pub void_attempts: u32,
    /// Full-cycle resets tolerated per cycle; `None` is unlimited.
    pub cycle_reset_ceiling: Option<u32>,
    pub quench_scope: InvalidationScope,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            sysprep_ceiling: 20,
            quench_ceiling: 20,
            void_attempts: 5,
            cycle_reset_ceiling: None,
            quench_scope: InvalidationScope::Cycle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Trailing share of a run (in percent) considered for frame selection
    /// and equilibration.
    pub window_percent: f64,
    pub energy_column: String,
    pub cluster_column: String,
    pub clash_column: String,
    /// Distance (Å) below which two solvate atoms belong to the same cluster.
    pub cluster_cutoff: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_percent: 90.0,
            energy_column: "c_pe_solvate_complete".to_string(),
            cluster_column: "c_aggregate_clusters".to_string(),
            clash_column: "c_void_clashes".to_string(),
            cluster_cutoff: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Launch command with `{ncores}`, `{script}` and `{log}` placeholders.
    pub launcher: Vec<String>,
    /// Engine wall-time budget, `HH:MM:SS`.
    pub timeout: Option<String>,
    pub ncores: usize,
    pub molfile_plugins: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            launcher: ["mpirun", "-np", "{ncores}", "lmp", "-in", "{script}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timeout: None,
            ncores: 1,
            molfile_plugins: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemConfig {
    pub main: PathBuf,
    pub molecules: Vec<PathBuf>,
    pub pattern: Vec<usize>,
    pub settings: PathBuf,
    pub pair_coeffs: PathBuf,
    pub gpu: bool,
    pub dielectric: Option<f64>,
    /// Distance (Å) between the aggregate surface and a docked molecule.
    pub dock_gap: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolventConfig {
    pub data: PathBuf,
    pub settings: PathBuf,
    pub pair_coeffs: PathBuf,
    /// Mixed solvate/solvent pair coefficients.
    pub solution_pair_coeffs: PathBuf,
    pub gpu: bool,
    /// Solvent molecules closer than this (Å) to the solvate are deleted.
    pub overlap: f64,
    /// Margin (Å) kept around the solvate when cutting the solvent box.
    pub padding: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KwzConfig {
    pub root: PathBuf,
    pub cycles: usize,
    pub seed: u64,
    pub system: SystemConfig,
    pub solvent: Option<SolventConfig>,
    pub protocol: ProtocolConfig,
    pub retry: RetryConfig,
    pub analysis: AnalysisConfig,
    pub engine: EngineConfig,
}

impl KwzConfig {
    /// Molecule docked in `cycle`.
    pub fn molecule_for(&self, cycle: usize) -> &Path {
        let pattern = &self.system.pattern;
        &self.system.molecules[pattern[cycle % pattern.len()]]
    }

    pub fn has_solvent(&self) -> bool {
        self.solvent.is_some()
    }

    pub fn solvent_settings(&self) -> &Path {
        self.solvent
            .as_ref()
            .map_or(&self.system.settings, |s| &s.settings)
    }

    pub fn solvent_pair_coeffs(&self) -> &Path {
        self.solvent
            .as_ref()
            .map_or(&self.system.pair_coeffs, |s| &s.pair_coeffs)
    }

    pub fn solvent_gpu(&self) -> bool {
        self.solvent.as_ref().map_or(self.system.gpu, |s| s.gpu)
    }

    pub fn solution_pair_coeffs(&self) -> &Path {
        self.solvent
            .as_ref()
            .map_or(&self.system.pair_coeffs, |s| &s.solution_pair_coeffs)
    }

    pub fn quench_ncores(&self) -> usize {
        self.protocol.quench_ncores.unwrap_or(self.engine.ncores)
    }
}

#[derive(Default)]
pub struct KwzConfigBuilder {
    root: Option<PathBuf>,
    cycles: Option<usize>,
    seed: Option<u64>,
    main: Option<PathBuf>,
    molecules: Option<Vec<PathBuf>>,
    pattern: Option<Vec<usize>>,
    settings: Option<PathBuf>,
    pair_coeffs: Option<PathBuf>,
    gpu: bool,
    dielectric: Option<f64>,
    dock_gap: Option<f64>,
    solvent: Option<SolventConfig>,
    protocol: Option<ProtocolConfig>,
    retry: Option<RetryConfig>,
    analysis: Option<AnalysisConfig>,
    engine: Option<EngineConfig>,
}

impl KwzConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(mut self, path: PathBuf) -> Self {
        self.root = Some(path);
        self
    }
    pub fn cycles(mut self, cycles: usize) -> Self {
        self.cycles = Some(cycles);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn main_system(mut self, path: PathBuf) -> Self {
        self.main = Some(path);
        self
    }
    pub fn molecules(mut self, paths: Vec<PathBuf>) -> Self {
        self.molecules = Some(paths);
        self
    }
    pub fn pattern(mut self, pattern: Vec<usize>) -> Self {
        self.pattern = Some(pattern);
        self
    }
    pub fn settings(mut self, path: PathBuf) -> Self {
        self.settings = Some(path);
        self
    }
    pub fn pair_coeffs(mut self, path: PathBuf) -> Self {
        self.pair_coeffs = Some(path);
        self
    }
    pub fn gpu(mut self, gpu: bool) -> Self {
        self.gpu = gpu;
        self
    }
    pub fn dielectric(mut self, dielectric: Option<f64>) -> Self {
        self.dielectric = dielectric;
        self
    }
    pub fn dock_gap(mut self, gap: f64) -> Self {
        self.dock_gap = Some(gap);
        self
    }
    pub fn solvent(mut self, solvent: Option<SolventConfig>) -> Self {
        self.solvent = solvent;
        self
    }
    pub fn protocol(mut self, protocol: ProtocolConfig) -> Self {
        self.protocol = Some(protocol);
        self
    }
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }
    pub fn analysis(mut self, analysis: AnalysisConfig) -> Self {
        self.analysis = Some(analysis);
        self
    }
    pub fn engine(mut self, engine: EngineConfig) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn build(self) -> Result<KwzConfig, ConfigError> {
        let molecules = self
            .molecules
            .ok_or(ConfigError::MissingParameter("molecules"))?;
        if molecules.is_empty() {
            return Err(ConfigError::MissingParameter("molecules"));
        }

        let pattern = self.pattern.unwrap_or_else(|| vec![0]);
        if pattern.is_empty() {
            return Err(ConfigError::InvalidValue {
                parameter: "pattern",
                reason: "at least one molecule index is required".to_string(),
            });
        }
        if let Some(&index) = pattern.iter().find(|&&i| i >= molecules.len()) {
            return Err(ConfigError::InvalidPattern {
                index,
                molecules: molecules.len(),
            });
        }

        let system = SystemConfig {
            main: self.main.ok_or(ConfigError::MissingParameter("main_system"))?,
            molecules,
            pattern,
            settings: self
                .settings
                .ok_or(ConfigError::MissingParameter("settings"))?,
            pair_coeffs: self
                .pair_coeffs
                .ok_or(ConfigError::MissingParameter("pair_coeffs"))?,
            gpu: self.gpu,
            dielectric: self.dielectric,
            dock_gap: self.dock_gap.unwrap_or(2.5),
        };

        let protocol = self.protocol.unwrap_or_default();
        if protocol.log_every == 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "log_every",
                reason: "must be positive".to_string(),
            });
        }

        let analysis = self.analysis.unwrap_or_default();
        if !(analysis.window_percent > 0.0 && analysis.window_percent <= 100.0) {
            return Err(ConfigError::InvalidValue {
                parameter: "window_percent",
                reason: format!("{} is outside (0, 100]", analysis.window_percent),
            });
        }

        let engine = self.engine.unwrap_or_default();
        if engine.launcher.is_empty() {
            return Err(ConfigError::InvalidValue {
                parameter: "launcher",
                reason: "command is empty".to_string(),
            });
        }
        if engine.ncores == 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "ncores",
                reason: "must be positive".to_string(),
            });
        }

        Ok(KwzConfig {
            root: self.root.ok_or(ConfigError::MissingParameter("root"))?,
            cycles: self.cycles.ok_or(ConfigError::MissingParameter("cycles"))?,
            seed: self.seed.unwrap_or(0),
            system,
            solvent: self.solvent,
            protocol,
            retry: self.retry.unwrap_or_default(),
            analysis,
            engine,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_config(root: &Path) -> KwzConfig {
    KwzConfigBuilder::new()
        .root(root.to_path_buf())
        .cycles(2)
        .main_system(root.join("main.lmpdat"))
        .molecules(vec![root.join("a.lmpdat"), root.join("b.lmpdat")])
        .pattern(vec![0, 1, 1])
        .settings(root.join("settings.lmpcfg"))
        .pair_coeffs(root.join("pair.lmpcfg"))
        .build()
        .unwrap()
}
