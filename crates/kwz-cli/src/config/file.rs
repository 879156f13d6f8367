use crate::error::{CliError, Result};
use kwzflow::engine::config::{InvalidationScope, StageParams};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Run configuration as written in a TOML file. Every field is optional;
/// missing values fall back to defaults when the core configuration is built.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub root: Option<PathBuf>,
    pub cycles: Option<usize>,
    pub seed: Option<u64>,
    pub system: Option<FileSystemConfig>,
    pub solvent: Option<FileSolventConfig>,
    pub protocol: Option<FileProtocolConfig>,
    pub retry: Option<FileRetryConfig>,
    pub analysis: Option<FileAnalysisConfig>,
    pub engine: Option<FileEngineConfig>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileSystemConfig {
    pub main: Option<PathBuf>,
    pub molecules: Option<Vec<PathBuf>>,
    pub pattern: Option<Vec<usize>>,
    pub settings: Option<PathBuf>,
    pub pair_coeffs: Option<PathBuf>,
    pub gpu: Option<bool>,
    pub dielectric: Option<f64>,
    pub dock_gap: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileSolventConfig {
    pub data: Option<PathBuf>,
    pub settings: Option<PathBuf>,
    pub pair_coeffs: Option<PathBuf>,
    pub solution_pair_coeffs: Option<PathBuf>,
    pub gpu: Option<bool>,
    pub overlap: Option<f64>,
    pub padding: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone, Copy)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileStageParams {
    pub tstart: Option<f64>,
    pub tstop: Option<f64>,
    pub pstart: Option<f64>,
    pub pstop: Option<f64>,
    pub steps: Option<u64>,
}

impl FileStageParams {
    pub fn merge_over(&self, base: StageParams) -> StageParams {
        StageParams {
            tstart: self.tstart.unwrap_or(base.tstart),
            tstop: self.tstop.unwrap_or(base.tstop),
            pstart: self.pstart.unwrap_or(base.pstart),
            pstop: self.pstop.unwrap_or(base.pstop),
            steps: self.steps.unwrap_or(base.steps),
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileProtocolConfig {
    pub log_every: Option<u64>,
    pub quench_ncores: Option<usize>,
    pub quench: Option<FileStageParams>,
    pub relax_cut: Option<FileStageParams>,
    pub void: Option<FileStageParams>,
    pub relax_solvent: Option<FileStageParams>,
    pub heat: Option<FileStageParams>,
    pub anneal: Option<FileAnnealParams>,
    pub requench: Option<FileStageParams>,
}

/// The productive anneal additionally carries its extension budget.
#[derive(Deserialize, Debug, Default, Clone, Copy)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileAnnealParams {
    pub tstart: Option<f64>,
    pub tstop: Option<f64>,
    pub pstart: Option<f64>,
    pub pstop: Option<f64>,
    pub steps: Option<u64>,
    pub steps_plus: Option<u64>,
    pub max_extensions: Option<usize>,
}

impl FileAnnealParams {
    pub fn params(&self) -> FileStageParams {
        FileStageParams {
            tstart: self.tstart,
            tstop: self.tstop,
            pstart: self.pstart,
            pstop: self.pstop,
            steps: self.steps,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileRetryConfig {
    pub sysprep_ceiling: Option<u32>,
    pub quench_ceiling: Option<u32>,
    pub void_attempts: Option<u32>,
    pub cycle_reset_ceiling: Option<u32>,
    pub quench_scope: Option<InvalidationScope>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileAnalysisConfig {
    pub window_percent: Option<f64>,
    pub energy_column: Option<String>,
    pub cluster_column: Option<String>,
    pub clash_column: Option<String>,
    pub cluster_cutoff: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileEngineConfig {
    pub launcher: Option<Vec<String>>,
    pub timeout: Option<String>,
    pub ncores: Option<usize>,
    pub molfile_plugins: Option<PathBuf>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }
}
