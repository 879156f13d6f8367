use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu, William A. Goddard III, Victor Wai Tak Kam",
    version,
    about = "kwz - Kawska-Zahn crystallization workflows, growing a molecular aggregate one docked molecule per cycle through an external MD engine.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output.
    /// With several workers, each rank writes `<stem>.rank<N>.<ext>`.
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run (or resume) the aggregation protocol.
    Run(RunArgs),
    /// Show per-cycle progress of a working directory and where a run would resume.
    Status(StatusArgs),
    /// Run a single standalone dynamics stage, e.g. to equilibrate a solvent box.
    Npt(NptArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Path to the run configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Working directory holding the per-cycle stage directories.
    #[arg(short, long, value_name = "PATH")]
    pub root: Option<PathBuf>,

    /// Total number of cycles (molecules to add).
    #[arg(short = 'n', long, value_name = "INT")]
    pub cycles: Option<usize>,

    /// Base seed for docking directions and velocities.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    // --- System Overrides ---
    /// Starting system data file.
    #[arg(long, value_name = "PATH")]
    pub main_system: Option<PathBuf>,

    /// Molecule data file; repeat for several molecules.
    #[arg(short, long = "molecule", value_name = "PATH")]
    pub molecules: Vec<PathBuf>,

    /// Molecule indices docked in successive cycles, e.g. `0,1,1`.
    #[arg(short, long, value_name = "LIST", value_delimiter = ',')]
    pub pattern: Vec<usize>,

    /// Force-field settings file of the solvate.
    #[arg(long, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Pair-coefficient file of the solvate.
    #[arg(long, value_name = "PATH")]
    pub pair_coeffs: Option<PathBuf>,

    /// Run solvate stages with the GPU package.
    #[arg(long)]
    pub gpu: bool,

    // --- Solvent Overrides ---
    /// Relaxed solvent box data file; enables solvent handling.
    #[arg(long, value_name = "PATH")]
    pub solvent_data: Option<PathBuf>,

    /// Mixed solvate/solvent pair-coefficient file.
    #[arg(long, value_name = "PATH")]
    pub solution_pair_coeffs: Option<PathBuf>,

    // --- Engine Overrides ---
    /// Cores handed to the engine launcher.
    #[arg(long, value_name = "INT")]
    pub ncores: Option<usize>,

    /// Engine wall-time budget (HH:MM:SS); a run that hits it exits with code 103.
    #[arg(long, value_name = "HH:MM:SS")]
    pub timeout: Option<String>,

    /// Engine launch command, split on whitespace. Supports `{ncores}`,
    /// `{script}` and `{log}` placeholders.
    #[arg(long, value_name = "COMMAND")]
    pub launcher: Option<String>,

    /// Logging interval of every stage, in steps.
    #[arg(long, value_name = "INT")]
    pub log_every: Option<u64>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S protocol.anneal.steps=1000000
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `status` subcommand.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Working directory to inspect.
    #[arg(short, long, value_name = "PATH", default_value = ".")]
    pub root: PathBuf,
}

/// Arguments for the `npt` subcommand.
#[derive(Args, Debug)]
pub struct NptArgs {
    /// Name of the run; used as the stem of every output file.
    #[arg(long, default_value = "npt", value_name = "NAME")]
    pub name: String,

    /// Directory the run writes into.
    #[arg(short, long, default_value = ".", value_name = "PATH")]
    pub directory: PathBuf,

    #[command(flatten)]
    pub input: NptInput,

    /// Force-field settings file.
    #[arg(long, required = true, value_name = "PATH")]
    pub settings: PathBuf,

    /// Pair-coefficient file.
    #[arg(long, required = true, value_name = "PATH")]
    pub pair_coeffs: PathBuf,

    /// Start temperature (K).
    #[arg(long, default_value_t = 300.0, value_name = "K")]
    pub tstart: f64,

    /// Stop temperature (K).
    #[arg(long, default_value_t = 300.0, value_name = "K")]
    pub tstop: f64,

    /// Start pressure (atm).
    #[arg(long, default_value_t = 1.0, value_name = "ATM")]
    pub pstart: f64,

    /// Stop pressure (atm).
    #[arg(long, default_value_t = 1.0, value_name = "ATM")]
    pub pstop: f64,

    /// Number of MD steps.
    #[arg(long, default_value_t = 100_000, value_name = "INT")]
    pub steps: u64,

    /// Logging interval, in steps.
    #[arg(long, default_value_t = 1_000, value_name = "INT")]
    pub log_every: u64,

    /// Run at constant volume instead of constant pressure.
    #[arg(long)]
    pub nvt: bool,

    /// Minimize before the dynamics.
    #[arg(long)]
    pub minimize: bool,

    /// Relative dielectric constant.
    #[arg(long, value_name = "FLOAT")]
    pub dielectric: Option<f64>,

    /// Cores handed to the engine launcher.
    #[arg(long, default_value_t = 1, value_name = "INT")]
    pub ncores: usize,

    /// Use the GPU package.
    #[arg(long)]
    pub gpu: bool,

    /// Velocity seed.
    #[arg(long, default_value_t = 0, value_name = "INT")]
    pub seed: u64,

    /// Engine wall-time budget (HH:MM:SS).
    #[arg(long, value_name = "HH:MM:SS")]
    pub timeout: Option<String>,

    /// Engine launch command, split on whitespace.
    #[arg(long, value_name = "COMMAND")]
    pub launcher: Option<String>,
}

/// Exactly one starting point for a standalone run.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct NptInput {
    /// Start from a data file.
    #[arg(long, value_name = "PATH")]
    pub data: Option<PathBuf>,
    /// Start from a restart file.
    #[arg(long, value_name = "PATH")]
    pub restart: Option<PathBuf>,
}
