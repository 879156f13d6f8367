use crate::cli::RunArgs;
use crate::config::builder::build_config;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use kwzflow::engine::comm::WorkerGroup;
use kwzflow::engine::executor::lammps::LammpsExecutor;
use kwzflow::engine::inspect::LogInspector;
use kwzflow::engine::progress::ProgressReporter;
use kwzflow::workflows::kawska_zahn;
use tracing::info;

pub fn run(args: RunArgs, group: &WorkerGroup) -> Result<()> {
    info!("Building run configuration...");
    let app_config = build_config(&args)?;
    let config = &app_config.core_config;
    if let Some(source) = &app_config.source {
        info!(source = %source.display(), "Loaded configuration file");
    }
    info!(
        root = %config.root.display(),
        cycles = config.cycles,
        solvent = config.has_solvent(),
        "Configuration ready"
    );

    let executor = LammpsExecutor::from_config(&config.engine, &config.analysis);
    let inspector = LogInspector::new(&config.analysis);

    let handler = CliProgressHandler::new();
    let reporter = if group.is_coordinator() {
        ProgressReporter::with_callback(handler.get_callback())
    } else {
        ProgressReporter::new()
    };

    let summary = kawska_zahn::run(config, group, &executor, &inspector, &reporter)?;
    handler.finish();

    if group.is_coordinator() {
        if summary.cycles.is_empty() {
            println!("All {} cycles were already complete.", config.cycles);
        } else {
            println!(
                "Completed cycles {}..{} ({} full-cycle resets).",
                summary.cycles.start, summary.cycles.end, summary.resets
            );
        }
    }
    Ok(())
}
