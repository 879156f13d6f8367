use super::defaults::DefaultsConfig;
use super::file::{FileConfig, FileStageParams};
use super::models::AppConfig;
use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use kwzflow::engine::config as core_config;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

pub fn build_config(args: &RunArgs) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let file_config = if let Some(config_path) = &args.config {
        let mut config = FileConfig::from_file(config_path)?;
        if let Some(base) = config_path.parent() {
            anchor_paths(&mut config, base);
        }
        config
    } else {
        FileConfig::default()
    };

    let mut file_config = apply_set_values(file_config, &args.set_values)?;

    let root = args
        .root
        .clone()
        .or(file_config.root.take())
        .unwrap_or_else(|| PathBuf::from(&defaults.root));
    let cycles = args
        .cycles
        .or(file_config.cycles)
        .unwrap_or(defaults.cycles);
    let seed = args.seed.or(file_config.seed).unwrap_or(defaults.seed);

    let system_file = file_config.system.take().unwrap_or_default();
    let main = required_file(
        args.main_system.clone().or(system_file.main),
        "system.main",
        "--main-system",
    )?;
    let molecules = if args.molecules.is_empty() {
        system_file.molecules.unwrap_or_default()
    } else {
        args.molecules.clone()
    };
    if molecules.is_empty() {
        return Err(CliError::Config(
            "At least one molecule is required, either as 'system.molecules' in the config file or via --molecule."
                .to_string(),
        ));
    }
    let molecules = molecules
        .into_iter()
        .map(|m| required_file(Some(m), "system.molecules", "--molecule"))
        .collect::<Result<Vec<_>>>()?;
    let pattern = if args.pattern.is_empty() {
        system_file.pattern.unwrap_or_else(|| defaults.pattern.clone())
    } else {
        args.pattern.clone()
    };
    let settings = required_file(
        args.settings.clone().or(system_file.settings),
        "system.settings",
        "--settings",
    )?;
    let pair_coeffs = required_file(
        args.pair_coeffs.clone().or(system_file.pair_coeffs),
        "system.pair-coeffs",
        "--pair-coeffs",
    )?;
    let gpu = args.gpu || system_file.gpu.unwrap_or(false);

    let solvent = merge_solvent(args, &mut file_config, &settings, &pair_coeffs, gpu, &defaults)?;
    let protocol = merge_protocol(args, &mut file_config);
    let retry = merge_retry(&mut file_config);
    let analysis = merge_analysis(&mut file_config);
    let engine = merge_engine(args, &mut file_config)?;

    let core_config = core_config::KwzConfigBuilder::new()
        .root(absolute(&root)?)
        .cycles(cycles)
        .seed(seed)
        .main_system(main)
        .molecules(molecules)
        .pattern(pattern)
        .settings(settings)
        .pair_coeffs(pair_coeffs)
        .gpu(gpu)
        .dielectric(system_file.dielectric)
        .dock_gap(system_file.dock_gap.unwrap_or(defaults.dock_gap))
        .solvent(solvent)
        .protocol(protocol)
        .retry(retry)
        .analysis(analysis)
        .engine(engine)
        .build()?;

    debug!(?core_config, "Resolved run configuration");
    Ok(AppConfig {
        source: args.config.clone(),
        core_config,
    })
}

fn merge_solvent(
    args: &RunArgs,
    file_config: &mut FileConfig,
    settings: &Path,
    pair_coeffs: &Path,
    gpu: bool,
    defaults: &DefaultsConfig,
) -> Result<Option<core_config::SolventConfig>> {
    let file_val = file_config.solvent.take().unwrap_or_default();
    let Some(data) = args.solvent_data.clone().or(file_val.data) else {
        return Ok(None);
    };

    let solution_pair_coeffs = required_file(
        args.solution_pair_coeffs
            .clone()
            .or(file_val.solution_pair_coeffs),
        "solvent.solution-pair-coeffs",
        "--solution-pair-coeffs",
    )?;
    let solvent_settings = match file_val.settings {
        Some(path) => required_file(Some(path), "solvent.settings", "-S solvent.settings")?,
        None => settings.to_path_buf(),
    };
    let solvent_pair_coeffs = match file_val.pair_coeffs {
        Some(path) => required_file(Some(path), "solvent.pair-coeffs", "-S solvent.pair-coeffs")?,
        None => pair_coeffs.to_path_buf(),
    };

    Ok(Some(core_config::SolventConfig {
        data: required_file(Some(data), "solvent.data", "--solvent-data")?,
        settings: solvent_settings,
        pair_coeffs: solvent_pair_coeffs,
        solution_pair_coeffs,
        gpu: file_val.gpu.unwrap_or(gpu),
        overlap: file_val.overlap.unwrap_or(defaults.solvent_overlap),
        padding: file_val.padding.unwrap_or(defaults.solvent_padding),
    }))
}

fn merge_protocol(args: &RunArgs, file_config: &mut FileConfig) -> core_config::ProtocolConfig {
    let base = core_config::ProtocolConfig::default();
    let file_val = file_config.protocol.take().unwrap_or_default();
    let stage = |p: Option<FileStageParams>, default: core_config::StageParams| {
        p.map_or(default, |p| p.merge_over(default))
    };
    let anneal = file_val.anneal.unwrap_or_default();

    core_config::ProtocolConfig {
        quench: stage(file_val.quench, base.quench),
        relax_cut: stage(file_val.relax_cut, base.relax_cut),
        void: stage(file_val.void, base.void),
        relax_solvent: stage(file_val.relax_solvent, base.relax_solvent),
        heat: stage(file_val.heat, base.heat),
        anneal: anneal.params().merge_over(base.anneal),
        anneal_steps_plus: anneal.steps_plus.unwrap_or(base.anneal_steps_plus),
        anneal_max_extensions: anneal.max_extensions.unwrap_or(base.anneal_max_extensions),
        requench: stage(file_val.requench, base.requench),
        log_every: args
            .log_every
            .or(file_val.log_every)
            .unwrap_or(base.log_every),
        quench_ncores: file_val.quench_ncores.or(base.quench_ncores),
    }
}

fn merge_retry(file_config: &mut FileConfig) -> core_config::RetryConfig {
    let base = core_config::RetryConfig::default();
    let file_val = file_config.retry.take().unwrap_or_default();
    core_config::RetryConfig {
        sysprep_ceiling: file_val.sysprep_ceiling.unwrap_or(base.sysprep_ceiling),
        quench_ceiling: file_val.quench_ceiling.unwrap_or(base.quench_ceiling),
        void_attempts: file_val.void_attempts.unwrap_or(base.void_attempts),
        cycle_reset_ceiling: file_val.cycle_reset_ceiling.or(base.cycle_reset_ceiling),
        quench_scope: file_val.quench_scope.unwrap_or(base.quench_scope),
    }
}

fn merge_analysis(file_config: &mut FileConfig) -> core_config::AnalysisConfig {
    let base = core_config::AnalysisConfig::default();
    let file_val = file_config.analysis.take().unwrap_or_default();
    core_config::AnalysisConfig {
        window_percent: file_val.window_percent.unwrap_or(base.window_percent),
        energy_column: file_val.energy_column.unwrap_or(base.energy_column),
        cluster_column: file_val.cluster_column.unwrap_or(base.cluster_column),
        clash_column: file_val.clash_column.unwrap_or(base.clash_column),
        cluster_cutoff: file_val.cluster_cutoff.unwrap_or(base.cluster_cutoff),
    }
}

fn merge_engine(args: &RunArgs, file_config: &mut FileConfig) -> Result<core_config::EngineConfig> {
    let base = core_config::EngineConfig::default();
    let file_val = file_config.engine.take().unwrap_or_default();
    let launcher = match &args.launcher {
        Some(command) => split_command(command),
        None => file_val.launcher.unwrap_or(base.launcher),
    };
    let molfile_plugins = file_val
        .molfile_plugins
        .map(|p| absolute(&p))
        .transpose()?;

    Ok(core_config::EngineConfig {
        launcher,
        timeout: args.timeout.clone().or(file_val.timeout).or(base.timeout),
        ncores: args.ncores.or(file_val.ncores).unwrap_or(base.ncores),
        molfile_plugins,
    })
}

pub fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

/// Input files must exist up front; the engine runs inside stage directories
/// and only ever sees absolute paths.
fn required_file(value: Option<PathBuf>, key: &str, flag: &str) -> Result<PathBuf> {
    let path = value.ok_or_else(|| {
        CliError::Config(format!(
            "A value for '{}' is required either in the config file or via {}.",
            key, flag
        ))
    })?;
    if !path.is_file() {
        return Err(CliError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Provided path for '{}' does not exist: {}", key, path.display()),
        )));
    }
    absolute(&path)
}

/// Relative paths in a config file are relative to the file, not to the
/// working directory the command was started from.
fn anchor_paths(config: &mut FileConfig, base: &Path) {
    let anchor = |p: &mut PathBuf| {
        if p.is_relative() {
            *p = base.join(&*p);
        }
    };
    if let Some(root) = config.root.as_mut() {
        anchor(root);
    }
    if let Some(system) = config.system.as_mut() {
        system.main.iter_mut().for_each(anchor);
        system.settings.iter_mut().for_each(anchor);
        system.pair_coeffs.iter_mut().for_each(anchor);
        system.molecules.iter_mut().flatten().for_each(anchor);
    }
    if let Some(solvent) = config.solvent.as_mut() {
        solvent.data.iter_mut().for_each(anchor);
        solvent.settings.iter_mut().for_each(anchor);
        solvent.pair_coeffs.iter_mut().for_each(anchor);
        solvent.solution_pair_coeffs.iter_mut().for_each(anchor);
    }
    if let Some(engine) = config.engine.as_mut() {
        engine.molfile_plugins.iter_mut().for_each(anchor);
    }
}

fn parse<T: FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value))
    })
}

fn stage_params<'a>(config: &'a mut FileConfig, stage: &str) -> Option<&'a mut FileStageParams> {
    let protocol = config.protocol.get_or_insert_with(Default::default);
    let slot = match stage {
        "quench" => &mut protocol.quench,
        "relax-cut" => &mut protocol.relax_cut,
        "void" => &mut protocol.void,
        "relax-solvent" => &mut protocol.relax_solvent,
        "heat" => &mut protocol.heat,
        "requench" => &mut protocol.requench,
        _ => return None,
    };
    Some(slot.get_or_insert_with(Default::default))
}

fn apply_stage_field(params: &mut FileStageParams, key: &str, field: &str, value: &str) -> Result<bool> {
    match field {
        "tstart" => params.tstart = Some(parse(key, value, "float")?),
        "tstop" => params.tstop = Some(parse(key, value, "float")?),
        "pstart" => params.pstart = Some(parse(key, value, "float")?),
        "pstop" => params.pstop = Some(parse(key, value, "float")?),
        "steps" => params.steps = Some(parse(key, value, "integer")?),
        _ => return Ok(false),
    }
    Ok(true)
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    if set_values.is_empty() {
        return Ok(config);
    }
    for kv_pair in set_values {
        let Some((key, value)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };
        let key = key.trim();

        match key {
            "root" => config.root = Some(PathBuf::from(value)),
            "cycles" => config.cycles = Some(parse(key, value, "integer")?),
            "seed" => config.seed = Some(parse(key, value, "integer")?),

            "system.main" => {
                config.system.get_or_insert_with(Default::default).main = Some(value.into())
            }
            "system.settings" => {
                config.system.get_or_insert_with(Default::default).settings = Some(value.into())
            }
            "system.pair-coeffs" => {
                config.system.get_or_insert_with(Default::default).pair_coeffs =
                    Some(value.into())
            }
            "system.pattern" => {
                let pattern = value
                    .split(',')
                    .map(|v| parse(key, v, "integer"))
                    .collect::<Result<Vec<usize>>>()?;
                config.system.get_or_insert_with(Default::default).pattern = Some(pattern);
            }
            "system.gpu" => {
                config.system.get_or_insert_with(Default::default).gpu =
                    Some(parse(key, value, "boolean")?)
            }
            "system.dielectric" => {
                config.system.get_or_insert_with(Default::default).dielectric =
                    Some(parse(key, value, "float")?)
            }
            "system.dock-gap" => {
                config.system.get_or_insert_with(Default::default).dock_gap =
                    Some(parse(key, value, "float")?)
            }

            "solvent.data" => {
                config.solvent.get_or_insert_with(Default::default).data = Some(value.into())
            }
            "solvent.settings" => {
                config.solvent.get_or_insert_with(Default::default).settings = Some(value.into())
            }
            "solvent.pair-coeffs" => {
                config.solvent.get_or_insert_with(Default::default).pair_coeffs =
                    Some(value.into())
            }
            "solvent.solution-pair-coeffs" => {
                config
                    .solvent
                    .get_or_insert_with(Default::default)
                    .solution_pair_coeffs = Some(value.into())
            }
            "solvent.gpu" => {
                config.solvent.get_or_insert_with(Default::default).gpu =
                    Some(parse(key, value, "boolean")?)
            }
            "solvent.overlap" => {
                config.solvent.get_or_insert_with(Default::default).overlap =
                    Some(parse(key, value, "float")?)
            }
            "solvent.padding" => {
                config.solvent.get_or_insert_with(Default::default).padding =
                    Some(parse(key, value, "float")?)
            }

            "protocol.log-every" => {
                config.protocol.get_or_insert_with(Default::default).log_every =
                    Some(parse(key, value, "integer")?)
            }
            "protocol.quench-ncores" => {
                config.protocol.get_or_insert_with(Default::default).quench_ncores =
                    Some(parse(key, value, "integer")?)
            }
            "protocol.anneal.steps-plus" => {
                let protocol = config.protocol.get_or_insert_with(Default::default);
                protocol.anneal.get_or_insert_with(Default::default).steps_plus =
                    Some(parse(key, value, "integer")?)
            }
            "protocol.anneal.max-extensions" => {
                let protocol = config.protocol.get_or_insert_with(Default::default);
                protocol.anneal.get_or_insert_with(Default::default).max_extensions =
                    Some(parse(key, value, "integer")?)
            }

            "retry.sysprep-ceiling" => {
                config.retry.get_or_insert_with(Default::default).sysprep_ceiling =
                    Some(parse(key, value, "integer")?)
            }
            "retry.quench-ceiling" => {
                config.retry.get_or_insert_with(Default::default).quench_ceiling =
                    Some(parse(key, value, "integer")?)
            }
            "retry.void-attempts" => {
                config.retry.get_or_insert_with(Default::default).void_attempts =
                    Some(parse(key, value, "integer")?)
            }
            "retry.cycle-reset-ceiling" => {
                config.retry.get_or_insert_with(Default::default).cycle_reset_ceiling =
                    Some(parse(key, value, "integer")?)
            }
            "retry.quench-scope" => {
                let scope = match value.trim() {
                    "stage" => core_config::InvalidationScope::Stage,
                    "cycle" => core_config::InvalidationScope::Cycle,
                    other => {
                        return Err(CliError::Config(format!(
                            "Invalid value for {}: '{}'. Expected 'stage' or 'cycle'.",
                            key, other
                        )));
                    }
                };
                config.retry.get_or_insert_with(Default::default).quench_scope = Some(scope);
            }

            "analysis.window-percent" => {
                config.analysis.get_or_insert_with(Default::default).window_percent =
                    Some(parse(key, value, "float")?)
            }
            "analysis.energy-column" => {
                config.analysis.get_or_insert_with(Default::default).energy_column =
                    Some(value.trim().to_string())
            }
            "analysis.cluster-column" => {
                config.analysis.get_or_insert_with(Default::default).cluster_column =
                    Some(value.trim().to_string())
            }
            "analysis.clash-column" => {
                config.analysis.get_or_insert_with(Default::default).clash_column =
                    Some(value.trim().to_string())
            }
            "analysis.cluster-cutoff" => {
                config.analysis.get_or_insert_with(Default::default).cluster_cutoff =
                    Some(parse(key, value, "float")?)
            }

            "engine.ncores" => {
                config.engine.get_or_insert_with(Default::default).ncores =
                    Some(parse(key, value, "integer")?)
            }
            "engine.timeout" => {
                config.engine.get_or_insert_with(Default::default).timeout =
                    Some(value.trim().to_string())
            }
            "engine.launcher" => {
                config.engine.get_or_insert_with(Default::default).launcher =
                    Some(split_command(value))
            }
            "engine.molfile-plugins" => {
                config.engine.get_or_insert_with(Default::default).molfile_plugins =
                    Some(value.into())
            }

            _ => {
                let handled = match key.strip_prefix("protocol.").and_then(|k| k.split_once('.')) {
                    Some(("anneal", field)) => {
                        let protocol = config.protocol.get_or_insert_with(Default::default);
                        let anneal = protocol.anneal.get_or_insert_with(Default::default);
                        let mut params = anneal.params();
                        let handled = apply_stage_field(&mut params, key, field, value)?;
                        anneal.tstart = params.tstart;
                        anneal.tstop = params.tstop;
                        anneal.pstart = params.pstart;
                        anneal.pstop = params.pstop;
                        anneal.steps = params.steps;
                        handled
                    }
                    Some((stage, field)) => match stage_params(&mut config, stage) {
                        Some(params) => apply_stage_field(params, key, field, value)?,
                        None => false,
                    },
                    None => false,
                };
                if !handled {
                    return Err(CliError::Config(format!("Unknown configuration key: {}", key)));
                }
            }
        }
    }
    Ok(config)
}
