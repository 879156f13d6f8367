use super::config::{KwzConfig, StageParams};
use crate::core::models::layout::{AnnealStep, CycleLayout, RunFiles};
use crate::core::models::stage::{
    AggregateSource, BoxBounds, Ensemble, FrameRef, Operation, Resources, StageDescriptor,
    StageInputs, StageKind, StageOutputs, Thermostat, ThermoRamp,
};
use std::path::{Path, PathBuf};

const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Force-field files and resources a stage runs with.
struct Environment<'p> {
    settings: &'p Path,
    pair_coeffs: &'p Path,
    resources: Resources,
}

/// Derives the stage descriptors of one cycle from the run configuration.
///
/// Every path comes from [`CycleLayout`], so a stage's outputs are exactly
/// the inputs its successor expects.
pub struct StagePlanner<'a> {
    config: &'a KwzConfig,
    layout: CycleLayout,
}

impl<'a> StagePlanner<'a> {
    pub fn new(config: &'a KwzConfig, cycle: usize) -> Self {
        Self {
            config,
            layout: CycleLayout::new(config.root.clone(), cycle),
        }
    }

    pub fn layout(&self) -> &CycleLayout {
        &self.layout
    }

    fn cycle(&self) -> usize {
        self.layout.cycle()
    }

    fn seed(&self, tag: u64, attempt: u32) -> u64 {
        let mut seed = self.config.seed ^ SEED_MIX;
        for part in [self.cycle() as u64, tag, u64::from(attempt)] {
            seed = (seed ^ part).wrapping_mul(SEED_MIX).rotate_left(29);
        }
        seed
    }

    fn resources(&self, ncores: usize, gpu: bool) -> Resources {
        Resources { ncores, gpu }
    }

    fn outputs(files: &RunFiles, data: Option<PathBuf>) -> StageOutputs {
        StageOutputs {
            primary: files.restart.clone(),
            intermediate: Some(files.intermediate.clone()),
            trajectory: Some(files.trajectory.clone()),
            log: files.log.clone(),
            data,
        }
    }

    fn file_stem(path: &Path) -> String {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    #[allow(clippy::too_many_arguments)]
    fn dynamics(
        &self,
        kind: StageKind,
        files: RunFiles,
        inputs: StageInputs,
        ramp: ThermoRamp,
        steps: u64,
        operation: Operation,
        env: Environment<'_>,
        tag: u64,
    ) -> StageDescriptor {
        let Environment {
            settings,
            pair_coeffs,
            resources,
        } = env;
        StageDescriptor {
            name: Self::file_stem(&files.log),
            directory: self.layout.stage_dir(kind),
            inputs,
            outputs: Self::outputs(&files, None),
            settings: settings.to_path_buf(),
            pair_coeffs: pair_coeffs.to_path_buf(),
            ramp,
            steps,
            log_every: self.config.protocol.log_every,
            resources,
            dielectric: self.config.system.dielectric,
            solvate_atoms: None,
            group: None,
            seed: self.seed(tag, 0),
            operation,
        }
    }

    /// Docks the cycle's molecule onto the aggregate. The aggregate is the
    /// previous cycle's requenched system when it exists, the main system
    /// otherwise.
    pub fn sysprep(&self, attempt: u32) -> StageDescriptor {
        let system = &self.config.system;
        let aggregate = match self.layout.previous() {
            Some(previous) if previous.requench_files().restart.is_file() => {
                AggregateSource::Restart(previous.requench_files().restart)
            }
            _ => AggregateSource::Data(system.main.clone()),
        };
        let inputs = match &aggregate {
            AggregateSource::Data(path) => StageInputs {
                data: Some(path.clone()),
                restart: None,
            },
            AggregateSource::Restart(path) => StageInputs {
                data: None,
                restart: Some(path.clone()),
            },
        };

        StageDescriptor {
            name: format!("sysprep_{}", self.cycle()),
            directory: self.layout.stage_dir(StageKind::Sysprep),
            inputs,
            outputs: StageOutputs {
                primary: self.layout.sysprep_out(),
                intermediate: None,
                trajectory: None,
                log: self.layout.sysprep_log(),
                data: None,
            },
            settings: system.settings.clone(),
            pair_coeffs: system.pair_coeffs.clone(),
            ramp: self.config.protocol.quench.nvt_ramp(),
            steps: 0,
            log_every: self.config.protocol.log_every,
            resources: self.resources(1, false),
            dielectric: system.dielectric,
            solvate_atoms: None,
            group: None,
            seed: self.seed(1, attempt),
            operation: Operation::Dock {
                aggregate,
                molecule: self.config.molecule_for(self.cycle()).to_path_buf(),
                gap: system.dock_gap,
            },
        }
    }

    pub fn quench(&self, attempt: u32) -> StageDescriptor {
        let system = &self.config.system;
        let params = &self.config.protocol.quench;
        let mut stage = self.dynamics(
            StageKind::Quench,
            self.layout.quench_files(),
            StageInputs {
                data: Some(self.layout.sysprep_out()),
                restart: None,
            },
            params.nvt_ramp(),
            params.steps,
            Operation::Dynamics {
                ensemble: Ensemble::Nvt,
                thermostat: Thermostat::Berendsen,
                minimize: true,
                unwrap: true,
            },
            Environment {
                settings: &system.settings,
                pair_coeffs: &system.pair_coeffs,
                resources: self.resources(self.config.quench_ncores(), system.gpu),
            },
            2,
        );
        stage.seed = self.seed(2, attempt);
        stage
    }

    /// Cuts `bounds` out of the configured solvent box and relaxes it.
    pub fn relax_cut(&self, bounds: BoxBounds) -> Option<StageDescriptor> {
        let solvent = self.config.solvent.as_ref()?;
        let params = &self.config.protocol.relax_cut;
        let mut stage = self.dynamics(
            StageKind::Anneal,
            self.layout.anneal_files(AnnealStep::RelaxCut),
            StageInputs {
                data: Some(solvent.data.clone()),
                restart: None,
            },
            params.npt_ramp(),
            params.steps,
            Operation::CutSolvent {
                bounds: bounds.padded(solvent.padding),
                ensemble: Ensemble::Npt,
                thermostat: Thermostat::Berendsen,
            },
            Environment {
                settings: self.config.solvent_settings(),
                pair_coeffs: self.config.solvent_pair_coeffs(),
                resources: self.resources(self.config.engine.ncores, self.config.solvent_gpu()),
            },
            3,
        );
        stage.outputs.data = Some(self.layout.cut_solvent_data());
        Some(stage)
    }

    /// Embeds the solvate into the relaxed solvent box and clears space
    /// around it while the solvate is held fixed.
    pub fn void(&self, attempt: u32, natoms: usize, solvent_box: BoxBounds) -> Option<StageDescriptor> {
        let solvent = self.config.solvent.as_ref()?;
        let params = &self.config.protocol.void;
        let mut stage = self.dynamics(
            StageKind::Anneal,
            self.layout.anneal_files(AnnealStep::Void),
            StageInputs {
                data: None,
                restart: Some(self.layout.quench_files().restart),
            },
            params.npt_ramp(),
            params.steps,
            Operation::Solvate {
                solvent_data: self.layout.cut_solvent_data(),
                solvent_box,
                overlap: solvent.overlap,
            },
            Environment {
                settings: &self.config.system.settings,
                pair_coeffs: self.config.solution_pair_coeffs(),
                resources: self.resources(self.config.engine.ncores, self.config.solvent_gpu()),
            },
            4,
        );
        stage.outputs.data = Some(self.layout.solution_data());
        stage.solvate_atoms = Some(natoms);
        stage.group = Some(solvent_group(natoms));
        stage.seed = self.seed(4, attempt);
        Some(stage)
    }

    pub fn relax_solvent(&self, natoms: usize) -> Option<StageDescriptor> {
        self.config.solvent.as_ref()?;
        let params = &self.config.protocol.relax_solvent;
        let mut stage = self.dynamics(
            StageKind::Anneal,
            self.layout.anneal_files(AnnealStep::RelaxSolvent),
            StageInputs {
                data: Some(self.layout.solution_data()),
                restart: None,
            },
            params.nvt_ramp(),
            params.steps,
            Operation::Dynamics {
                ensemble: Ensemble::Nvt,
                thermostat: Thermostat::Berendsen,
                minimize: true,
                unwrap: false,
            },
            Environment {
                settings: &self.config.system.settings,
                pair_coeffs: self.config.solution_pair_coeffs(),
                resources: self.resources(self.config.engine.ncores, self.config.system.gpu),
            },
            5,
        );
        stage.solvate_atoms = Some(natoms);
        stage.group = Some(solvent_group(natoms));
        Some(stage)
    }

    fn productive_dynamics(&self) -> (Ensemble, Thermostat) {
        if self.config.has_solvent() {
            (Ensemble::Npt, Thermostat::Berendsen)
        } else {
            // Constant volume; the stochastic thermostat keeps docked
            // molecules from drifting apart.
            (Ensemble::Nvt, Thermostat::Langevin)
        }
    }

    fn ramp(&self, params: &StageParams) -> ThermoRamp {
        match self.productive_dynamics().0 {
            Ensemble::Npt => params.npt_ramp(),
            Ensemble::Nvt => params.nvt_ramp(),
        }
    }

    /// Heats the (solvated) aggregate to the annealing temperature.
    pub fn heat(&self, natoms: usize) -> StageDescriptor {
        let params = &self.config.protocol.heat;
        let (ensemble, thermostat) = self.productive_dynamics();
        let restart = if self.config.has_solvent() {
            self.layout.anneal_files(AnnealStep::RelaxSolvent).restart
        } else {
            self.layout.quench_files().restart
        };
        let mut stage = self.dynamics(
            StageKind::Anneal,
            self.layout.anneal_files(AnnealStep::Heat),
            StageInputs {
                data: None,
                restart: Some(restart),
            },
            self.ramp(params),
            params.steps,
            Operation::Dynamics {
                ensemble,
                thermostat,
                minimize: false,
                unwrap: true,
            },
            Environment {
                settings: &self.config.system.settings,
                pair_coeffs: self.config.solution_pair_coeffs(),
                resources: self.resources(self.config.engine.ncores, self.config.system.gpu),
            },
            6,
        );
        stage.solvate_atoms = Some(natoms);
        stage
    }

    /// The `segment`-th productive annealing run. Segment 0 continues from
    /// heating; every later segment extends its predecessor.
    pub fn anneal_segment(&self, segment: usize, natoms: usize) -> StageDescriptor {
        let protocol = &self.config.protocol;
        let params = &protocol.anneal;
        let (ensemble, thermostat) = self.productive_dynamics();
        let (restart, steps) = match segment {
            0 => (self.layout.anneal_files(AnnealStep::Heat).restart, params.steps),
            k => (
                self.layout.anneal_segment_files(k - 1).restart,
                protocol.anneal_steps_plus,
            ),
        };
        let mut stage = self.dynamics(
            StageKind::Anneal,
            self.layout.anneal_segment_files(segment),
            StageInputs {
                data: None,
                restart: Some(restart),
            },
            self.ramp(params),
            steps,
            Operation::Dynamics {
                ensemble,
                thermostat,
                minimize: false,
                unwrap: true,
            },
            Environment {
                settings: &self.config.system.settings,
                pair_coeffs: self.config.solution_pair_coeffs(),
                resources: self.resources(self.config.engine.ncores, self.config.system.gpu),
            },
            7 + segment as u64,
        );
        stage.solvate_atoms = Some(natoms);
        stage
    }

    /// Strips the solvent from the selected annealing frame and quenches the
    /// bare aggregate.
    pub fn requench(&self, frame: FrameRef, natoms: usize) -> StageDescriptor {
        let system = &self.config.system;
        let params = &self.config.protocol.requench;
        let files = self.layout.requench_files();
        let mut stage = self.dynamics(
            StageKind::Requench,
            files,
            StageInputs {
                data: None,
                restart: Some(self.layout.anneal_out()),
            },
            params.nvt_ramp(),
            params.steps,
            Operation::Requench {
                frame,
                molfile_plugins: self.config.engine.molfile_plugins.clone(),
            },
            Environment {
                settings: &system.settings,
                pair_coeffs: &system.pair_coeffs,
                resources: self.resources(self.config.engine.ncores, system.gpu),
            },
            u64::MAX,
        );
        stage.outputs.data = Some(self.layout.requench_data());
        stage.solvate_atoms = Some(natoms);
        stage
    }
}

fn solvent_group(natoms: usize) -> (String, String) {
    ("solvent".to_string(), format!("id > {natoms}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::{SolventConfig, test_config};
    use std::fs;

    fn solvent_config(root: &Path) -> KwzConfig {
        let mut config = test_config(root);
        config.solvent = Some(SolventConfig {
            data: root.join("solvent.lmpdat"),
            settings: root.join("solvent.lmpcfg"),
            pair_coeffs: root.join("solvent_pair.lmpcfg"),
            solution_pair_coeffs: root.join("solution_pair.lmpcfg"),
            gpu: false,
            overlap: 2.0,
            padding: 20.0,
        });
        config
    }

    fn frame() -> FrameRef {
        FrameRef {
            trajectory: PathBuf::from("/work/anneal_7/0_anneal_7.dcd"),
            frame: 3,
            step: 3000,
        }
    }

    #[test]
    fn anneal_outputs_feed_requench_for_cycle_seven() {
        let config = test_config(Path::new("/work"));
        let planner = StagePlanner::new(&config, 7);
        let layout = planner.layout().clone();

        let heat = planner.heat(90);
        let first = planner.anneal_segment(0, 90);
        assert_eq!(first.inputs.restart.as_deref(), Some(heat.canonical_output()));
        let second = planner.anneal_segment(1, 90);
        assert_eq!(second.inputs.restart.as_deref(), Some(first.canonical_output()));

        let requench = planner.requench(frame(), 90);
        assert_eq!(requench.inputs.restart, Some(layout.anneal_out()));
        assert_eq!(
            layout.anneal_out(),
            PathBuf::from("/work/anneal_7/anneal_7_out.lmprst")
        );
        assert_eq!(requench.directory, PathBuf::from("/work/requench_7"));
    }

    #[test]
    fn quench_reads_what_sysprep_writes() {
        let config = test_config(Path::new("/work"));
        let planner = StagePlanner::new(&config, 7);
        let sysprep = planner.sysprep(0);
        let quench = planner.quench(0);
        assert_eq!(quench.inputs.data.as_deref(), Some(sysprep.canonical_output()));
        assert_eq!(quench.name, "quench_7");
        assert_eq!(quench.steps, 250_000);
    }

    #[test]
    fn sysprep_continues_from_previous_requench_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let planner = StagePlanner::new(&config, 1);
        assert!(matches!(
            planner.sysprep(0).operation,
            Operation::Dock { aggregate: AggregateSource::Data(_), .. }
        ));

        let previous = CycleLayout::new(dir.path(), 0).requench_files();
        fs::create_dir_all(previous.restart.parent().unwrap()).unwrap();
        fs::write(&previous.restart, "").unwrap();
        match planner.sysprep(0).operation {
            Operation::Dock { aggregate, molecule, .. } => {
                assert_eq!(aggregate, AggregateSource::Restart(previous.restart));
                assert_eq!(molecule, dir.path().join("b.lmpdat"));
            }
            other => panic!("unexpected operation {other:?}"),
        }
    }

    #[test]
    fn vacuum_heat_starts_from_quench_and_skips_solvent_stages() {
        let config = test_config(Path::new("/work"));
        let planner = StagePlanner::new(&config, 0);
        let bounds = BoxBounds {
            lo: [0.0; 3],
            hi: [10.0; 3],
        };
        assert!(planner.relax_cut(bounds).is_none());
        assert!(planner.void(0, 10, bounds).is_none());
        let heat = planner.heat(10);
        assert_eq!(heat.inputs.restart, Some(planner.layout().quench_files().restart));
        assert!(matches!(
            heat.operation,
            Operation::Dynamics { ensemble: Ensemble::Nvt, thermostat: Thermostat::Langevin, .. }
        ));
    }

    #[test]
    fn solvated_chain_links_cut_void_relax_and_heat() {
        let config = solvent_config(Path::new("/work"));
        let planner = StagePlanner::new(&config, 2);
        let layout = planner.layout().clone();
        let bounds = BoxBounds {
            lo: [0.0; 3],
            hi: [10.0; 3],
        };

        let cut = planner.relax_cut(bounds).unwrap();
        assert_eq!(cut.outputs.data, Some(layout.cut_solvent_data()));
        match &cut.operation {
            Operation::CutSolvent { bounds, .. } => assert_eq!(bounds.lo, [-20.0; 3]),
            other => panic!("unexpected operation {other:?}"),
        }

        let void = planner.void(0, 120, bounds).unwrap();
        assert_eq!(void.group_name(), "solvent");
        assert_eq!(void.outputs.data, Some(layout.solution_data()));

        let relax = planner.relax_solvent(120).unwrap();
        assert_eq!(relax.inputs.data, void.outputs.data);

        let heat = planner.heat(120);
        assert_eq!(heat.inputs.restart.as_deref(), Some(relax.canonical_output()));
        assert_eq!(heat.pair_coeffs, PathBuf::from("/work/solution_pair.lmpcfg"));
    }

    #[test]
    fn retries_get_distinct_seeds() {
        let config = test_config(Path::new("/work"));
        let planner = StagePlanner::new(&config, 0);
        assert_ne!(planner.sysprep(0).seed, planner.sysprep(1).seed);
        assert_ne!(planner.sysprep(0).seed, StagePlanner::new(&config, 1).sysprep(0).seed);
    }
}
