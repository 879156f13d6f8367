//! LAMMPS input generation.
//!
//! A script is a pure function of its [`StageDescriptor`] plus whether an
//! intermediate restart from an interrupted attempt is present. Every script
//! writes the canonical output last, and only once the requested number of
//! steps has been reached, so a killed or timed-out engine never leaves a
//! stage looking complete.

use crate::core::models::stage::{BoxBounds, Ensemble, Operation, StageDescriptor, Thermostat};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::path::Path;

const RESTART_EVERY_LOGS: u64 = 50;
const MINIMIZE: &str = "minimize 1.0e-6 1.0e-8 10000 100000";

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOptions {
    /// Engine wall-time budget passed to `timer timeout`.
    pub timeout: Option<String>,
    /// Distance (Å) joining solvate atoms into one cluster.
    pub cluster_cutoff: f64,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            cluster_cutoff: 4.0,
        }
    }
}

#[derive(Default)]
struct Script {
    lines: Vec<String>,
}

impl Script {
    fn line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn blank(&mut self) {
        self.lines.push(String::new());
    }

    fn finish(self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

fn p(path: &Path) -> String {
    path.display().to_string()
}

/// Whether the stage can continue from an earlier, interrupted attempt.
pub fn can_resume(stage: &StageDescriptor) -> bool {
    !matches!(stage.operation, Operation::Dock { .. })
        && stage
            .outputs
            .intermediate
            .as_deref()
            .is_some_and(Path::is_file)
}

/// Random unit vector derived from `seed`, uniform on the sphere.
pub fn dock_direction(seed: u64) -> Vector3<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let z: f64 = rng.gen_range(-1.0..=1.0);
    let phi: f64 = rng.gen_range(0.0..(2.0 * PI));
    let r = (1.0 - z * z).max(0.0).sqrt();
    Vector3::new(r * phi.cos(), r * phi.sin(), z).normalize()
}

pub fn render(stage: &StageDescriptor, options: &ScriptOptions) -> String {
    let resume = can_resume(stage);
    let mut s = Script::default();

    s.line(format!("# {}", stage.name));
    s.line(format!("log {} append", p(&stage.outputs.log)));
    if stage.resources.gpu {
        s.line("package gpu 1 neigh no");
        s.line("suffix gpu");
    }
    s.line(format!("include {}", p(&stage.settings)));
    s.line("box tilt large");
    s.blank();

    read_system(&mut s, stage, resume);
    s.line(format!("include {}", p(&stage.pair_coeffs)));
    if let Some(dielectric) = stage.dielectric {
        s.line(format!("dielectric {dielectric}"));
    }
    s.blank();

    if let Operation::Dock { molecule, gap, .. } = &stage.operation {
        dock(&mut s, stage, molecule, *gap);
        return s.finish();
    }

    if !resume {
        prepare_system(&mut s, stage);
    }
    define_groups(&mut s, stage);
    define_thermo(&mut s, stage, options);
    dynamics(&mut s, stage, options, resume);
    s.finish()
}

fn read_system(s: &mut Script, stage: &StageDescriptor, resume: bool) {
    if resume {
        if let Some(intermediate) = &stage.outputs.intermediate {
            s.line(format!("read_restart {}", p(intermediate)));
            return;
        }
    }
    if let Some(restart) = &stage.inputs.restart {
        s.line(format!("read_restart {}", p(restart)));
        s.line("reset_timestep 0");
    } else if let Some(data) = &stage.inputs.data {
        s.line(format!("read_data {}", p(data)));
    }
}

fn dock(s: &mut Script, stage: &StageDescriptor, molecule: &Path, gap: f64) {
    let dir = dock_direction(stage.seed);
    s.line("variable kwz_dx equal bound(all,xmax)-bound(all,xmin)");
    s.line("variable kwz_dy equal bound(all,ymax)-bound(all,ymin)");
    s.line("variable kwz_dz equal bound(all,zmax)-bound(all,zmin)");
    s.line(format!(
        "variable kwz_shift equal 0.5*sqrt(v_kwz_dx^2+v_kwz_dy^2+v_kwz_dz^2)+{gap}"
    ));
    s.line(format!("variable kwz_sx equal xcm(all,x)+v_kwz_shift*({:.6})", dir.x));
    s.line(format!("variable kwz_sy equal xcm(all,y)+v_kwz_shift*({:.6})", dir.y));
    s.line(format!("variable kwz_sz equal xcm(all,z)+v_kwz_shift*({:.6})", dir.z));
    s.line(
        "change_box all x delta $(-2*v_kwz_shift) $(2*v_kwz_shift) \
         y delta $(-2*v_kwz_shift) $(2*v_kwz_shift) \
         z delta $(-2*v_kwz_shift) $(2*v_kwz_shift) units box",
    );
    s.line(format!(
        "read_data {} add append shift $(v_kwz_sx) $(v_kwz_sy) $(v_kwz_sz)",
        p(molecule)
    ));
    s.line(format!("write_data {}", p(&stage.outputs.primary)));
}

fn change_box(s: &mut Script, bounds: &BoxBounds) {
    s.line(format!(
        "change_box all x final {} {} y final {} {} z final {} {} units box",
        bounds.lo[0], bounds.hi[0], bounds.lo[1], bounds.hi[1], bounds.lo[2], bounds.hi[2]
    ));
}

fn prepare_system(s: &mut Script, stage: &StageDescriptor) {
    match &stage.operation {
        Operation::CutSolvent { bounds, .. } => {
            s.line(format!(
                "region kwz_outside block {} {} {} {} {} {} side out units box",
                bounds.lo[0], bounds.hi[0], bounds.lo[1], bounds.hi[1], bounds.lo[2], bounds.hi[2]
            ));
            s.line("delete_atoms region kwz_outside mol yes");
            change_box(s, bounds);
            s.blank();
        }
        Operation::Solvate {
            solvent_data,
            solvent_box,
            overlap,
        } => {
            let [cx, cy, cz] = solvent_box.center();
            s.line(format!(
                "displace_atoms all move $({cx}-xcm(all,x)) $({cy}-xcm(all,y)) $({cz}-xcm(all,z)) units box"
            ));
            change_box(s, solvent_box);
            s.line(format!("read_data {} add append", p(solvent_data)));
            if let Some(natoms) = stage.solvate_atoms {
                s.line(format!("group kwz_solvate id <= {natoms}"));
                s.line(format!("group kwz_solvent id > {natoms}"));
                s.line(format!(
                    "delete_atoms overlap {overlap} kwz_solvent kwz_solvate mol yes"
                ));
                s.line("group kwz_solvate delete");
                s.line("group kwz_solvent delete");
            }
            s.blank();
        }
        Operation::Requench {
            frame,
            molfile_plugins,
        } => {
            let plugins = molfile_plugins
                .as_deref()
                .map(|path| format!(" {}", p(path)))
                .unwrap_or_default();
            s.line(format!(
                "read_dump {} {} x y z box yes replace yes format molfile dcd{}",
                p(&frame.trajectory),
                frame.step,
                plugins
            ));
            if let Some(natoms) = stage.solvate_atoms {
                s.line(format!("group kwz_strip id > {natoms}"));
                s.line("delete_atoms group kwz_strip mol yes");
                s.line("group kwz_strip delete");
            }
            s.line("reset_timestep 0");
            if let Some(data) = &stage.outputs.data {
                s.line(format!("write_data {}", p(data)));
            }
            s.blank();
        }
        Operation::Dynamics { .. } | Operation::Dock { .. } => {}
    }
}

fn define_groups(s: &mut Script, stage: &StageDescriptor) {
    match stage.solvate_atoms {
        Some(natoms) => {
            s.line(format!("group solvate id <= {natoms}"));
            s.line("group solvent subtract all solvate");
        }
        None => s.line("group solvate union all"),
    }
    if let Some((name, expr)) = &stage.group {
        if name != "solvate" && name != "solvent" {
            s.line(format!("group {name} {expr}"));
        }
    }
    s.blank();
}

fn define_thermo(s: &mut Script, stage: &StageDescriptor, options: &ScriptOptions) {
    s.line("compute pe_atoms solvate pe/atom");
    s.line("compute pe_solvate_complete solvate reduce sum c_pe_atoms");
    s.line(format!(
        "compute aggregate_ids solvate cluster/atom {}",
        options.cluster_cutoff
    ));
    s.line("compute aggregate_clusters solvate chunk/atom c_aggregate_ids compress yes");
    let mut columns =
        String::from("step temp press pe ke c_pe_solvate_complete c_aggregate_clusters");
    if let Operation::Solvate { overlap, .. } = &stage.operation {
        s.line(format!(
            "compute void_coordination solvate coord/atom cutoff {overlap} group solvent"
        ));
        s.line("compute void_clashes solvate reduce sum c_void_coordination");
        columns.push_str(" c_void_clashes");
    }
    s.line(format!("thermo_style custom {columns}"));
    s.line("thermo_modify lost warn flush yes");
    s.line(format!("thermo {}", stage.log_every));
    s.blank();
}

fn ensemble_of(operation: &Operation) -> (Ensemble, Thermostat, bool, bool) {
    match operation {
        Operation::Dynamics {
            ensemble,
            thermostat,
            minimize,
            unwrap,
        } => (*ensemble, *thermostat, *minimize, *unwrap),
        Operation::CutSolvent {
            ensemble,
            thermostat,
            ..
        } => (*ensemble, *thermostat, true, false),
        Operation::Solvate { .. } => (Ensemble::Npt, Thermostat::Berendsen, true, false),
        Operation::Requench { .. } => (Ensemble::Nvt, Thermostat::Berendsen, true, true),
        Operation::Dock { .. } => (Ensemble::Nvt, Thermostat::Berendsen, false, false),
    }
}

fn dynamics(s: &mut Script, stage: &StageDescriptor, options: &ScriptOptions, resume: bool) {
    let (ensemble, thermostat, minimize, unwrap) = ensemble_of(&stage.operation);
    let group = stage.group_name();
    let ramp = &stage.ramp;
    let solvate_frozen = matches!(stage.operation, Operation::Solvate { .. });

    if solvate_frozen {
        s.line("fix kwz_freeze solvate setforce 0.0 0.0 0.0");
    }
    if !resume {
        s.line(format!(
            "velocity {group} create {} {} dist gaussian mom yes rot yes",
            ramp.tstart,
            stage.seed % 900_000_000 + 1
        ));
        if solvate_frozen {
            s.line("velocity solvate set 0.0 0.0 0.0");
        }
        if minimize {
            s.line(MINIMIZE);
        }
    }
    s.line("fix ic_prevention all momentum 100 linear 1 1 1 angular rescale");
    s.blank();

    if let Some(trajectory) = &stage.outputs.trajectory {
        s.line(format!(
            "dump kwz_traj all dcd {} {}",
            stage.log_every,
            p(trajectory)
        ));
        s.line(format!(
            "dump_modify kwz_traj unwrap {} append yes",
            if unwrap { "yes" } else { "no" }
        ));
    }
    if let Some(intermediate) = &stage.outputs.intermediate {
        s.line(format!(
            "restart {} {}",
            stage.log_every * RESTART_EVERY_LOGS,
            p(intermediate)
        ));
    }

    let damp_t = "$(100.0*dt)";
    let damp_p = "$(1000.0*dt)";
    let barostat = match (ramp.pstart, ramp.pstop) {
        (Some(ps), Some(pp)) if ensemble == Ensemble::Npt => Some((ps, pp)),
        _ => None,
    };
    match (thermostat, barostat) {
        (Thermostat::NoseHoover, None) => s.line(format!(
            "fix kwz_integrate {group} nvt temp {} {} {damp_t}",
            ramp.tstart, ramp.tstop
        )),
        (Thermostat::NoseHoover, Some((ps, pp))) => s.line(format!(
            "fix kwz_integrate {group} npt temp {} {} {damp_t} iso {ps} {pp} {damp_p}",
            ramp.tstart, ramp.tstop
        )),
        (Thermostat::Berendsen, barostat) => {
            s.line(format!("fix kwz_integrate {group} nve"));
            s.line(format!(
                "fix kwz_thermostat {group} temp/berendsen {} {} {damp_t}",
                ramp.tstart, ramp.tstop
            ));
            if let Some((ps, pp)) = barostat {
                s.line(format!(
                    "fix kwz_barostat {group} press/berendsen iso {ps} {pp} {damp_p}"
                ));
            }
        }
        (Thermostat::Langevin, barostat) => {
            match barostat {
                Some((ps, pp)) => s.line(format!(
                    "fix kwz_integrate {group} nph iso {ps} {pp} {damp_p}"
                )),
                None => s.line(format!("fix kwz_integrate {group} nve")),
            }
            s.line(format!(
                "fix kwz_thermostat {group} langevin {} {} {damp_t} {}",
                ramp.tstart,
                ramp.tstop,
                stage.seed % 900_000_000 + 7
            ));
        }
    }

    if let Some(timeout) = &options.timeout {
        s.line(format!("timer timeout {timeout} every {}", stage.log_every));
    }
    s.line(format!("run {} upto", stage.steps));

    let mut finish = Vec::new();
    if let Some(data) = &stage.outputs.data {
        if !matches!(stage.operation, Operation::Requench { .. }) {
            finish.push(format!("\"write_data {}\"", p(data)));
        }
    }
    finish.push(format!("\"write_restart {}\"", p(&stage.outputs.primary)));
    let otherwise = stage
        .outputs
        .intermediate
        .as_deref()
        .map(|path| format!(" else \"write_restart {}\"", p(path)))
        .unwrap_or_default();
    s.line(format!(
        "if \"$(step) >= {}\" then {}{}",
        stage.steps,
        finish.join(" "),
        otherwise
    ));
}
