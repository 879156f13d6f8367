use super::stage::StageKind;
use std::path::{Path, PathBuf};

/// File set of one engine run inside a stage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFiles {
    pub restart: PathBuf,
    pub intermediate: PathBuf,
    pub trajectory: PathBuf,
    pub log: PathBuf,
}

impl RunFiles {
    pub fn with_stem(dir: &Path, stem: &str) -> Self {
        Self {
            restart: dir.join(format!("{stem}_out.lmprst")),
            intermediate: dir.join(format!("{stem}_tmp.lmprst")),
            trajectory: dir.join(format!("{stem}.dcd")),
            log: dir.join(format!("{stem}.lmplog")),
        }
    }
}

/// Sub-runs of the anneal stage that share the `anneal_N` directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnealStep {
    RelaxCut,
    Void,
    RelaxSolvent,
    Heat,
}

impl AnnealStep {
    pub fn stem(self) -> &'static str {
        match self {
            AnnealStep::RelaxCut => "cut_solv",
            AnnealStep::Void => "void_solv",
            AnnealStep::RelaxSolvent => "relax_solv",
            AnnealStep::Heat => "equil_anneal",
        }
    }
}

/// Canonical paths of one aggregation cycle.
///
/// Every path is a pure function of the working root, the cycle index and
/// the stage, so two cycles never share a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleLayout {
    root: PathBuf,
    cycle: usize,
}

impl CycleLayout {
    pub fn new(root: impl Into<PathBuf>, cycle: usize) -> Self {
        Self {
            root: root.into(),
            cycle,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cycle(&self) -> usize {
        self.cycle
    }

    pub fn previous(&self) -> Option<CycleLayout> {
        self.cycle
            .checked_sub(1)
            .map(|cycle| CycleLayout::new(self.root.clone(), cycle))
    }

    pub fn stage_dir(&self, kind: StageKind) -> PathBuf {
        self.root.join(format!("{}_{}", kind.name(), self.cycle))
    }

    /// Stage directories of `kinds`, in the given order.
    pub fn stage_dirs(&self, kinds: &[StageKind]) -> Vec<PathBuf> {
        kinds.iter().map(|&kind| self.stage_dir(kind)).collect()
    }

    pub fn sysprep_out(&self) -> PathBuf {
        self.stage_dir(StageKind::Sysprep)
            .join(format!("sysprep_out_{}.lmpdat", self.cycle))
    }

    pub fn sysprep_log(&self) -> PathBuf {
        self.stage_dir(StageKind::Sysprep)
            .join(format!("sysprep_{}.lmplog", self.cycle))
    }

    pub fn quench_files(&self) -> RunFiles {
        let dir = self.stage_dir(StageKind::Quench);
        let n = self.cycle;
        RunFiles {
            restart: dir.join(format!("quench_out_{n}.lmprst")),
            intermediate: dir.join(format!("quench_rst_{n}.lmprst")),
            trajectory: dir.join(format!("quench_{n}.dcd")),
            log: dir.join(format!("quench_{n}.lmplog")),
        }
    }

    pub fn anneal_files(&self, step: AnnealStep) -> RunFiles {
        RunFiles::with_stem(
            &self.stage_dir(StageKind::Anneal),
            &format!("{}_{}", step.stem(), self.cycle),
        )
    }

    /// Files of the `segment`-th productive annealing run.
    pub fn anneal_segment_files(&self, segment: usize) -> RunFiles {
        RunFiles::with_stem(
            &self.stage_dir(StageKind::Anneal),
            &format!("{}_anneal_{}", segment, self.cycle),
        )
    }

    /// Relaxed solvent box written by the relax-cut run.
    pub fn cut_solvent_data(&self) -> PathBuf {
        self.stage_dir(StageKind::Anneal)
            .join(format!("cut_solv_{}_out.lmpdat", self.cycle))
    }

    /// Solvate plus solvent after void creation.
    pub fn solution_data(&self) -> PathBuf {
        self.stage_dir(StageKind::Anneal)
            .join(format!("solution_{}_out.lmpdat", self.cycle))
    }

    pub fn anneal_out(&self) -> PathBuf {
        self.stage_dir(StageKind::Anneal)
            .join(format!("anneal_{}_out.lmprst", self.cycle))
    }

    pub fn requench_files(&self) -> RunFiles {
        RunFiles::with_stem(
            &self.stage_dir(StageKind::Requench),
            &format!("requench_{}", self.cycle),
        )
    }

    /// Requench input: the selected annealing frame without solvent.
    pub fn requench_data(&self) -> PathBuf {
        self.stage_dir(StageKind::Requench)
            .join(format!("requench_{}.lmpdat", self.cycle))
    }

    pub fn frame_record(&self) -> PathBuf {
        self.stage_dir(StageKind::Requench)
            .join(format!("requench_{}_frame.toml", self.cycle))
    }

    /// The file whose existence marks `kind` as complete for this cycle.
    pub fn canonical_output(&self, kind: StageKind) -> PathBuf {
        match kind {
            StageKind::Sysprep => self.sysprep_out(),
            StageKind::Quench => self.quench_files().restart,
            StageKind::Anneal => self.anneal_out(),
            StageKind::Requench => self.requench_files().restart,
        }
    }
}

/// Splits a stage directory name such as `quench_12` into its stage and cycle.
///
/// Quarantined directories (`quench_12_failed_...`) and unrelated names yield `None`.
pub fn parse_stage_dir(name: &str) -> Option<(StageKind, usize)> {
    let (prefix, suffix) = name.split_once('_')?;
    let kind = StageKind::from_name(prefix)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok().map(|cycle| (kind, cycle))
}

/// Splits a productive annealing log name such as `2_anneal_7.lmplog` into
/// its segment index, provided it belongs to `cycle`.
pub fn parse_anneal_segment_log(name: &str, cycle: usize) -> Option<usize> {
    let stem = name.strip_suffix(".lmplog")?;
    let (segment, rest) = stem.split_once('_')?;
    let rest_cycle = rest.strip_prefix("anneal_")?;
    if rest_cycle.parse::<usize>().ok()? != cycle {
        return None;
    }
    segment.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_files_follow_cycle_naming() {
        let layout = CycleLayout::new("/work", 3);
        assert_eq!(
            layout.sysprep_out(),
            PathBuf::from("/work/sysprep_3/sysprep_out_3.lmpdat")
        );
        let quench = layout.quench_files();
        assert_eq!(quench.restart, PathBuf::from("/work/quench_3/quench_out_3.lmprst"));
        assert_eq!(quench.trajectory, PathBuf::from("/work/quench_3/quench_3.dcd"));
        assert_eq!(quench.log, PathBuf::from("/work/quench_3/quench_3.lmplog"));
        assert_eq!(
            layout.anneal_out(),
            PathBuf::from("/work/anneal_3/anneal_3_out.lmprst")
        );
        let requench = layout.requench_files();
        assert_eq!(
            requench.restart,
            PathBuf::from("/work/requench_3/requench_3_out.lmprst")
        );
        assert_eq!(requench.trajectory, PathBuf::from("/work/requench_3/requench_3.dcd"));
        assert_eq!(requench.log, PathBuf::from("/work/requench_3/requench_3.lmplog"));
    }

    #[test]
    fn anneal_sub_runs_share_the_anneal_directory() {
        let layout = CycleLayout::new("/work", 0);
        let heat = layout.anneal_files(AnnealStep::Heat);
        assert_eq!(
            heat.restart,
            PathBuf::from("/work/anneal_0/equil_anneal_0_out.lmprst")
        );
        let segment = layout.anneal_segment_files(2);
        assert_eq!(segment.log, PathBuf::from("/work/anneal_0/2_anneal_0.lmplog"));
        assert_eq!(segment.trajectory, PathBuf::from("/work/anneal_0/2_anneal_0.dcd"));
    }

    #[test]
    fn paths_never_collide_across_cycles() {
        let a = CycleLayout::new("/work", 1);
        let b = CycleLayout::new("/work", 11);
        for kind in StageKind::ALL {
            assert_ne!(a.canonical_output(kind), b.canonical_output(kind));
            assert_ne!(a.stage_dir(kind), b.stage_dir(kind));
        }
    }

    #[test]
    fn previous_of_first_cycle_is_none() {
        assert!(CycleLayout::new("/work", 0).previous().is_none());
        assert_eq!(
            CycleLayout::new("/work", 5).previous().map(|p| p.cycle()),
            Some(4)
        );
    }

    #[test]
    fn parse_stage_dir_accepts_only_active_directories() {
        assert_eq!(parse_stage_dir("sysprep_0"), Some((StageKind::Sysprep, 0)));
        assert_eq!(parse_stage_dir("requench_42"), Some((StageKind::Requench, 42)));
        assert_eq!(parse_stage_dir("quench_3_failed_20240101_120000_000001"), None);
        assert_eq!(parse_stage_dir("anneal_"), None);
        assert_eq!(parse_stage_dir("heat_3"), None);
        assert_eq!(parse_stage_dir("notes"), None);
    }

    #[test]
    fn parse_anneal_segment_log_filters_by_cycle() {
        assert_eq!(parse_anneal_segment_log("0_anneal_7.lmplog", 7), Some(0));
        assert_eq!(parse_anneal_segment_log("12_anneal_7.lmplog", 7), Some(12));
        assert_eq!(parse_anneal_segment_log("1_anneal_8.lmplog", 7), None);
        assert_eq!(parse_anneal_segment_log("equil_anneal_7.lmplog", 7), None);
        assert_eq!(parse_anneal_segment_log("0_anneal_7.dcd", 7), None);
    }
}
