use crate::core::models::layout::CycleLayout;
use crate::core::models::stage::{StageDescriptor, StageKind};
use std::path::Path;

/// Completion check used for idempotent resumption.
///
/// A stage is complete exactly when its canonical output file exists. The
/// content is never inspected, so callers must not read integrity into a
/// positive answer. Unreadable paths count as incomplete.
pub struct StageGate;

impl StageGate {
    pub fn is_complete(stage: &StageDescriptor) -> bool {
        Self::output_exists(stage.canonical_output())
    }

    pub fn output_exists(path: &Path) -> bool {
        path.is_file()
    }

    pub fn stage_complete(layout: &CycleLayout, kind: StageKind) -> bool {
        Self::output_exists(&layout.canonical_output(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn completion_follows_canonical_file_presence() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CycleLayout::new(dir.path(), 2);
        assert!(!StageGate::stage_complete(&layout, StageKind::Quench));

        fs::create_dir_all(layout.stage_dir(StageKind::Quench)).unwrap();
        fs::write(layout.quench_files().log, "partial").unwrap();
        assert!(!StageGate::stage_complete(&layout, StageKind::Quench));

        fs::write(layout.quench_files().restart, "").unwrap();
        assert!(StageGate::stage_complete(&layout, StageKind::Quench));
    }

    #[test]
    fn directory_at_output_path_is_not_complete() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CycleLayout::new(dir.path(), 0);
        fs::create_dir_all(layout.sysprep_out()).unwrap();
        assert!(!StageGate::stage_complete(&layout, StageKind::Sysprep));
    }
}
