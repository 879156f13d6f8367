use crate::cli::StatusArgs;
use crate::error::Result;
use kwzflow::core::models::layout::CycleLayout;
use kwzflow::core::models::stage::StageKind;
use kwzflow::engine::sequencer::{CycleSequencer, CycleStatus};
use kwzflow::engine::state::CycleStage;
use tracing::info;

pub fn run(args: StatusArgs) -> Result<()> {
    let sequencer = CycleSequencer::new(&args.root);
    let cycles = sequencer.survey()?;
    let resume_cycle = sequencer.resume_cycle()?;
    let resume_stage = CycleSequencer::resume_stage(&CycleLayout::new(&args.root, resume_cycle));
    info!(
        root = %args.root.display(),
        cycles = cycles.len(),
        resume_cycle,
        "Surveyed working directory"
    );

    print!("{}", render_status(&cycles, resume_cycle, resume_stage));
    Ok(())
}

fn render_status(cycles: &[CycleStatus], resume_cycle: usize, resume_stage: CycleStage) -> String {
    let mut out = String::new();
    if cycles.is_empty() {
        out.push_str("No cycles found.\n");
    }
    for status in cycles {
        out.push_str(&cycle_row(status));
    }
    let next = resume_stage.kind().map_or("done", StageKind::name);
    out.push_str(&format!("Next: cycle {resume_cycle} at {next}\n"));
    out
}

fn cycle_row(status: &CycleStatus) -> String {
    let marks: Vec<&str> = StageKind::ALL
        .iter()
        .map(|kind| {
            if status.completed.contains(kind) {
                kind.name()
            } else {
                "-"
            }
        })
        .collect();
    let quarantined = match status.quarantined {
        0 => String::new(),
        n => format!("  ({n} quarantined)"),
    };
    format!("cycle {:>4}  {:<40}{quarantined}\n", status.cycle, marks.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_lists_stages_and_resume_point() {
        let cycles = vec![
            CycleStatus {
                cycle: 0,
                completed: StageKind::ALL.to_vec(),
                quarantined: 0,
            },
            CycleStatus {
                cycle: 1,
                completed: vec![StageKind::Sysprep],
                quarantined: 2,
            },
        ];

        let text = render_status(&cycles, 1, CycleStage::Quench);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("sysprep quench anneal requench"));
        assert!(lines[1].contains("sysprep - - -"));
        assert!(lines[1].contains("(2 quarantined)"));
        assert_eq!(lines[2], "Next: cycle 1 at quench");
    }

    #[test]
    fn row_omits_quarantine_note_when_clean() {
        let row = cycle_row(&CycleStatus {
            cycle: 12,
            completed: vec![StageKind::Sysprep, StageKind::Quench],
            quarantined: 0,
        });
        assert!(row.starts_with("cycle   12  sysprep quench - -"));
        assert!(!row.contains("quarantined"));
        assert!(row.ends_with('\n'));
    }

    #[test]
    fn render_empty_tree() {
        let text = render_status(&[], 0, CycleStage::Sysprep);
        assert_eq!(text, "No cycles found.\nNext: cycle 0 at sysprep\n");
    }

    #[test]
    fn status_of_missing_root_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let args = StatusArgs {
            root: dir.path().join("nothing-here"),
        };
        assert!(run(args).is_ok());
    }
}
