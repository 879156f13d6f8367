use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const CYCLE_LOG_NAME: &str = "kwz.log";

/// Append-only, line-oriented record of cycle starts and selected frames.
#[derive(Debug, Clone)]
pub struct CycleLog {
    path: PathBuf,
}

impl CycleLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_root(root: &Path) -> Self {
        Self::new(root.join(CYCLE_LOG_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }

    pub fn cycle_started(&self, cycle: usize) -> io::Result<()> {
        self.append(&format!("Cycle: {cycle}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_without_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let log = CycleLog::in_root(dir.path());
        log.cycle_started(0).unwrap();
        log.append("anneal_0/0_anneal_0.dcd, 12, -431.5").unwrap();
        log.cycle_started(1).unwrap();
        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(
            content,
            "Cycle: 0\nanneal_0/0_anneal_0.dcd, 12, -431.5\nCycle: 1\n"
        );
    }
}
