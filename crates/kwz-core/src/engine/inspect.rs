use super::config::AnalysisConfig;
use super::error::EngineError;
use crate::core::io::lmplog::read_series;
use std::path::Path;
use tracing::debug;

/// Structural checks on engine output, evaluated by the coordinator only.
pub trait AggregateInspector {
    /// Whether the solvate still forms a single aggregate at the end of the
    /// run that wrote `log`.
    fn aggregate_intact(&self, log: &Path) -> Result<bool, EngineError>;

    /// Whether the void-creation run that wrote `log` ended without solvent
    /// atoms inside the solvate.
    fn voids_clear(&self, log: &Path) -> Result<bool, EngineError>;
}

/// Reads the cluster and clash counts the stage scripts print as thermo columns.
pub struct LogInspector {
    cluster_column: String,
    clash_column: String,
}

impl LogInspector {
    pub fn new(analysis: &AnalysisConfig) -> Self {
        Self {
            cluster_column: analysis.cluster_column.clone(),
            clash_column: analysis.clash_column.clone(),
        }
    }

    fn last(&self, log: &Path, column: &str) -> Result<f64, EngineError> {
        let series = read_series(log, column)?;
        series
            .last()
            .copied()
            .ok_or_else(|| EngineError::Internal(format!("'{column}' has no rows in {}", log.display())))
    }
}

impl AggregateInspector for LogInspector {
    fn aggregate_intact(&self, log: &Path) -> Result<bool, EngineError> {
        let clusters = self.last(log, &self.cluster_column)?;
        debug!(log = %log.display(), clusters, "Checked aggregate");
        Ok(clusters.round() as i64 == 1)
    }

    fn voids_clear(&self, log: &Path) -> Result<bool, EngineError> {
        let clashes = self.last(log, &self.clash_column)?;
        debug!(log = %log.display(), clashes, "Checked voids");
        Ok(clashes.round() as i64 == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_log(dir: &Path, rows: &[(u64, f64, f64)]) -> std::path::PathBuf {
        let mut text = String::from(
            "Per MPI rank memory allocation (min/avg/max) = 1 | 1 | 1 Mbytes\n\
             Step c_pe_solvate_complete c_aggregate_clusters c_void_clashes\n",
        );
        for (step, clusters, clashes) in rows {
            text.push_str(&format!("{step} -10.0 {clusters} {clashes}\n"));
        }
        text.push_str("Loop time of 1.0 on 1 procs\n");
        let path = dir.join("run.lmplog");
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn aggregate_is_judged_by_final_cluster_count() {
        let dir = tempfile::tempdir().unwrap();
        let inspector = LogInspector::new(&AnalysisConfig::default());

        let log = write_log(dir.path(), &[(0, 2.0, 0.0), (1000, 1.0, 0.0)]);
        assert!(inspector.aggregate_intact(&log).unwrap());

        let log = write_log(dir.path(), &[(0, 1.0, 0.0), (1000, 2.0, 0.0)]);
        assert!(!inspector.aggregate_intact(&log).unwrap());
    }

    #[test]
    fn voids_are_clear_without_final_clashes() {
        let dir = tempfile::tempdir().unwrap();
        let inspector = LogInspector::new(&AnalysisConfig::default());

        let log = write_log(dir.path(), &[(0, 1.0, 4.0), (1000, 1.0, 0.0)]);
        assert!(inspector.voids_clear(&log).unwrap());

        let log = write_log(dir.path(), &[(0, 1.0, 0.0), (1000, 1.0, 3.0)]);
        assert!(!inspector.voids_clear(&log).unwrap());
    }

    #[test]
    fn missing_log_is_an_environment_failure() {
        let dir = tempfile::tempdir().unwrap();
        let inspector = LogInspector::new(&AnalysisConfig::default());
        assert!(inspector.aggregate_intact(&dir.path().join("absent.lmplog")).is_err());
    }
}
