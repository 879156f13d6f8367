use super::error::EngineError;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub type Clock = Box<dyn Fn() -> String + Send + Sync>;

/// Moves failed stage directories aside as `<dir>_failed_<timestamp>`.
pub struct FailureQuarantine {
    clock: Clock,
}

impl Default for FailureQuarantine {
    fn default() -> Self {
        Self::new()
    }
}

impl FailureQuarantine {
    pub fn new() -> Self {
        Self::with_clock(Box::new(|| {
            chrono::Local::now().format("%Y%m%d_%H%M%S_%6f").to_string()
        }))
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self { clock }
    }

    /// Renames every existing directory in `dirs` with one shared suffix and
    /// returns it. Missing directories are skipped. A stamp that would hit an
    /// existing quarantine target gets a numeric suffix instead.
    pub fn quarantine(&self, dirs: &[PathBuf]) -> Result<String, EngineError> {
        let base = (self.clock)();
        let mut stamp = base.clone();
        let mut bump = 0;
        while dirs.iter().any(|dir| target_for(dir, &stamp).exists()) {
            bump += 1;
            stamp = format!("{base}_{bump}");
        }

        for dir in dirs {
            if !dir.exists() {
                continue;
            }
            let target = target_for(dir, &stamp);
            fs::rename(dir, &target).map_err(|source| EngineError::Quarantine {
                path: dir.clone(),
                source,
            })?;
            info!(from = %dir.display(), to = %target.display(), "Quarantined failed stage directory");
        }

        if bump > 0 {
            warn!(stamp = %stamp, "Quarantine timestamp collided; suffixed");
        }
        Ok(stamp)
    }
}

pub fn target_for(dir: &Path, stamp: &str) -> PathBuf {
    let mut name = OsString::from(dir.file_name().unwrap_or(dir.as_os_str()));
    name.push("_failed_");
    name.push(stamp);
    dir.with_file_name(name)
}
