use super::error::EngineError;
use crate::core::io::lmplog::{LmpLog, LogError};
use crate::core::models::layout::{CycleLayout, RunFiles, parse_anneal_segment_log};
use crate::core::models::stage::{FrameRef, StageKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const STEP_COLUMN: &str = "Step";

/// Trajectory frame with the most favorable tracked energy of a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestFrame {
    pub trajectory: PathBuf,
    pub frame: usize,
    pub step: u64,
    pub value: f64,
}

impl BestFrame {
    /// Reads a persisted selection; `None` if none was stored yet.
    pub fn load(path: &Path) -> Result<Option<Self>, EngineError> {
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        toml::from_str(&text)
            .map(Some)
            .map_err(|e| EngineError::FrameRecord {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }

    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let text = toml::to_string(self).map_err(|e| EngineError::FrameRecord {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        fs::write(path, text).map_err(|e| EngineError::io(path, e))
    }

    pub fn frame_ref(&self) -> FrameRef {
        FrameRef {
            trajectory: self.trajectory.clone(),
            frame: self.frame,
            step: self.step,
        }
    }

    /// Line recorded in the cycle log.
    pub fn log_line(&self) -> String {
        format!("{}, {}, {}", self.trajectory.display(), self.frame, self.value)
    }
}

fn discarded(len: usize, window_percent: f64) -> usize {
    let keep_share = window_percent.clamp(0.0, 100.0) / 100.0;
    ((len as f64) * (1.0 - keep_share)).floor() as usize
}

/// Minimum of `series` over its trailing `window_percent` share.
///
/// The leading `100 - window_percent` percent of entries are ignored. NaN
/// entries never win; ties keep the earliest entry.
pub fn best_in_series(series: &[f64], window_percent: f64) -> Option<(usize, f64)> {
    let start = discarded(series.len(), window_percent);
    series
        .iter()
        .enumerate()
        .skip(start)
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (idx, &value)| match best {
            Some((_, current)) if value >= current => best,
            _ => Some((idx, value)),
        })
}

/// Whether the trailing window of `series` has stopped drifting: the means
/// of its two halves must differ by no more than one standard deviation of
/// the window.
pub fn is_equilibrated(series: &[f64], window_percent: f64) -> bool {
    let tail = &series[discarded(series.len(), window_percent)..];
    if tail.len() < 4 {
        return false;
    }
    let mean = |values: &[f64]| values.iter().sum::<f64>() / values.len() as f64;
    let (first, second) = tail.split_at(tail.len() / 2);
    let overall = mean(tail);
    let variance = tail.iter().map(|v| (v - overall).powi(2)).sum::<f64>() / tail.len() as f64;
    (mean(first) - mean(second)).abs() <= variance.sqrt()
}

/// Scans (log, trajectory) pairs and returns the global best frame over the
/// trailing window of each log.
pub fn find_best_frame(
    runs: &[(PathBuf, PathBuf)],
    column: &str,
    window_percent: f64,
) -> Result<Option<BestFrame>, EngineError> {
    let mut best: Option<BestFrame> = None;
    for (log_path, trajectory) in runs {
        let log = LmpLog::read_from_path(log_path)?;
        let series = log.series(column).ok_or_else(|| LogError::MissingColumn {
            column: column.to_string(),
            path: log_path.clone(),
        })?;
        let Some((frame, value)) = best_in_series(&series, window_percent) else {
            continue;
        };
        if best.as_ref().is_some_and(|b| value >= b.value) {
            continue;
        }
        let step = log
            .series(STEP_COLUMN)
            .and_then(|steps| steps.get(frame).copied())
            .map_or(frame as u64, |s| s as u64);
        best = Some(BestFrame {
            trajectory: trajectory.clone(),
            frame,
            step,
            value,
        });
    }
    Ok(best)
}

/// Productive annealing segments of the cycle found on disk, in run order.
pub fn anneal_segments(layout: &CycleLayout) -> Result<Vec<RunFiles>, EngineError> {
    let dir = layout.stage_dir(StageKind::Anneal);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(EngineError::io(&dir, e)),
    };

    let mut segments: Vec<usize> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| parse_anneal_segment_log(name, layout.cycle()))
        })
        .collect();
    segments.sort_unstable();

    Ok(segments
        .into_iter()
        .map(|k| layout.anneal_segment_files(k))
        .filter(|files| files.trajectory.is_file())
        .collect())
}

/// Selects the best frame of all annealing segments of the cycle.
pub fn select_anneal_frame(
    layout: &CycleLayout,
    column: &str,
    window_percent: f64,
) -> Result<BestFrame, EngineError> {
    let runs: Vec<(PathBuf, PathBuf)> = anneal_segments(layout)?
        .into_iter()
        .map(|files| (files.log, files.trajectory))
        .collect();
    find_best_frame(&runs, column, window_percent)?
        .ok_or_else(|| EngineError::NoFrame(layout.stage_dir(StageKind::Anneal)))
}
