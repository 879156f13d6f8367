use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

const BLOCK_START_MARKERS: [&str; 2] = ["Memory usage per processor", "Per MPI rank memory allocation"];
const BLOCK_END_MARKERS: [&str; 2] = ["Loop time of", "WARNING: Wall time limit reached"];
const WALL_TIME_MARKER: &str = "WARNING: Wall time limit reached";

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Failed to read thermo log '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("I/O error: {0}")]
    Read(#[from] io::Error),
    #[error("Column '{column}' not found in thermo log '{path}'")]
    MissingColumn { column: String, path: PathBuf },
    #[error("Thermo log '{0}' contains no thermo output")]
    Empty(PathBuf),
}

/// One `run`/`minimize` worth of thermo output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThermoBlock {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl ThermoBlock {
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

/// Thermodynamic output of a LAMMPS log file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LmpLog {
    pub blocks: Vec<ThermoBlock>,
    wall_time_reached: bool,
}

impl LmpLog {
    pub fn read_from(reader: &mut impl BufRead) -> Result<Self, LogError> {
        let mut log = LmpLog::default();
        let mut current: Option<ThermoBlock> = None;
        let mut expect_header = false;

        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();

            if trimmed.starts_with(WALL_TIME_MARKER) {
                log.wall_time_reached = true;
            }

            if BLOCK_START_MARKERS.iter().any(|m| trimmed.starts_with(m)) {
                if let Some(block) = current.take() {
                    log.blocks.push(block);
                }
                expect_header = true;
                continue;
            }

            if expect_header {
                expect_header = false;
                current = Some(ThermoBlock {
                    columns: trimmed.split_whitespace().map(str::to_string).collect(),
                    rows: Vec::new(),
                });
                continue;
            }

            if BLOCK_END_MARKERS.iter().any(|m| trimmed.starts_with(m)) {
                if let Some(block) = current.take() {
                    log.blocks.push(block);
                }
                continue;
            }

            if let Some(block) = current.as_mut() {
                if let Some(row) = parse_row(trimmed, block.columns.len()) {
                    block.rows.push(row);
                }
            }
        }

        if let Some(block) = current.take() {
            log.blocks.push(block);
        }
        Ok(log)
    }

    pub fn read_from_path(path: &Path) -> Result<Self, LogError> {
        let file = File::open(path).map_err(|source| LogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::read_from(&mut BufReader::new(file))
    }

    /// Values of `column` across every block that carries it, in file order.
    pub fn series(&self, column: &str) -> Option<Vec<f64>> {
        let mut found = false;
        let mut values = Vec::new();
        for block in &self.blocks {
            if let Some(idx) = block.column_index(column) {
                found = true;
                values.extend(block.rows.iter().map(|row| row[idx]));
            }
        }
        found.then_some(values)
    }

    pub fn last_value(&self, column: &str) -> Option<f64> {
        self.series(column).and_then(|values| values.last().copied())
    }

    /// Whether the engine stopped because its `timer timeout` budget ran out.
    pub fn wall_time_reached(&self) -> bool {
        self.wall_time_reached
    }
}

fn parse_row(line: &str, width: usize) -> Option<Vec<f64>> {
    if width == 0 {
        return None;
    }
    let values: Vec<f64> = line
        .split_whitespace()
        .map(str::parse::<f64>)
        .collect::<Result<_, _>>()
        .ok()?;
    (values.len() == width).then_some(values)
}

/// Reads `column` from `path`, failing when the file or the column is absent.
pub fn read_series(path: &Path, column: &str) -> Result<Vec<f64>, LogError> {
    let log = LmpLog::read_from_path(path)?;
    if log.blocks.is_empty() {
        return Err(LogError::Empty(path.to_path_buf()));
    }
    log.series(column).ok_or_else(|| LogError::MissingColumn {
        column: column.to_string(),
        path: path.to_path_buf(),
    })
}
