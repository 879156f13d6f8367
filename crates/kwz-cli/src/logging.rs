use crate::error::Result;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::Span;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self},
    prelude::*,
};

/// How this process should log, including its place in the worker group.
#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    pub verbosity: u8,
    pub quiet: bool,
    pub file: Option<PathBuf>,
    pub rank: usize,
    pub workers: usize,
}

impl LogSettings {
    fn level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::ERROR;
        }
        match self.verbosity {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    fn worker_file(&self) -> Option<PathBuf> {
        self.file
            .as_deref()
            .map(|path| rank_log_path(path, self.rank, self.workers))
    }
}

/// Installs the global subscriber and returns the span that tags every
/// event with the worker's rank. The caller keeps it entered for the
/// lifetime of the process.
pub fn setup_logging(settings: &LogSettings) -> Result<Span> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact();

    let subscriber = tracing_subscriber::registry()
        .with(settings.level())
        .with(stderr_layer);

    match settings.worker_file() {
        Some(path) => {
            let file_layer = fmt::layer()
                .with_writer(File::create(&path)?)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_target(true);
            subscriber.with(file_layer).init();
        }
        None => subscriber.init(),
    }

    Ok(worker_span(settings.rank, settings.workers))
}

/// `worker{rank=N}` around everything a group member logs; nothing for a
/// single process. Error level so that it survives `--quiet`.
fn worker_span(rank: usize, workers: usize) -> Span {
    if workers > 1 {
        tracing::error_span!("worker", rank)
    } else {
        Span::none()
    }
}

/// Per-worker log file: `run.log` becomes `run.rank2.log` in a group of
/// several workers, so ranks never write to the same file.
fn rank_log_path(path: &Path, rank: usize, size: usize) -> PathBuf {
    if size <= 1 {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}.rank{rank}.{}", ext.to_string_lossy()),
        None => format!("{stem}.rank{rank}"),
    };
    path.with_file_name(name)
}
