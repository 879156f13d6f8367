/// Coarse workflow events for user-facing progress display.
///
/// Only the coordinator reports progress; workers run with a silent reporter.
#[derive(Debug, Clone)]
pub enum Progress {
    RunStart { first: usize, end: usize },
    CycleStart { cycle: usize },
    CycleFinish { cycle: usize },

    StageStart { name: String },
    StageFinish { name: String, outcome: StageOutcome },

    Message(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    Reused,
    Failed,
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }

    pub fn message(&self, text: impl Into<String>) {
        self.report(Progress::Message(text.into()));
    }
}
