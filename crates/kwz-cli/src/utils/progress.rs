use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use kwzflow::engine::progress::{Progress, ProgressCallback, StageOutcome};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 80;

/// Renders workflow progress on stderr: a bar over the cycles of a run, or a
/// spinner for a single standalone stage.
#[derive(Clone)]
pub struct CliProgressHandler {
    pb: Arc<Mutex<ProgressBar>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        let pb = ProgressBar::new(0)
            .with_style(Self::spinner_style())
            .with_message("Initializing...");
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb.disable_steady_tick();
        pb.finish_and_clear();

        Self {
            pb: Arc::new(Mutex::new(pb)),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let pb_clone = self.pb.clone();

        Box::new(move |progress: Progress| {
            let Ok(pb_guard) = pb_clone.lock() else {
                warn!("Progress bar mutex was poisoned. Cannot update progress.");
                return;
            };

            match progress {
                Progress::RunStart { first, end } => {
                    pb_guard.disable_steady_tick();
                    pb_guard.reset();
                    pb_guard.set_length(end.saturating_sub(first) as u64);
                    pb_guard.set_position(0);
                    pb_guard.set_style(Self::bar_style());
                    pb_guard.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
                }
                Progress::CycleStart { cycle } => {
                    pb_guard.set_prefix(format!("cycle {cycle}"));
                }
                Progress::StageStart { name } => {
                    if pb_guard.is_finished() {
                        pb_guard.reset();
                        pb_guard.set_length(0);
                        pb_guard.set_style(Self::spinner_style());
                        pb_guard.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
                    }
                    pb_guard.set_message(name);
                }
                Progress::StageFinish { name, outcome } => {
                    let line = match outcome {
                        StageOutcome::Completed => format!("✓ {name}"),
                        StageOutcome::Reused => format!("↺ {name} (reused)"),
                        StageOutcome::Failed => format!("✗ {name} failed"),
                    };
                    if pb_guard.length() == Some(0) {
                        pb_guard.disable_steady_tick();
                        pb_guard.finish_with_message(line);
                    } else {
                        pb_guard.println(format!("  {line}"));
                    }
                }
                Progress::CycleFinish { .. } => {
                    pb_guard.inc(1);
                }
                Progress::Message(msg) => {
                    if !pb_guard.is_finished() {
                        pb_guard.println(format!("  {}", msg));
                    } else {
                        pb_guard.set_message(msg);
                    }
                }
            }
        })
    }

    /// Stops the ticker and leaves the final state on screen.
    pub fn finish(&self) {
        let Ok(pb_guard) = self.pb.lock() else {
            return;
        };
        if !pb_guard.is_finished() {
            pb_guard.disable_steady_tick();
            pb_guard.finish_with_message("✓ Done");
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .expect("Failed to create spinner style template")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{spinner:.green} {prefix:<10} [{bar:40.cyan/blue}] {pos}/{len} cycles {msg} ({elapsed})",
        )
        .expect("Failed to create bar style template")
        .with_key(
            "elapsed",
            |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                let secs = state.elapsed().as_secs();
                let _ = write!(w, "{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60);
            },
        )
        .progress_chars("##-")
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn handler_initializes_in_a_clean_state() {
        let handler = CliProgressHandler::new();
        let pb = handler.pb.lock().unwrap();
        assert_eq!(pb.length(), Some(0));
        assert!(pb.is_finished());
    }

    #[test]
    fn callback_tracks_cycles_of_a_run() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();

        callback(Progress::RunStart { first: 2, end: 5 });
        {
            let pb = handler.pb.lock().unwrap();
            assert_eq!(pb.length(), Some(3));
            assert_eq!(pb.position(), 0);
            assert!(!pb.is_finished());
        }

        callback(Progress::CycleStart { cycle: 2 });
        callback(Progress::StageStart {
            name: "quench_2".to_string(),
        });
        {
            let pb = handler.pb.lock().unwrap();
            assert_eq!(pb.prefix(), "cycle 2");
            assert_eq!(pb.message(), "quench_2");
        }

        callback(Progress::StageFinish {
            name: "quench_2".to_string(),
            outcome: StageOutcome::Completed,
        });
        callback(Progress::CycleFinish { cycle: 2 });
        {
            let pb = handler.pb.lock().unwrap();
            assert_eq!(pb.position(), 1);
            assert!(!pb.is_finished());
        }

        handler.finish();
        let pb = handler.pb.lock().unwrap();
        assert!(pb.is_finished());
        assert_eq!(pb.message(), "✓ Done");
    }

    #[test]
    fn standalone_stage_uses_spinner() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();

        callback(Progress::StageStart {
            name: "npt".to_string(),
        });
        {
            let pb = handler.pb.lock().unwrap();
            assert!(!pb.is_finished());
            assert_eq!(pb.message(), "npt");
        }

        callback(Progress::StageFinish {
            name: "npt".to_string(),
            outcome: StageOutcome::Reused,
        });
        let pb = handler.pb.lock().unwrap();
        assert!(pb.is_finished());
        assert_eq!(pb.message(), "↺ npt (reused)");
    }

    #[test]
    fn callback_is_thread_safe() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();

        thread::spawn(move || {
            callback(Progress::StageStart {
                name: "Thread Test".to_string(),
            });
            callback(Progress::StageFinish {
                name: "Thread Test".to_string(),
                outcome: StageOutcome::Failed,
            });
        })
        .join()
        .unwrap();

        let pb = handler.pb.lock().unwrap();
        assert!(pb.is_finished());
        assert_eq!(pb.message(), "✗ Thread Test failed");
    }
}
