use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use osanalysis::engine::progress::{Progress, ProgressCallback};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 100;

struct Display {
    bar: ProgressBar,
    /// Iteration the current batch belongs to, shown as the bar prefix.
    iteration: Option<usize>,
    /// Jobs finished across every batch of the run.
    jobs_done: u64,
}

impl Display {
    fn start_phase(&mut self, name: &str) {
        self.bar.reset();
        self.bar.set_length(0);
        self.bar.set_style(spinner_style());
        self.bar.set_prefix("");
        self.bar.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
        self.bar.set_message(name.to_string());
    }

    fn start_batch(&mut self, jobs: u64) {
        self.bar.disable_steady_tick();
        self.bar.reset();
        self.bar.set_style(batch_style());
        self.bar.set_length(jobs);
        self.bar.set_prefix(match self.iteration {
            Some(iteration) => format!("iter {:>3}", iteration),
            None => "queued".to_string(),
        });
        self.bar.set_message("DataPoints");
    }

    fn finish_batch(&mut self) {
        let total = self.bar.length().unwrap_or(0);
        self.bar.set_position(total);
        self.bar.finish();
    }

    fn note(&self, line: String) {
        if self.bar.is_finished() || self.bar.is_hidden() {
            eprintln!("{}", line);
        } else {
            self.bar.println(line);
        }
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn batch_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:.bold} {msg} [{bar:40.cyan/blue}] {pos}/{len} ({elapsed})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .with_key(
            "elapsed",
            |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                let _ = write!(w, "{:.0}s", state.elapsed().as_secs_f64());
            },
        )
        .progress_chars("=> ")
}

/// Renders analysis progress on stderr: a spinner per phase and one bar per batch of jobs.
#[derive(Clone)]
pub struct CliProgressHandler {
    display: Arc<Mutex<Display>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    fn with_draw_target(target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), target).with_style(spinner_style());
        bar.finish_and_clear();
        Self {
            display: Arc::new(Mutex::new(Display {
                bar,
                iteration: None,
                jobs_done: 0,
            })),
        }
    }

    /// Total number of jobs that have finished so far.
    pub fn jobs_done(&self) -> u64 {
        self.display.lock().map(|d| d.jobs_done).unwrap_or(0)
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let display = Arc::clone(&self.display);

        Box::new(move |progress: Progress| {
            let Ok(mut display) = display.lock() else {
                warn!("Progress display mutex was poisoned. Cannot update progress.");
                return;
            };

            match progress {
                Progress::PhaseStart { name } => display.start_phase(name),
                Progress::PhaseFinish => {
                    display.bar.disable_steady_tick();
                    display.bar.finish_with_message("✓ Done");
                }
                Progress::IterationStart {
                    iteration,
                    new_data_points,
                } => {
                    display.iteration = Some(iteration);
                    display.note(format!(
                        "  Iteration {} created {} DataPoint(s)",
                        iteration, new_data_points
                    ));
                }
                Progress::TaskStart { total_steps } => display.start_batch(total_steps),
                Progress::TaskIncrement => {
                    display.jobs_done += 1;
                    display.bar.inc(1);
                }
                Progress::TaskFinish => display.finish_batch(),
                Progress::Message(msg) => display.note(format!("  {}", msg)),
            }
        })
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}
