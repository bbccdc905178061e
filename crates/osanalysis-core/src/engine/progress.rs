//! Progress events raised while an analysis runs.
//!
//! A run is split into phases. During evaluation each algorithm iteration produces a batch
//! of DataPoints, and every harvested job advances that batch by one step.

#[derive(Debug, Clone)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    /// The algorithm produced a new iteration.
    IterationStart {
        iteration: usize,
        new_data_points: usize,
    },

    /// A batch of jobs was queued; `total_steps` counts its DataPoints.
    TaskStart { total_steps: u64 },
    /// One job of the batch was harvested, successful or not.
    TaskIncrement,
    /// Every job of the batch was harvested.
    TaskFinish,

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

/// Forwards progress events to an optional callback. Without one, events are dropped.
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
}
