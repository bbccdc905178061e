//! The seam between the driver and whatever actually runs simulations.
//!
//! A [`JobBackend`] accepts [`Job`]s and hands back a [`JobHandle`] through which exactly one
//! [`JobOutcome`] arrives. Backends decide how jobs execute; the driver only submits, waits
//! and cancels.

pub mod command;
pub mod thread_pool;

pub use command::CommandRunner;
pub use thread_pool::ThreadPoolBackend;

use crate::core::models::job::{Job, JobOutcome};
use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Failed to build the job thread pool: {0}")]
    ThreadPool(String),

    #[error("Job {job} was rejected: {reason}")]
    Submit { job: Uuid, reason: String },
}

/// The receiving end of a single job's outcome.
#[derive(Debug)]
pub struct JobHandle {
    job_uuid: Uuid,
    rx: Receiver<JobOutcome>,
}

impl JobHandle {
    /// Creates a handle together with the sender a backend fulfils it through.
    pub fn channel(job_uuid: Uuid) -> (Sender<JobOutcome>, Self) {
        let (tx, rx) = bounded(1);
        (tx, Self { job_uuid, rx })
    }

    /// A handle whose outcome is already available.
    pub fn ready(outcome: JobOutcome) -> Self {
        let (tx, handle) = Self::channel(outcome.job_uuid);
        // The channel has room for exactly this one message.
        let _ = tx.send(outcome);
        handle
    }

    pub fn job_uuid(&self) -> Uuid {
        self.job_uuid
    }

    /// Blocks until the outcome arrives.
    ///
    /// A backend that drops the job without answering produces a failed outcome.
    pub fn wait(self) -> JobOutcome {
        match self.rx.recv() {
            Ok(outcome) => outcome,
            Err(_) => self.dropped(),
        }
    }

    /// Returns the outcome if it has already arrived.
    pub fn try_outcome(&self) -> Option<JobOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.dropped()),
        }
    }

    pub(crate) fn receiver(&self) -> &Receiver<JobOutcome> {
        &self.rx
    }

    pub(crate) fn dropped(&self) -> JobOutcome {
        JobOutcome::failed(self.job_uuid, "the backend dropped the job without a result")
    }
}

/// Something that evaluates a single job synchronously.
pub trait JobRunner: Send + Sync {
    fn run(&self, job: &Job) -> JobOutcome;
}

impl<F> JobRunner for F
where
    F: Fn(&Job) -> JobOutcome + Send + Sync,
{
    fn run(&self, job: &Job) -> JobOutcome {
        self(job)
    }
}

pub trait JobBackend {
    /// Starts (or enqueues) a job. The returned handle receives its outcome.
    fn submit(&self, job: Job) -> Result<JobHandle, BackendError>;

    /// Cancels a job that has not started yet.
    ///
    /// Returns `true` if the job was still waiting and will report
    /// [`JobStatus::Canceled`](crate::core::models::job::JobStatus::Canceled). Running jobs
    /// are not interrupted.
    fn stop(&self, job_uuid: Uuid) -> bool;

    /// Blocks until every submitted job has finished. Returns `false` if some jobs were
    /// canceled along the way.
    fn wait_for_finished(&self) -> bool;
}

#[cfg(test)]
pub(crate) fn test_job(directory: std::path::PathBuf) -> Job {
    use crate::core::models::workflow::{FileReference, Workflow};
    Job {
        uuid: Uuid::new_v4(),
        data_point_uuid: Uuid::new_v4(),
        analysis_name: "test".to_string(),
        variable_values: Vec::new(),
        workflow: Workflow::default(),
        seed: FileReference::new("seed.osm"),
        weather_file: None,
        directory,
    }
}
