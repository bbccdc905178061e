use super::{BackendError, JobBackend, JobHandle, JobRunner};
use crate::core::models::job::{Job, JobOutcome};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Default)]
struct PoolState {
    outstanding: usize,
    waiting: HashSet<Uuid>,
    canceled: HashSet<Uuid>,
    any_canceled: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<PoolState>,
    idle: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims a job for execution. Returns `false` if it was canceled while waiting.
    fn start(&self, job_uuid: Uuid) -> bool {
        let mut state = self.lock();
        state.waiting.remove(&job_uuid);
        !state.canceled.remove(&job_uuid)
    }

    fn finish(&self) {
        let mut state = self.lock();
        state.outstanding -= 1;
        if state.outstanding == 0 {
            self.idle.notify_all();
        }
    }
}

/// Runs jobs on a dedicated `rayon` thread pool.
///
/// Jobs start in submission order as threads become free. Stopping a job only takes effect
/// if it is still waiting for a thread.
pub struct ThreadPoolBackend<R> {
    pool: rayon::ThreadPool,
    runner: Arc<R>,
    shared: Arc<Shared>,
}

impl<R: JobRunner + 'static> ThreadPoolBackend<R> {
    /// Builds a backend with `num_threads` workers, or one per logical CPU when `None`.
    pub fn new(runner: R, num_threads: Option<usize>) -> Result<Self, BackendError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.unwrap_or(0))
            .thread_name(|i| format!("osanalysis-job-{i}"))
            .build()
            .map_err(|e| BackendError::ThreadPool(e.to_string()))?;
        debug!(threads = pool.current_num_threads(), "Job thread pool ready.");
        Ok(Self {
            pool,
            runner: Arc::new(runner),
            shared: Arc::new(Shared::default()),
        })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }
}

impl<R: JobRunner + 'static> JobBackend for ThreadPoolBackend<R> {
    fn submit(&self, job: Job) -> Result<JobHandle, BackendError> {
        let (tx, handle) = JobHandle::channel(job.uuid);
        {
            let mut state = self.shared.lock();
            if !state.waiting.insert(job.uuid) {
                return Err(BackendError::Submit {
                    job: job.uuid,
                    reason: "a job with this UUID is already waiting".to_string(),
                });
            }
            state.outstanding += 1;
        }

        let runner = Arc::clone(&self.runner);
        let shared = Arc::clone(&self.shared);
        self.pool.spawn(move || {
            let outcome = if shared.start(job.uuid) {
                panic::catch_unwind(AssertUnwindSafe(|| runner.run(&job))).unwrap_or_else(|_| {
                    warn!(job = %job.uuid, "Job runner panicked.");
                    JobOutcome::failed(job.uuid, "the job runner panicked")
                })
            } else {
                debug!(job = %job.uuid, "Skipping canceled job.");
                JobOutcome::canceled(job.uuid)
            };
            // Nobody listens any more once the driver has stopped the job.
            let _ = tx.send(outcome);
            shared.finish();
        });
        Ok(handle)
    }

    fn stop(&self, job_uuid: Uuid) -> bool {
        let mut state = self.shared.lock();
        if state.waiting.contains(&job_uuid) {
            state.canceled.insert(job_uuid);
            state.any_canceled = true;
            true
        } else {
            false
        }
    }

    fn wait_for_finished(&self) -> bool {
        let mut state = self.shared.lock();
        while state.outstanding > 0 {
            state = self
                .shared
                .idle
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        !std::mem::take(&mut state.any_canceled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::function::Attribute;
    use crate::core::models::job::JobStatus;
    use crate::engine::backend::test_job;
    use std::path::PathBuf;

    fn echo(job: &Job) -> JobOutcome {
        JobOutcome::succeeded(job.uuid, vec![Attribute::new("ok", 1.0)])
    }

    #[test]
    fn every_submitted_job_reports_back() {
        let backend = ThreadPoolBackend::new(echo, Some(3)).unwrap();
        let handles: Vec<JobHandle> = (0..10)
            .map(|_| backend.submit(test_job(PathBuf::new())).unwrap())
            .collect();

        assert!(backend.wait_for_finished());
        for handle in handles {
            let job = handle.job_uuid();
            let outcome = handle.wait();
            assert_eq!(outcome.job_uuid, job);
            assert!(outcome.is_success());
        }
    }

    #[test]
    fn stopping_a_waiting_job_cancels_it() {
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        let blocker = test_job(PathBuf::new());
        let blocker_uuid = blocker.uuid;
        let runner = move |job: &Job| {
            if job.uuid == blocker_uuid {
                let _ = release_rx.recv();
            }
            echo(job)
        };
        let backend = ThreadPoolBackend::new(runner, Some(1)).unwrap();

        let first = backend.submit(blocker).unwrap();
        let second = backend.submit(test_job(PathBuf::new())).unwrap();
        let second_uuid = second.job_uuid();

        assert!(backend.stop(second_uuid));
        release_tx.send(()).unwrap();

        assert!(first.wait().is_success());
        assert_eq!(second.wait().status, JobStatus::Canceled);
        assert!(!backend.wait_for_finished());
        assert!(backend.wait_for_finished());
        assert!(!backend.stop(second_uuid));
    }

    #[test]
    fn panicking_runner_fails_the_job() {
        let backend = ThreadPoolBackend::new(|_: &Job| -> JobOutcome { panic!("boom") }, Some(1))
            .unwrap();
        let outcome = backend.submit(test_job(PathBuf::new())).unwrap().wait();
        assert_eq!(outcome.status, JobStatus::Failed);
    }

    #[test]
    fn duplicate_waiting_job_is_rejected() {
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        let runner = move |job: &Job| {
            let _ = release_rx.recv();
            echo(job)
        };
        let backend = ThreadPoolBackend::new(runner, Some(1)).unwrap();
        let job = test_job(PathBuf::new());

        let blocker = backend.submit(test_job(PathBuf::new())).unwrap();
        let handle = backend.submit(job.clone()).unwrap();
        assert!(matches!(backend.submit(job), Err(BackendError::Submit { .. })));

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        assert!(blocker.wait().is_success());
        assert!(handle.wait().is_success());
    }
}
