use super::algorithms::{self, AlgorithmError};
use super::backend::command::{JOB_FILE, RESULTS_FILE};
use super::backend::{BackendError, JobBackend, JobHandle};
use super::config::{JobCleanUpBehavior, RunOptions};
use super::progress::{Progress, ProgressReporter};
use crate::core::models::analysis::{Analysis, AnalysisError};
use crate::core::models::job::{Job, JobOutcome, JobStatus};
use crate::core::models::problem::ProblemError;
use crossbeam_channel::Select;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Results of analysis '{name}' are invalid; clear them before running again")]
    ResultsAreInvalid { name: String },

    #[error("Cannot build the workflow of DataPoint {data_point}: {source}")]
    Workflow {
        data_point: Uuid,
        source: ProblemError,
    },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Backend error: {source}")]
    Backend {
        #[from]
        source: BackendError,
    },

    #[error("Analysis error: {source}")]
    Analysis {
        #[from]
        source: AnalysisError,
    },

    #[error("Algorithm error: {source}")]
    Algorithm {
        #[from]
        source: AlgorithmError,
    },
}

/// A run that failed before or while starting. Carries the analysis back to the caller.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct RunError {
    analysis: Box<Analysis>,
    source: DriverError,
}

impl RunError {
    pub fn new(analysis: Analysis, source: DriverError) -> Self {
        Self {
            analysis: Box::new(analysis),
            source,
        }
    }

    pub fn analysis(&self) -> &Analysis {
        &self.analysis
    }

    pub fn error(&self) -> &DriverError {
        &self.source
    }

    pub fn into_analysis(self) -> Analysis {
        *self.analysis
    }
}

struct QueuedJob {
    job_uuid: Uuid,
    data_point: Uuid,
    handle: JobHandle,
}

/// An analysis that is being run by an [`AnalysisDriver`].
///
/// The driver owns the analysis for the duration of the run, so nothing else can touch a
/// DataPoint while its job is in flight. Take it back with [`CurrentAnalysis::into_analysis`].
pub struct CurrentAnalysis {
    analysis: Analysis,
    options: RunOptions,
    queued: Vec<QueuedJob>,
    submitted: HashSet<Uuid>,
    first_iteration: usize,
    stopped: bool,
}

impl CurrentAnalysis {
    fn new(analysis: Analysis, options: RunOptions) -> Self {
        let first_iteration = analysis.algorithm().map_or(0, |a| a.iteration());
        Self {
            analysis,
            options,
            queued: Vec::new(),
            submitted: HashSet::new(),
            first_iteration,
            stopped: false,
        }
    }

    pub fn analysis(&self) -> &Analysis {
        &self.analysis
    }

    pub fn into_analysis(self) -> Analysis {
        self.analysis
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Jobs submitted and not yet harvested.
    pub fn num_queued_jobs(&self) -> usize {
        self.queued.len()
    }

    /// DataPoints submitted to the backend during this run.
    pub fn num_submitted(&self) -> usize {
        self.submitted.len()
    }

    /// Algorithm iterations created during this run.
    pub fn iterations(&self) -> usize {
        self.analysis
            .algorithm()
            .map_or(0, |a| a.iteration().saturating_sub(self.first_iteration))
    }

    pub fn is_running(&self) -> bool {
        !self.queued.is_empty()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Nothing is in flight, every point has been evaluated and the algorithm, if any, has
    /// nothing more to create.
    ///
    /// Points whose job was stopped during this run still count as outstanding.
    pub fn is_complete(&self) -> bool {
        self.queued.is_empty()
            && self.analysis.data_points_to_queue().is_empty()
            && self.analysis.algorithm().is_none_or(|a| a.is_complete())
    }

    /// Points waiting to be queued, excluding anything already submitted during this run.
    fn queueable(&self) -> Vec<Uuid> {
        self.analysis
            .data_points_to_queue()
            .iter()
            .map(|dp| dp.uuid())
            .filter(|uuid| !self.submitted.contains(uuid))
            .collect()
    }
}

/// Submits an analysis's DataPoints to a job backend and drives its algorithm until nothing
/// is left to evaluate.
pub struct AnalysisDriver<B> {
    backend: B,
}

impl<B: JobBackend> AnalysisDriver<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Starts running `analysis` and queues its first batch of jobs.
    ///
    /// Points left over from an interrupted run (dispatched but never completed) are returned
    /// to the queue. An algorithm that has not produced anything yet runs its first iteration.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::ResultsAreInvalid`] if the analysis's results no longer match
    /// its seed, or any error raised while creating the iteration or submitting jobs. The
    /// [`RunError`] hands the analysis back; jobs submitted before the failure are canceled
    /// and their points left ready to queue.
    #[instrument(skip_all, name = "analysis_driver_run", fields(analysis = analysis.name()))]
    pub fn run(&self, analysis: Analysis, options: &RunOptions) -> Result<CurrentAnalysis, RunError> {
        if analysis.results_are_invalid() {
            let name = analysis.name().to_string();
            return Err(RunError::new(analysis, DriverError::ResultsAreInvalid { name }));
        }

        let mut current = CurrentAnalysis::new(analysis, options.clone());
        match self.start(&mut current) {
            Ok(queued) => {
                info!(queued, "Analysis started.");
                Ok(current)
            }
            Err(source) => {
                if let Err(e) = self.stop(&mut current) {
                    warn!("Cannot cancel the jobs of a failed start: {}", e);
                }
                Err(RunError::new(current.into_analysis(), source))
            }
        }
    }

    fn start(&self, current: &mut CurrentAnalysis) -> Result<usize, DriverError> {
        let analysis = &mut current.analysis;
        let stale: Vec<Uuid> = analysis
            .data_points()
            .filter(|dp| dp.job_uuid().is_some() && !dp.is_complete())
            .map(|dp| dp.uuid())
            .collect();
        for uuid in &stale {
            if let Some(data_point) = analysis.data_point_mut(*uuid) {
                data_point.clear_run_information();
            }
        }
        if !stale.is_empty() {
            info!(count = stale.len(), "Requeueing DataPoints from an interrupted run.");
        }

        if current.options.force {
            let complete: Vec<Uuid> = analysis
                .complete_data_points()
                .iter()
                .map(|dp| dp.uuid())
                .collect();
            for uuid in complete {
                analysis.clear_results(uuid)?;
            }
        }

        let working_directory = &current.options.working_directory;
        fs::create_dir_all(working_directory).map_err(|source| DriverError::Io {
            path: working_directory.clone(),
            source,
        })?;

        let fresh = current
            .analysis
            .algorithm()
            .is_some_and(|a| a.iteration() == 0 && !a.is_complete());
        if fresh {
            let created = algorithms::create_next_iteration(&mut current.analysis)?;
            info!(created, "Algorithm created its first iteration.");
        }

        self.queue_jobs(current)
    }

    /// Drives the run until the analysis is complete, the iteration limit is reached or the
    /// run was stopped.
    ///
    /// Each time every job of an iteration has been harvested the algorithm is asked for the
    /// next one. Returns whether the analysis is complete; `false` when the run was stopped,
    /// hit the iteration limit or left a stopped point unevaluated.
    #[instrument(skip_all, name = "analysis_driver_wait")]
    pub fn wait_for_finished(
        &self,
        current: &mut CurrentAnalysis,
        reporter: &ProgressReporter,
    ) -> Result<bool, DriverError> {
        reporter.report(Progress::PhaseStart {
            name: "Evaluating DataPoints",
        });
        let mut batch_open = false;
        if current.is_running() {
            report_batch(current, reporter);
            batch_open = true;
        }

        loop {
            if !current.queued.is_empty() {
                let (index, outcome) = next_outcome(&current.queued);
                let job = current.queued.remove(index);
                self.harvest(current, job, outcome)?;
                reporter.report(Progress::TaskIncrement);
                self.queue_jobs(current)?;
                continue;
            }

            if current.stopped {
                break;
            }
            if self.queue_jobs(current)? > 0 {
                continue;
            }
            if batch_open {
                reporter.report(Progress::TaskFinish);
                batch_open = false;
            }
            if !self.next_iteration(current, reporter)? {
                break;
            }
            if self.queue_jobs(current)? == 0 {
                break;
            }
            report_batch(current, reporter);
            batch_open = true;
        }

        if batch_open {
            reporter.report(Progress::TaskFinish);
        }
        reporter.report(Progress::PhaseFinish);
        Ok(!current.stopped && current.is_complete())
    }

    /// Cancels every queued job and forgets the dispatch of the in-flight points.
    ///
    /// Jobs that already finished are harvested normally.
    #[instrument(skip_all, name = "analysis_driver_stop")]
    pub fn stop(&self, current: &mut CurrentAnalysis) -> Result<(), DriverError> {
        let jobs = std::mem::take(&mut current.queued);
        let count = jobs.len();
        for job in jobs {
            self.cancel(current, job)?;
        }
        current.stopped = true;
        self.backend.wait_for_finished();
        info!(count, "Run stopped.");
        Ok(())
    }

    /// Cancels the job of a single DataPoint. Returns `false` if the point had no job in flight.
    ///
    /// The point is not resubmitted during this run, so the run cannot complete; the next run
    /// queues it again.
    pub fn stop_data_point(&self, current: &mut CurrentAnalysis, uuid: Uuid) -> Result<bool, DriverError> {
        let Some(index) = current.queued.iter().position(|job| job.data_point == uuid) else {
            return Ok(false);
        };
        let job = current.queued.remove(index);
        self.cancel(current, job)?;
        Ok(true)
    }

    pub fn is_running(&self, current: &CurrentAnalysis) -> bool {
        current.is_running()
    }

    fn cancel(&self, current: &mut CurrentAnalysis, job: QueuedJob) -> Result<(), DriverError> {
        let canceled = self.backend.stop(job.job_uuid);
        match job.handle.try_outcome() {
            Some(outcome) if !canceled && outcome.status != JobStatus::Canceled => {
                self.harvest(current, job, outcome)
            }
            _ => {
                debug!(data_point = %job.data_point, "Job canceled.");
                if let Some(data_point) = current.analysis.data_point_mut(job.data_point) {
                    data_point.clear_run_information();
                }
                Ok(())
            }
        }
    }

    fn next_iteration(&self, current: &mut CurrentAnalysis, reporter: &ProgressReporter) -> Result<bool, DriverError> {
        let Some(algorithm) = current.analysis.algorithm() else {
            return Ok(false);
        };
        if algorithm.is_complete() {
            debug!("{} is complete.", algorithm.name());
            return Ok(false);
        }
        if let Some(max) = current.options.max_iterations {
            if current.iterations() >= max {
                info!(max, "Iteration limit reached.");
                return Ok(false);
            }
        }

        let created = algorithms::create_next_iteration(&mut current.analysis)?;
        let iteration = current.analysis.algorithm().map_or(0, |a| a.iteration());
        info!(iteration, created, "Next iteration created.");
        reporter.report(Progress::IterationStart {
            iteration,
            new_data_points: created,
        });
        Ok(true)
    }

    /// Submits queueable points until the queue-size limit is reached.
    fn queue_jobs(&self, current: &mut CurrentAnalysis) -> Result<usize, DriverError> {
        if current.stopped {
            return Ok(0);
        }
        let capacity = current
            .options
            .queue_size
            .map_or(usize::MAX, |size| size.saturating_sub(current.queued.len()));
        let candidates: Vec<Uuid> = current.queueable().into_iter().take(capacity).collect();

        for &uuid in &candidates {
            let job = self.prepare_job(current, uuid)?;
            let job_uuid = job.uuid;
            let directory = job.directory.clone();
            let handle = self.backend.submit(job)?;
            if let Some(data_point) = current.analysis.data_point_mut(uuid) {
                data_point.set_run_information(job_uuid, directory);
            }
            current.submitted.insert(uuid);
            current.queued.push(QueuedJob {
                job_uuid,
                data_point: uuid,
                handle,
            });
            debug!(data_point = %uuid, job = %job_uuid, "Job submitted.");
        }
        Ok(candidates.len())
    }

    fn prepare_job(&self, current: &CurrentAnalysis, uuid: Uuid) -> Result<Job, DriverError> {
        let analysis = &current.analysis;
        let position = analysis
            .data_points()
            .position(|dp| dp.uuid() == uuid)
            .ok_or(AnalysisError::UnknownDataPoint(uuid))?;
        let data_point = analysis
            .data_point_by_uuid(uuid)
            .ok_or(AnalysisError::UnknownDataPoint(uuid))?;

        let workflow = analysis
            .problem()
            .create_workflow(data_point)
            .map_err(|source| DriverError::Workflow {
                data_point: uuid,
                source,
            })?;

        let directory = run_directory(&current.options.working_directory, position);
        if directory.exists() {
            fs::remove_dir_all(&directory).map_err(|source| DriverError::Io {
                path: directory.clone(),
                source,
            })?;
        }
        fs::create_dir_all(&directory).map_err(|source| DriverError::Io {
            path: directory.clone(),
            source,
        })?;

        Ok(Job {
            uuid: Uuid::new_v4(),
            data_point_uuid: uuid,
            analysis_name: analysis.name().to_string(),
            variable_values: data_point.variable_values().to_vec(),
            workflow,
            seed: analysis.seed().clone(),
            weather_file: analysis.weather_file().cloned(),
            directory,
        })
    }

    fn harvest(&self, current: &mut CurrentAnalysis, job: QueuedJob, outcome: JobOutcome) -> Result<(), DriverError> {
        if outcome.status == JobStatus::Canceled {
            debug!(data_point = %job.data_point, "Job was canceled by the backend.");
            if let Some(data_point) = current.analysis.data_point_mut(job.data_point) {
                data_point.clear_run_information();
            }
            return Ok(());
        }

        current.analysis.record_outcome(job.data_point, &outcome)?;
        let Some(data_point) = current.analysis.data_point_by_uuid(job.data_point) else {
            return Ok(());
        };
        if data_point.is_failed() {
            warn!(data_point = %job.data_point, errors = ?data_point.errors(), "DataPoint failed.");
        } else {
            debug!(data_point = %job.data_point, objectives = ?data_point.objective_values(), "DataPoint complete.");
            if let Some(directory) = data_point.directory() {
                clean_up(directory, current.options.clean_up);
            }
        }
        Ok(())
    }
}

/// The run directory of the DataPoint at `position` in the analysis.
pub fn run_directory(working_directory: &Path, position: usize) -> PathBuf {
    working_directory.join(format!("dataPoint{}", position + 1))
}

fn report_batch(current: &CurrentAnalysis, reporter: &ProgressReporter) {
    let total = current.queued.len() + current.queueable().len();
    reporter.report(Progress::TaskStart {
        total_steps: total as u64,
    });
}

/// Blocks until one of the queued jobs reports back.
fn next_outcome(queued: &[QueuedJob]) -> (usize, JobOutcome) {
    let mut select = Select::new();
    for job in queued {
        select.recv(job.handle.receiver());
    }
    let operation = select.select();
    let index = operation.index();
    let handle = &queued[index].handle;
    let outcome = operation
        .recv(handle.receiver())
        .unwrap_or_else(|_| handle.dropped());
    (index, outcome)
}

fn clean_up(directory: &Path, behavior: JobCleanUpBehavior) {
    match behavior {
        JobCleanUpBehavior::None => {}
        JobCleanUpBehavior::Standard => {
            let entries = match fs::read_dir(directory) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Cannot clean up '{}': {}", directory.display(), e);
                    return;
                }
            };
            for entry in entries.flatten() {
                let name = entry.file_name();
                if name == JOB_FILE || name == RESULTS_FILE {
                    continue;
                }
                let path = entry.path();
                let removed = if path.is_dir() {
                    fs::remove_dir_all(&path)
                } else {
                    fs::remove_file(&path)
                };
                if let Err(e) = removed {
                    warn!("Cannot remove '{}': {}", path.display(), e);
                }
            }
        }
        JobCleanUpBehavior::Aggressive => {
            if let Err(e) = fs::remove_dir_all(directory) {
                warn!("Cannot remove '{}': {}", directory.display(), e);
            }
        }
    }
}
