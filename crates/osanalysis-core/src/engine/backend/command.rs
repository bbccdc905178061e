use super::JobRunner;
use crate::core::models::function::Attribute;
use crate::core::models::job::{Job, JobMessage, JobOutcome};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use thiserror::Error;
use tracing::{debug, instrument, warn};

pub const JOB_FILE: &str = "job.json";
pub const RESULTS_FILE: &str = "results.json";
pub const STDOUT_FILE: &str = "stdout.log";
pub const STDERR_FILE: &str = "stderr.log";

/// Environment variable holding the absolute path of the job description.
pub const JOB_FILE_ENV: &str = "OSANALYSIS_JOB_FILE";

/// What an external command leaves behind in `results.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResultsFile {
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_values: Option<Vec<f64>>,
    #[serde(default)]
    pub messages: Vec<JobMessage>,
}

#[derive(Debug, Error)]
enum CommandError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed '{path}': {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Command exited with {0}")]
    Exit(ExitStatus),
    #[error("Command finished without writing results.json")]
    MissingResults,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CommandError + '_ {
    move |source| CommandError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Evaluates a job by running an external program inside the job's run directory.
///
/// The program finds the job description in `job.json` (also named by
/// `OSANALYSIS_JOB_FILE`) and reports back through `results.json`. Its standard output and
/// error are captured next to them.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandRunner {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn execute(&self, job: &Job) -> Result<JobOutcome, CommandError> {
        let dir = &job.directory;
        fs::create_dir_all(dir).map_err(io_error(dir))?;

        let job_path = dir.join(JOB_FILE);
        write_job(job, &job_path)?;

        let results_path = dir.join(RESULTS_FILE);
        if results_path.exists() {
            fs::remove_file(&results_path).map_err(io_error(&results_path))?;
        }

        let stdout_path = dir.join(STDOUT_FILE);
        let stderr_path = dir.join(STDERR_FILE);
        let stdout = File::create(&stdout_path).map_err(io_error(&stdout_path))?;
        let stderr = File::create(&stderr_path).map_err(io_error(&stderr_path))?;

        let absolute_job_path = fs::canonicalize(&job_path).unwrap_or(job_path);
        let status = Command::new(&self.program)
            .args(&self.args)
            .current_dir(dir)
            .env(JOB_FILE_ENV, &absolute_job_path)
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .map_err(io_error(&self.program))?;
        debug!(job = %job.uuid, %status, "Command finished.");

        if !status.success() {
            return Err(CommandError::Exit(status));
        }
        if !results_path.exists() {
            return Err(CommandError::MissingResults);
        }
        let results = read_results(&results_path)?;

        let mut outcome = JobOutcome::succeeded(job.uuid, results.attributes);
        outcome.response_values = results.response_values;
        outcome.messages = results.messages;
        Ok(outcome)
    }
}

fn write_job(job: &Job, path: &Path) -> Result<(), CommandError> {
    let file = File::create(path).map_err(io_error(path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, job).map_err(|source| CommandError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_error(path))
}

fn read_results(path: &Path) -> Result<ResultsFile, CommandError> {
    let file = File::open(path).map_err(io_error(path))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| CommandError::Json {
        path: path.to_path_buf(),
        source,
    })
}

impl JobRunner for CommandRunner {
    #[instrument(skip_all, name = "command_job", fields(job = %job.uuid))]
    fn run(&self, job: &Job) -> JobOutcome {
        match self.execute(job) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Job failed: {}", e);
                JobOutcome::failed(job.uuid, e.to_string())
            }
        }
    }
}
