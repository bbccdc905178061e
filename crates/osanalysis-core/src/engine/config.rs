use crate::core::models::algorithm::{SamplingMethod, SamplingOptions, SequentialSearchOptions};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// What happens to a run directory after its job has been harvested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobCleanUpBehavior {
    /// Keep everything the job wrote.
    #[default]
    None,
    /// Keep only the job description and result files of successful jobs.
    Standard,
    /// Remove the whole run directory of successful jobs.
    Aggressive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Root under which every DataPoint gets its `dataPoint<N>` run directory.
    pub working_directory: PathBuf,
    /// Upper bound on jobs in flight at once; unbounded when `None`.
    pub queue_size: Option<usize>,
    /// Upper bound on algorithm iterations for this run.
    pub max_iterations: Option<usize>,
    pub clean_up: JobCleanUpBehavior,
    /// Re-run points that already have results.
    pub force: bool,
}

#[derive(Default)]
pub struct RunOptionsBuilder {
    working_directory: Option<PathBuf>,
    queue_size: Option<usize>,
    max_iterations: Option<usize>,
    clean_up: Option<JobCleanUpBehavior>,
    force: Option<bool>,
}

impl RunOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn working_directory(mut self, path: PathBuf) -> Self {
        self.working_directory = Some(path);
        self
    }
    pub fn queue_size(mut self, size: usize) -> Self {
        self.queue_size = Some(size);
        self
    }
    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = Some(iterations);
        self
    }
    pub fn clean_up(mut self, behavior: JobCleanUpBehavior) -> Self {
        self.clean_up = Some(behavior);
        self
    }
    pub fn force(mut self, force: bool) -> Self {
        self.force = Some(force);
        self
    }

    pub fn build(self) -> Result<RunOptions, ConfigError> {
        if self.queue_size == Some(0) {
            return Err(ConfigError::InvalidParameter {
                name: "queue_size",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(RunOptions {
            working_directory: self
                .working_directory
                .ok_or(ConfigError::MissingParameter("working_directory"))?,
            queue_size: self.queue_size,
            max_iterations: self.max_iterations,
            clean_up: self.clean_up.unwrap_or_default(),
            force: self.force.unwrap_or(false),
        })
    }
}

#[derive(Default)]
pub struct SequentialSearchConfigBuilder {
    objective_to_minimize_first: Option<usize>,
}

impl SequentialSearchConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn objective_to_minimize_first(mut self, index: usize) -> Self {
        self.objective_to_minimize_first = Some(index);
        self
    }

    pub fn build(self) -> Result<SequentialSearchOptions, ConfigError> {
        let index = self.objective_to_minimize_first.unwrap_or(0);
        if index > 1 {
            return Err(ConfigError::InvalidParameter {
                name: "objective_to_minimize_first",
                reason: format!("must be 0 or 1, got {}", index),
            });
        }
        Ok(SequentialSearchOptions {
            objective_to_minimize_first: index,
        })
    }
}

const DEFAULT_CVT_ITERATIONS: usize = 50;

#[derive(Default)]
pub struct SamplingConfigBuilder {
    method: Option<SamplingMethod>,
    num_samples: Option<usize>,
    seed: Option<u64>,
    cvt_iterations: Option<usize>,
}

impl SamplingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: SamplingMethod) -> Self {
        self.method = Some(method);
        self
    }
    pub fn num_samples(mut self, n: usize) -> Self {
        self.num_samples = Some(n);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn cvt_iterations(mut self, iterations: usize) -> Self {
        self.cvt_iterations = Some(iterations);
        self
    }

    pub fn build(self) -> Result<SamplingOptions, ConfigError> {
        let num_samples = self
            .num_samples
            .ok_or(ConfigError::MissingParameter("num_samples"))?;
        if num_samples == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "num_samples",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(SamplingOptions {
            method: self.method.ok_or(ConfigError::MissingParameter("method"))?,
            num_samples,
            seed: self.seed,
            cvt_iterations: self.cvt_iterations.unwrap_or(DEFAULT_CVT_ITERATIONS),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_options_require_a_working_directory() {
        assert_eq!(
            RunOptionsBuilder::new().build(),
            Err(ConfigError::MissingParameter("working_directory"))
        );
        let options = RunOptionsBuilder::new()
            .working_directory(PathBuf::from("runs"))
            .queue_size(4)
            .build()
            .unwrap();
        assert_eq!(options.queue_size, Some(4));
        assert_eq!(options.clean_up, JobCleanUpBehavior::None);
        assert!(!options.force);
    }

    #[test]
    fn zero_queue_size_is_rejected() {
        let result = RunOptionsBuilder::new()
            .working_directory(PathBuf::from("runs"))
            .queue_size(0)
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter { name: "queue_size", .. })
        ));
    }

    #[test]
    fn sequential_search_defaults_to_first_objective() {
        let options = SequentialSearchConfigBuilder::new().build().unwrap();
        assert_eq!(options.objective_to_minimize_first, 0);
        assert!(SequentialSearchConfigBuilder::new()
            .objective_to_minimize_first(2)
            .build()
            .is_err());
    }

    #[test]
    fn sampling_requires_method_and_count() {
        assert_eq!(
            SamplingConfigBuilder::new().method(SamplingMethod::Halton).build(),
            Err(ConfigError::MissingParameter("num_samples"))
        );
        assert_eq!(
            SamplingConfigBuilder::new().num_samples(8).build(),
            Err(ConfigError::MissingParameter("method"))
        );
        let options = SamplingConfigBuilder::new()
            .method(SamplingMethod::Cvt)
            .num_samples(8)
            .seed(7)
            .build()
            .unwrap();
        assert_eq!(options.cvt_iterations, DEFAULT_CVT_ITERATIONS);
        assert_eq!(options.seed, Some(7));
    }
}
