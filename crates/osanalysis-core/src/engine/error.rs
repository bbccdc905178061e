use thiserror::Error;

use super::algorithms::AlgorithmError;
use super::backend::BackendError;
use super::config::ConfigError;
use super::driver::RunError;
use crate::core::io::json::JsonFileError;
use crate::core::models::analysis::{Analysis, AnalysisError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
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

    #[error("Job backend error: {source}")]
    Backend {
        #[from]
        source: BackendError,
    },

    #[error("Driver error: {source}")]
    Run {
        #[from]
        source: RunError,
    },

    #[error("Analysis file error: {source}")]
    File {
        #[from]
        source: JsonFileError,
    },
}

impl EngineError {
    /// The analysis handed back by a run that failed, with every result recorded before the
    /// failure.
    pub fn analysis(&self) -> Option<&Analysis> {
        match self {
            Self::Run { source } => Some(source.analysis()),
            _ => None,
        }
    }
}
