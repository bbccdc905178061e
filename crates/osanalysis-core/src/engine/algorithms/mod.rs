//! The procedures that decide which DataPoints an analysis evaluates next.
//!
//! An algorithm's options and progress are stored on the analysis as an
//! [`Algorithm`](crate::core::models::algorithm::Algorithm); the functions here advance it.
//! Each iteration appends DataPoints to the analysis and tags them; the number of new points
//! is returned, and zero signals that the algorithm has nothing more to add right now.

pub mod curve;
pub mod design_of_experiments;
pub mod pareto;
pub mod sampling;
pub mod sequential_search;

pub use pareto::pareto_front;

use crate::core::models::algorithm::{Algorithm, AlgorithmKind};
use crate::core::models::analysis::{Analysis, AnalysisError};
use crate::core::models::data_point::DataPoint;
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Tags algorithms leave on the DataPoints they create.
pub mod tags {
    /// The point the search is currently expanding. Exactly one point carries it.
    pub const CURRENT: &str = "current";
    /// Every point a Sequential Search has created.
    pub const EXPLORED: &str = "explored";
    pub const DESIGN: &str = "DOE";
    pub const SAMPLE: &str = "sample";
}

#[derive(Debug, Error)]
pub enum AlgorithmError {
    #[error("The analysis has no algorithm")]
    NoAlgorithm,

    #[error("{algorithm} cannot run on this problem: {reason}")]
    Incompatible {
        algorithm: &'static str,
        reason: String,
    },

    #[error("DataPoint {0} disappeared from the analysis")]
    UnknownDataPoint(Uuid),

    #[error("Analysis rejected a change: {source}")]
    Analysis {
        #[from]
        source: AnalysisError,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}

/// Runs one iteration of the analysis's algorithm.
///
/// # Return
///
/// The number of DataPoints added to the analysis. A complete algorithm adds none.
///
/// # Errors
///
/// Returns [`AlgorithmError::NoAlgorithm`] if the analysis has no algorithm, and
/// [`AlgorithmError::Incompatible`] if the algorithm cannot work on the problem.
#[instrument(skip_all, name = "create_next_iteration")]
pub fn create_next_iteration(analysis: &mut Analysis) -> Result<usize, AlgorithmError> {
    let mut algorithm = analysis.take_algorithm().ok_or(AlgorithmError::NoAlgorithm)?;
    let result = advance(&mut algorithm, analysis);
    analysis.put_algorithm(algorithm);
    result
}

fn advance(algorithm: &mut Algorithm, analysis: &mut Analysis) -> Result<usize, AlgorithmError> {
    if algorithm.is_complete() {
        debug!("{} is already complete.", algorithm.name());
        return Ok(0);
    }
    algorithm
        .check_compatibility(analysis.problem())
        .map_err(|reason| AlgorithmError::Incompatible {
            algorithm: algorithm.name(),
            reason,
        })?;

    match algorithm.kind().clone() {
        AlgorithmKind::SequentialSearch(options) => {
            sequential_search::create_next_iteration(algorithm, &options, analysis)
        }
        AlgorithmKind::DesignOfExperiments(options) => {
            design_of_experiments::create_next_iteration(algorithm, &options, analysis)
        }
        AlgorithmKind::Sampling(options) => {
            sampling::create_next_iteration(algorithm, &options, analysis)
        }
    }
}

/// The running best-so-far trace of one objective, as recorded by a Sequential Search that
/// minimized it first.
///
/// Points are ordered from the baseline outwards. Analyses run by other algorithms have no
/// minimum curve.
pub fn minimum_curve(analysis: &Analysis, objective: usize) -> Vec<&DataPoint> {
    if objective > 1 {
        return Vec::new();
    }
    sequential_search::curve_points(analysis, objective)
}
