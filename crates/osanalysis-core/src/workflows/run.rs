use crate::core::models::analysis::Analysis;
use crate::engine::algorithms::{self, AlgorithmError};
use crate::engine::backend::JobBackend;
use crate::engine::config::RunOptions;
use crate::engine::driver::{AnalysisDriver, RunError};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub analysis: Analysis,
    /// Whether the run left nothing to evaluate and the algorithm, if any, is complete.
    /// `false` after hitting the iteration limit.
    pub complete: bool,
    pub iterations: usize,
    /// UUIDs of the non-dominated successful DataPoints, sorted by objective values.
    pub pareto_front: Vec<Uuid>,
    /// Minimum curves of the first two objectives, baseline first. Empty unless a
    /// Sequential Search produced them.
    pub minimum_curves: [Vec<Uuid>; 2],
}

/// Runs `analysis` through `backend` until it is complete or the iteration limit is hit.
///
/// # Errors
///
/// Returns an error if the algorithm cannot work on the problem, the analysis results are
/// invalid, or the backend rejects a job. Failed simulations are not errors; they are recorded
/// on their DataPoints. When the driver fails, [`EngineError::analysis`] gives back the
/// analysis with everything harvested before the failure.
#[instrument(skip_all, name = "analysis_workflow", fields(analysis = analysis.name()))]
pub fn run<B: JobBackend>(
    analysis: Analysis,
    backend: B,
    options: &RunOptions,
    reporter: &ProgressReporter,
) -> Result<AnalysisResult, EngineError> {
    // === Phase 1: Preparation ===
    reporter.report(Progress::PhaseStart {
        name: "Preparation",
    });
    if let Some(algorithm) = analysis.algorithm() {
        algorithm
            .check_compatibility(analysis.problem())
            .map_err(|reason| AlgorithmError::Incompatible {
                algorithm: algorithm.name(),
                reason,
            })?;
        info!(
            algorithm = algorithm.name(),
            iteration = algorithm.iteration(),
            "Running analysis with {} existing DataPoint(s).",
            analysis.num_data_points()
        );
    } else {
        info!("Running analysis without an algorithm; only queued DataPoints are evaluated.");
    }
    reporter.report(Progress::PhaseFinish);

    // === Phase 2: Iterate and evaluate ===
    let driver = AnalysisDriver::new(backend);
    let mut current = driver.run(analysis, options)?;
    let complete = match driver.wait_for_finished(&mut current, reporter) {
        Ok(complete) => complete,
        Err(source) => {
            if let Err(e) = driver.stop(&mut current) {
                warn!("Cannot cancel outstanding jobs: {}", e);
            }
            return Err(RunError::new(current.into_analysis(), source).into());
        }
    };
    let iterations = current.iterations();
    let analysis = current.into_analysis();

    // === Phase 3: Postprocessing ===
    reporter.report(Progress::PhaseStart {
        name: "Postprocessing",
    });
    let result = finalize_results(analysis, complete, iterations);
    reporter.report(Progress::PhaseFinish);

    let failed = result.analysis.failed_data_points().len();
    if failed > 0 {
        warn!(failed, "Some DataPoints failed to evaluate.");
    }
    info!(
        "Workflow complete after {} iteration(s): {} DataPoint(s), {} on the Pareto front.",
        result.iterations,
        result.analysis.num_data_points(),
        result.pareto_front.len()
    );
    Ok(result)
}

fn finalize_results(analysis: Analysis, complete: bool, iterations: usize) -> AnalysisResult {
    let uuids = |points: Vec<&crate::core::models::data_point::DataPoint>| -> Vec<Uuid> {
        points.iter().map(|dp| dp.uuid()).collect()
    };
    let pareto_front = uuids(algorithms::pareto_front(&analysis));
    let minimum_curves = [
        uuids(algorithms::minimum_curve(&analysis, 0)),
        uuids(algorithms::minimum_curve(&analysis, 1)),
    ];
    AnalysisResult {
        analysis,
        complete,
        iterations,
        pareto_front,
        minimum_curves,
    }
}
