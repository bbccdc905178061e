use crate::cli::RunArgs;
use crate::config::PartialAnalysisConfig;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use osanalysis::{
    core::{
        io::{
            json::{JsonAnalysisFile, JsonMetadata},
            summary::write_summary_to_path,
            traits::AnalysisFile,
        },
        models::analysis::Analysis,
    },
    engine::{backend::ThreadPoolBackend, error::EngineError, progress::ProgressReporter},
    workflows::{self, run::AnalysisResult},
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const ANALYSIS_FILE: &str = "analysis.json";
pub const SUMMARY_FILE: &str = "summary.csv";

pub async fn run(args: RunArgs, threads: Option<usize>) -> Result<()> {
    let partial_config = PartialAnalysisConfig::from_file(&args.config)?;
    info!("Merging configuration from file and CLI arguments...");
    let setup = partial_config.merge_with_cli(&args)?;

    let analysis = match &args.resume {
        Some(path) => {
            info!("Resuming saved analysis from {:?}", path);
            let (analysis, _) =
                JsonAnalysisFile::read_from_path(path).map_err(|e| CliError::FileParsing {
                    path: path.clone(),
                    source: e.into(),
                })?;
            analysis
        }
        None => setup.analysis,
    };

    std::fs::create_dir_all(&args.output)?;
    let backend = ThreadPoolBackend::new(setup.runner, threads).map_err(EngineError::from)?;
    info!(
        "Evaluating jobs with '{}' on {} thread(s).",
        backend.runner().program().display(),
        backend.num_threads()
    );

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Starting analysis '{}'...", analysis.display_name());
    info!("Invoking the core analysis workflow...");

    let result = tokio::task::block_in_place(|| {
        workflows::run::run(analysis, backend, &setup.options, &reporter)
    });
    let result = match result {
        Ok(result) => result,
        Err(e) => {
            if let Some(analysis) = e.analysis() {
                match save_analysis(analysis, &args.output) {
                    Ok(path) => println!("✓ Partial analysis written to: {}", path.display()),
                    Err(save_error) => warn!("Cannot save the partial analysis: {}", save_error),
                }
            }
            return Err(e.into());
        }
    };

    save_results(&result, &args.output)?;
    report(&result);
    Ok(())
}

fn save_analysis(analysis: &Analysis, output: &Path) -> Result<PathBuf> {
    let analysis_path = output.join(ANALYSIS_FILE);
    info!("Saving analysis to {:?}", &analysis_path);
    JsonAnalysisFile::write_to_path(analysis, &JsonMetadata::full(), &analysis_path)?;
    Ok(analysis_path)
}

fn save_results(result: &AnalysisResult, output: &Path) -> Result<()> {
    let analysis_path = save_analysis(&result.analysis, output)?;

    let summary_path = output.join(SUMMARY_FILE);
    info!("Writing summary table to {:?}", &summary_path);
    write_summary_to_path(&result.analysis.summary_table(), &summary_path)
        .map_err(|e| CliError::Other(e.into()))?;

    println!("✓ Analysis written to: {}", analysis_path.display());
    println!("✓ Summary written to: {}", summary_path.display());
    Ok(())
}

fn report(result: &AnalysisResult) {
    let analysis = &result.analysis;
    let failed = analysis.failed_data_points().len();
    println!(
        "Evaluated {} DataPoint(s) over {} iteration(s), {} failed.",
        analysis.complete_data_points().len(),
        result.iterations,
        failed
    );
    if !result.complete {
        warn!("Run ended before the analysis was complete.");
        println!("Warning: the analysis is not complete; rerun with --resume to continue.");
    }

    if analysis.problem().objectives().len() < 2 || result.pareto_front.is_empty() {
        return;
    }
    println!("Pareto front ({} point(s)):", result.pareto_front.len());
    for uuid in &result.pareto_front {
        if let Some(data_point) = analysis.data_point_by_uuid(*uuid) {
            let values: Vec<String> = data_point
                .objective_values()
                .iter()
                .map(|v| format!("{:.4}", v))
                .collect();
            println!("  {:<30} [{}]", data_point.name(), values.join(", "));
        }
    }
}
