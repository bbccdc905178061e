use crate::cli::ValidateArgs;
use crate::config::PartialAnalysisConfig;
use crate::error::Result;
use osanalysis::core::models::analysis::Analysis;
use osanalysis::core::models::variable::VariableKind;
use tracing::info;

pub async fn run(args: ValidateArgs) -> Result<()> {
    let partial_config = PartialAnalysisConfig::from_file(&args.config)?;
    let analysis = partial_config.build_analysis()?;
    info!("Analysis definition {:?} is valid.", &args.config);
    print!("{}", describe(&analysis));
    Ok(())
}

fn describe(analysis: &Analysis) -> String {
    let problem = analysis.problem();
    let mut lines = vec![format!("Analysis '{}'", analysis.display_name())];

    lines.push(format!("Variables ({}):", problem.num_variables()));
    for variable in problem.variables() {
        let detail = match &variable.kind {
            VariableKind::Discrete(d) => format!(
                "discrete, {} of {} perturbation(s) selected",
                d.num_perturbations(true),
                d.num_perturbations(false)
            ),
            VariableKind::Continuous(c) => format!(
                "continuous, [{}, {}]",
                c.minimum.map_or("-inf".to_string(), |v| v.to_string()),
                c.maximum.map_or("inf".to_string(), |v| v.to_string())
            ),
        };
        lines.push(format!("  {:<30} {}", variable.display_name(), detail));
    }

    lines.push(format!("Objectives ({}):", problem.objectives().len()));
    for objective in problem.objectives() {
        lines.push(format!("  {}", objective.display_name()));
    }

    match problem.combinatorial_size(true) {
        Some(size) => lines.push(format!("Combinatorial size: {}", size)),
        None => lines.push("Combinatorial size: unbounded".to_string()),
    }
    match analysis.algorithm() {
        Some(algorithm) => lines.push(format!("Algorithm: {} (compatible)", algorithm.name())),
        None => lines.push("Algorithm: none".to_string()),
    }

    let mut text = lines.join("\n");
    text.push('\n');
    text
}
