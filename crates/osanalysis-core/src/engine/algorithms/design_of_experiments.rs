use super::{AlgorithmError, tags};
use crate::core::models::algorithm::{Algorithm, DesignOfExperimentsOptions, DesignType};
use crate::core::models::analysis::Analysis;
use crate::core::models::problem::Problem;
use crate::core::models::variable::VariableValue;
use tracing::info;

/// Every combination of selected perturbations, the first variable varying slowest.
///
/// # Return
///
/// Returns `None` if the problem has a continuous variable or a variable without selected
/// perturbations.
pub fn full_factorial(problem: &Problem) -> Option<Vec<Vec<VariableValue>>> {
    let axes: Vec<Vec<usize>> = problem
        .variables()
        .map(|v| v.as_discrete().map(|d| d.selected_indices()))
        .collect::<Option<_>>()?;
    if axes.iter().any(Vec::is_empty) {
        return None;
    }

    let mut designs = vec![Vec::new()];
    for axis in &axes {
        designs = designs
            .into_iter()
            .flat_map(|prefix: Vec<VariableValue>| {
                axis.iter().map(move |&index| {
                    let mut design = prefix.clone();
                    design.push(VariableValue::Discrete(index));
                    design
                })
            })
            .collect();
    }
    Some(designs)
}

/// Creates the whole design in a single iteration and completes.
pub(crate) fn create_next_iteration(
    algorithm: &mut Algorithm,
    options: &DesignOfExperimentsOptions,
    analysis: &mut Analysis,
) -> Result<usize, AlgorithmError> {
    let designs = match options.design_type {
        DesignType::FullFactorial => full_factorial(analysis.problem()),
    }
    .ok_or_else(|| AlgorithmError::Incompatible {
        algorithm: algorithm.name(),
        reason: "full factorial designs need discrete variables with selected perturbations"
            .to_string(),
    })?;

    algorithm.begin_iteration();
    let mut created = 0;
    for design in designs {
        if analysis.get_data_point_by_values(&design).is_some() {
            continue;
        }
        let uuid = analysis.create_data_point(design)?;
        analysis.add_tag(uuid, tags::DESIGN)?;
        created += 1;
    }
    algorithm.mark_complete();

    info!(
        created,
        total = analysis.num_data_points(),
        "Full factorial design created."
    );
    Ok(created)
}
