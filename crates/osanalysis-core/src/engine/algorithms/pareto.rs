use crate::core::models::analysis::Analysis;
use crate::core::models::data_point::DataPoint;

/// `a` dominates `b` if it is no worse in every objective and better in at least one.
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| x <= y)
        && a.iter().zip(b).any(|(x, y)| x < y)
}

/// The successful DataPoints that no other successful DataPoint dominates.
///
/// Points missing objective values are ignored. The front is sorted ascending by the first
/// objective, then by the following ones.
pub fn pareto_front(analysis: &Analysis) -> Vec<&DataPoint> {
    let num_objectives = analysis.problem().objectives().len();
    let evaluated: Vec<&DataPoint> = analysis
        .successful_data_points()
        .into_iter()
        .filter(|dp| num_objectives > 0 && dp.objective_values().len() == num_objectives)
        .collect();

    let mut front: Vec<&DataPoint> = evaluated
        .iter()
        .filter(|candidate| {
            !evaluated
                .iter()
                .any(|other| dominates(other.objective_values(), candidate.objective_values()))
        })
        .copied()
        .collect();

    front.sort_by(|a, b| {
        a.objective_values()
            .iter()
            .zip(b.objective_values())
            .map(|(x, y)| x.total_cmp(y))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    front
}
