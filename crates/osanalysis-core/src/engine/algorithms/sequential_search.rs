use super::curve::CurveStack;
use super::{AlgorithmError, tags};
use crate::core::models::algorithm::{Algorithm, SequentialSearchOptions};
use crate::core::models::analysis::Analysis;
use crate::core::models::data_point::DataPoint;
use crate::core::models::problem::Problem;
use crate::core::models::variable::{VariableKind, VariableValue, values_are_equal};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// The tag marking the points of the minimum curve built for `objective`.
pub fn curve_tag(objective: usize) -> String {
    format!("curve{}", objective)
}

/// The points tagged for the minimum curve of `objective`, ordered from the baseline out.
///
/// Curve points trade the other objective down while paying as little of `objective` as
/// possible, so ordering by the other objective (descending) recovers the walk order.
pub fn curve_points(analysis: &Analysis, objective: usize) -> Vec<&DataPoint> {
    let other = 1 - objective.min(1);
    let mut points: Vec<&DataPoint> = analysis
        .get_data_points_by_tag(&curve_tag(objective))
        .into_iter()
        .filter(|dp| dp.objective_values().len() > objective.max(other))
        .collect();
    points.sort_by(|a, b| {
        let (a, b) = (a.objective_values(), b.objective_values());
        b[other]
            .total_cmp(&a[other])
            .then_with(|| b[objective].total_cmp(&a[objective]))
    });
    points
}

/// Every location one move away from `values`.
///
/// A discrete variable moves to each of its other selected perturbations, a continuous one
/// by one step in either direction. The result is ordered by variable, then by value.
pub fn neighborhood(problem: &Problem, values: &[VariableValue]) -> Vec<Vec<VariableValue>> {
    let mut neighbors = Vec::new();
    for (i, variable) in problem.variables().enumerate() {
        let Some(&value) = values.get(i) else {
            break;
        };
        let moves: Vec<VariableValue> = match (&variable.kind, value) {
            (VariableKind::Discrete(discrete), VariableValue::Discrete(current)) => discrete
                .selected_indices()
                .into_iter()
                .filter(|&index| index != current)
                .map(VariableValue::Discrete)
                .collect(),
            (VariableKind::Continuous(continuous), VariableValue::Continuous(current)) => continuous
                .neighbors(current)
                .into_iter()
                .map(VariableValue::Continuous)
                .collect(),
            _ => Vec::new(),
        };
        for setting in moves {
            let mut neighbor = values.to_vec();
            neighbor[i] = setting;
            neighbors.push(neighbor);
        }
    }
    neighbors
}

/// The exchange rate between two points: how much `cost` rises per unit of `driven` saved
/// when moving from `from` to `to`.
///
/// # Return
///
/// `None` if the move saves nothing. A move that saves nothing on `driven` but lowers `cost`
/// is worth `-inf`.
fn slope(from: &[f64], to: &[f64], cost: usize, driven: usize) -> Option<f64> {
    let saved = from[driven] - to[driven];
    let paid = to[cost] - from[cost];
    if values_are_equal(from[driven], to[driven]) {
        return (paid < 0.0 && !values_are_equal(from[cost], to[cost])).then_some(f64::NEG_INFINITY);
    }
    (saved > 0.0).then_some(paid / saved)
}

/// The successful point reached from `center` at the smallest slope.
///
/// Ties go to the point created first.
fn best_move(analysis: &Analysis, center: &[f64], cost: usize, driven: usize) -> Option<Uuid> {
    let mut best: Option<(Uuid, f64)> = None;
    for candidate in analysis.successful_data_points() {
        let objectives = candidate.objective_values();
        if objectives.len() <= cost.max(driven) {
            continue;
        }
        let Some(s) = slope(center, objectives, cost, driven) else {
            continue;
        };
        trace!(candidate = %candidate.uuid(), slope = s, "Compared candidate.");
        if best.is_none_or(|(_, best_slope)| s < best_slope) {
            best = Some((candidate.uuid(), s));
        }
    }
    best.map(|(uuid, _)| uuid)
}

fn move_current(analysis: &mut Analysis, to: Uuid) -> Result<(), AlgorithmError> {
    let holders: Vec<Uuid> = analysis
        .get_data_points_by_tag(tags::CURRENT)
        .iter()
        .map(|dp| dp.uuid())
        .filter(|uuid| *uuid != to)
        .collect();
    for uuid in holders {
        analysis.remove_tag(uuid, tags::CURRENT)?;
    }
    analysis.add_tag(to, tags::CURRENT)?;
    Ok(())
}

/// Runs one Sequential Search iteration.
///
/// The search keeps a minimum curve: a path from the baseline along which each step is the
/// move with the cheapest exchange of the curve objective for savings in the other one. Each
/// call walks the curve from the baseline. The first curve point whose neighborhood has not
/// been created yet gets it created. Where a point's best move differs from the next curve
/// point, the curve is cut there and continues through the better move. When the last curve
/// point has no move left the search is complete.
///
/// Everything the walk needs is read back from DataPoint tags and objective values, so the
/// iteration continues identically on a reloaded analysis.
///
/// # Return
///
/// The number of DataPoints added. Zero either means the search is complete or that earlier
/// points still await evaluation.
pub(crate) fn create_next_iteration(
    algorithm: &mut Algorithm,
    options: &SequentialSearchOptions,
    analysis: &mut Analysis,
) -> Result<usize, AlgorithmError> {
    let cost = options.objective_to_minimize_first;
    let driven = 1 - cost;
    let tag = curve_tag(cost);

    if algorithm.iteration() == 0 {
        return start(algorithm, analysis, &tag);
    }

    if let Some(pending) = analysis
        .data_points()
        .find(|dp| dp.is_selected() && !dp.is_complete())
    {
        debug!(
            data_point = %pending.uuid(),
            "Sequential search is waiting for earlier DataPoints to be evaluated."
        );
        return Ok(0);
    }

    let mut curve = CurveStack::from_frames(
        curve_points(analysis, cost)
            .iter()
            .map(|dp| dp.uuid())
            .collect(),
    );
    if curve.is_empty() {
        warn!("Sequential search has no successful baseline to start from.");
        algorithm.mark_failed();
        return Ok(0);
    }

    let mut depth = 0;
    loop {
        let Some(center_uuid) = curve.get(depth) else {
            return Err(AlgorithmError::Internal(format!(
                "curve walk left the curve at depth {}",
                depth
            )));
        };
        let (values, objectives) = match analysis.data_point_by_uuid(center_uuid) {
            Some(center) => (
                center.variable_values().to_vec(),
                center.objective_values().to_vec(),
            ),
            None => return Err(AlgorithmError::UnknownDataPoint(center_uuid)),
        };

        let missing: Vec<Vec<VariableValue>> = neighborhood(analysis.problem(), &values)
            .into_iter()
            .filter(|neighbor| analysis.get_data_point_by_values(neighbor).is_none())
            .collect();
        if !missing.is_empty() {
            algorithm.begin_iteration();
            move_current(analysis, center_uuid)?;
            let count = missing.len();
            for neighbor in missing {
                let uuid = analysis.create_data_point(neighbor)?;
                analysis.add_tag(uuid, tags::EXPLORED)?;
            }
            info!(
                iteration = algorithm.iteration(),
                depth,
                "Sequential search created {} DataPoints around the current point.",
                count
            );
            return Ok(count);
        }

        match best_move(analysis, &objectives, cost, driven) {
            None => {
                for dropped in curve.truncate(depth + 1) {
                    analysis.remove_tag(dropped, &tag)?;
                }
                move_current(analysis, center_uuid)?;
                algorithm.mark_complete();
                info!(
                    iterations = algorithm.iteration(),
                    curve_length = curve.len(),
                    "Sequential search is complete."
                );
                return Ok(0);
            }
            Some(best) => {
                let popped = curve.advance(depth, best);
                if !popped.is_empty() {
                    debug!(depth, "Backtracking: the curve continues through a better move.");
                }
                for dropped in popped {
                    analysis.remove_tag(dropped, &tag)?;
                }
                analysis.add_tag(best, &tag)?;
                depth += 1;
            }
        }
    }
}

fn start(algorithm: &mut Algorithm, analysis: &mut Analysis, tag: &str) -> Result<usize, AlgorithmError> {
    let baseline = analysis.problem().baseline_values().ok_or_else(|| {
        AlgorithmError::Incompatible {
            algorithm: algorithm.name(),
            reason: "every variable needs a baseline setting".to_string(),
        }
    })?;
    algorithm.begin_iteration();

    let (uuid, created) = match analysis.get_data_point_by_values(&baseline) {
        Some(existing) => (existing.uuid(), 0),
        None => (analysis.create_data_point(baseline)?, 1),
    };
    analysis.add_tag(uuid, tags::EXPLORED)?;
    analysis.add_tag(uuid, tag)?;
    move_current(analysis, uuid)?;
    info!(baseline = %uuid, "Sequential search started from the baseline.");
    Ok(created)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::algorithm::AlgorithmKind;
    use crate::core::models::function::{Attribute, LinearFunction};
    use crate::core::models::job::JobOutcome;
    use crate::core::models::variable::{ContinuousVariable, Perturbation, Variable};
    use crate::core::models::workflow::FileReference;
    use crate::engine::algorithms::{self, pareto_front};
    use fixtures::reference_analysis;

    fn evaluate_queue(analysis: &mut Analysis) {
        let queued: Vec<Uuid> = analysis
            .data_points_to_queue()
            .iter()
            .map(|dp| dp.uuid())
            .collect();
        for uuid in queued {
            let outcome = JobOutcome::succeeded(Uuid::new_v4(), vec![Attribute::new("baseline", 20.0)]);
            analysis.record_outcome(uuid, &outcome).unwrap();
        }
    }

    fn objectives(points: &[&DataPoint]) -> Vec<(f64, f64)> {
        points
            .iter()
            .map(|dp| (dp.objective_values()[0], dp.objective_values()[1]))
            .collect()
    }

    fn run_to_completion(analysis: &mut Analysis) -> Vec<usize> {
        let mut counts = Vec::new();
        loop {
            let count = algorithms::create_next_iteration(analysis).unwrap();
            counts.push(count);
            evaluate_queue(analysis);
            if count == 0 {
                break;
            }
            assert!(counts.len() < 50, "sequential search did not terminate");
        }
        counts
    }

    mod reference_problem {
        use super::*;

        #[test]
        fn reproduces_the_reference_trace() {
            let mut analysis = reference_analysis(0);

            let counts = run_to_completion(&mut analysis);

            assert_eq!(counts, vec![1, 5, 4, 3, 3, 2, 2, 3, 0]);
            assert_eq!(analysis.successful_data_points().len(), 23);
            assert_eq!(analysis.get_data_points_by_tag(tags::EXPLORED).len(), 23);
            assert!(analysis.algorithm().unwrap().is_complete());
            assert_eq!(algorithms::create_next_iteration(&mut analysis).unwrap(), 0);
        }

        #[test]
        fn minimum_curve_matches_the_reference() {
            let mut analysis = reference_analysis(0);
            run_to_completion(&mut analysis);

            let curve = curve_points(&analysis, 0);

            assert_eq!(
                objectives(&curve),
                vec![
                    (20.0, 20.0),
                    (18.0, 20.0),
                    (15.0, 19.0),
                    (16.0, 16.0),
                    (17.0, 14.0),
                    (20.0, 12.0)
                ]
            );
        }

        #[test]
        fn pareto_front_lies_on_the_minimum_curve() {
            let mut analysis = reference_analysis(0);
            run_to_completion(&mut analysis);

            let front = pareto_front(&analysis);
            let curve: Vec<Uuid> = curve_points(&analysis, 0).iter().map(|dp| dp.uuid()).collect();

            assert_eq!(
                objectives(&front),
                vec![(15.0, 19.0), (16.0, 16.0), (17.0, 14.0), (20.0, 12.0)]
            );
            assert!(front.iter().all(|dp| curve.contains(&dp.uuid())));
        }

        #[test]
        fn exactly_one_point_is_current_between_batches() {
            let mut analysis = reference_analysis(0);
            loop {
                let count = algorithms::create_next_iteration(&mut analysis).unwrap();
                assert_eq!(analysis.get_data_points_by_tag(tags::CURRENT).len(), 1);
                evaluate_queue(&mut analysis);
                if count == 0 {
                    break;
                }
            }
        }

        #[test]
        fn reloaded_analysis_continues_identically() {
            let mut original = reference_analysis(0);
            for _ in 0..4 {
                algorithms::create_next_iteration(&mut original).unwrap();
                evaluate_queue(&mut original);
            }
            let json = serde_json::to_string(&original).unwrap();
            let loaded: Analysis = serde_json::from_str(&json).unwrap();
            let mut restored = loaded.restore(loaded.data_points().cloned().collect()).unwrap();
            assert_ne!(restored.version_uuid(), original.version_uuid());

            let before = original.num_data_points();
            let a = algorithms::create_next_iteration(&mut original).unwrap();
            let b = algorithms::create_next_iteration(&mut restored).unwrap();

            assert_eq!(a, b);
            let batch = |analysis: &Analysis| -> Vec<Vec<VariableValue>> {
                analysis
                    .data_points()
                    .skip(before)
                    .map(|dp| dp.variable_values().to_vec())
                    .collect()
            };
            assert_eq!(batch(&original), batch(&restored));
        }

        #[test]
        fn second_objective_curve_uses_its_own_tag() {
            let mut analysis = reference_analysis(1);
            run_to_completion(&mut analysis);

            assert!(analysis.get_data_points_by_tag("curve0").is_empty());
            let curve = curve_points(&analysis, 1);
            assert!(!curve.is_empty());
            let driven: Vec<f64> = curve.iter().map(|dp| dp.objective_values()[0]).collect();
            assert!(driven.windows(2).all(|w| w[0] >= w[1]));
        }
    }

    mod waiting_and_failures {
        use super::*;

        #[test]
        fn waits_while_points_are_unevaluated() {
            let mut analysis = reference_analysis(0);
            assert_eq!(algorithms::create_next_iteration(&mut analysis).unwrap(), 1);

            assert_eq!(algorithms::create_next_iteration(&mut analysis).unwrap(), 0);
            assert!(!analysis.algorithm().unwrap().is_complete());
            assert_eq!(analysis.num_data_points(), 1);
        }

        #[test]
        fn failed_baseline_fails_the_search() {
            let mut analysis = reference_analysis(0);
            algorithms::create_next_iteration(&mut analysis).unwrap();
            let baseline = analysis.data_points_to_queue()[0].uuid();
            analysis
                .record_outcome(baseline, &JobOutcome::failed(Uuid::new_v4(), "crashed"))
                .unwrap();

            assert_eq!(algorithms::create_next_iteration(&mut analysis).unwrap(), 0);
            let algorithm = analysis.algorithm().unwrap();
            assert!(algorithm.is_complete());
            assert!(algorithm.failed());
        }

        #[test]
        fn failed_neighbors_are_never_chosen() {
            let mut analysis = reference_analysis(0);
            algorithms::create_next_iteration(&mut analysis).unwrap();
            evaluate_queue(&mut analysis);
            algorithms::create_next_iteration(&mut analysis).unwrap();

            // x1 alone is the best first move; fail it.
            let x1 = analysis.data_points_to_queue()[0].uuid();
            analysis
                .record_outcome(x1, &JobOutcome::failed(Uuid::new_v4(), "crashed"))
                .unwrap();
            evaluate_queue(&mut analysis);
            algorithms::create_next_iteration(&mut analysis).unwrap();

            let curve = curve_points(&analysis, 0);
            assert!(curve.iter().all(|dp| dp.uuid() != x1));
            assert!(analysis.data_point_by_uuid(x1).unwrap().has_tag(tags::EXPLORED));
        }
    }

    mod moves {
        use super::*;

        #[test]
        fn slope_prefers_cheap_savings() {
            let center = [20.0, 20.0];
            assert_eq!(slope(&center, &[17.0, 19.0], 0, 1), Some(-3.0));
            assert_eq!(slope(&center, &[21.0, 18.0], 0, 1), Some(0.5));
            assert_eq!(slope(&center, &[19.0, 23.0], 0, 1), None);
            assert_eq!(slope(&center, &[18.0, 20.0], 0, 1), Some(f64::NEG_INFINITY));
            assert_eq!(slope(&center, &[20.0, 20.0], 0, 1), None);
        }

        #[test]
        fn neighborhood_is_ordered_by_variable_then_value() {
            let discrete = Variable::discrete(
                "d",
                vec![
                    Perturbation::null("0"),
                    Perturbation::ruleset("1", "1.xml"),
                    Perturbation::ruleset("2", "2.xml").with_selected(false),
                    Perturbation::ruleset("3", "3.xml"),
                ],
            );
            let continuous = Variable::continuous(
                "c",
                ContinuousVariable {
                    minimum: Some(0.0),
                    maximum: Some(1.0),
                    increment: Some(0.5),
                    ..Default::default()
                },
            );
            let problem = Problem::new("P", vec![discrete.into(), continuous.into()]);

            let neighbors = neighborhood(
                &problem,
                &[VariableValue::Discrete(1), VariableValue::Continuous(0.5)],
            );

            assert_eq!(
                neighbors,
                vec![
                    vec![VariableValue::Discrete(0), VariableValue::Continuous(0.5)],
                    vec![VariableValue::Discrete(3), VariableValue::Continuous(0.5)],
                    vec![VariableValue::Discrete(1), VariableValue::Continuous(0.0)],
                    vec![VariableValue::Discrete(1), VariableValue::Continuous(1.0)],
                ]
            );
        }

        #[test]
        fn options_are_kept_on_the_algorithm() {
            let analysis = reference_analysis(1);
            assert!(matches!(
                analysis.algorithm().unwrap().kind(),
                AlgorithmKind::SequentialSearch(SequentialSearchOptions {
                    objective_to_minimize_first: 1
                })
            ));
        }
    }
}
