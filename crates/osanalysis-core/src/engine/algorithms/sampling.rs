use super::{AlgorithmError, tags};
use crate::core::models::algorithm::{Algorithm, SamplingMethod, SamplingOptions};
use crate::core::models::analysis::Analysis;
use crate::core::models::problem::Problem;
use crate::core::models::variable::{VariableKind, VariableValue};
use rand::prelude::*;
use rand::rngs::StdRng;
use tracing::{debug, info, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Random points per generator used to estimate Voronoi cell centroids.
const CVT_POINTS_PER_GENERATOR: usize = 100;

/// The first `n` primes, used as Halton and Hammersley bases.
fn primes(n: usize) -> Vec<u64> {
    let mut found: Vec<u64> = Vec::with_capacity(n);
    let mut candidate = 2;
    while found.len() < n {
        if found.iter().take_while(|p| *p * *p <= candidate).all(|p| candidate % p != 0) {
            found.push(candidate);
        }
        candidate += 1;
    }
    found
}

/// Van der Corput radical inverse of `index` in `base`.
fn radical_inverse(mut index: u64, base: u64) -> f64 {
    let inv_base = 1.0 / base as f64;
    let mut factor = inv_base;
    let mut result = 0.0;
    while index > 0 {
        result += (index % base) as f64 * factor;
        index /= base;
        factor *= inv_base;
    }
    result
}

fn random(n: usize, dims: usize, rng: &mut impl Rng) -> Vec<Vec<f64>> {
    (0..n)
        .map(|_| (0..dims).map(|_| rng.r#gen::<f64>()).collect())
        .collect()
}

/// One sample per stratum of every axis, strata paired at random.
fn latin_hypercube(n: usize, dims: usize, rng: &mut impl Rng) -> Vec<Vec<f64>> {
    let mut samples = vec![vec![0.0; dims]; n];
    for d in 0..dims {
        let mut strata: Vec<usize> = (0..n).collect();
        strata.shuffle(rng);
        for (sample, stratum) in samples.iter_mut().zip(strata) {
            sample[d] = (stratum as f64 + rng.r#gen::<f64>()) / n as f64;
        }
    }
    samples
}

fn halton(n: usize, dims: usize) -> Vec<Vec<f64>> {
    let bases = primes(dims);
    (1..=n as u64)
        .map(|i| bases.iter().map(|&b| radical_inverse(i, b)).collect())
        .collect()
}

fn hammersley(n: usize, dims: usize) -> Vec<Vec<f64>> {
    let bases = primes(dims.saturating_sub(1));
    (0..n as u64)
        .map(|i| {
            let mut point = Vec::with_capacity(dims);
            if dims > 0 {
                point.push((i as f64 + 0.5) / n as f64);
            }
            point.extend(bases.iter().map(|&b| radical_inverse(i, b)));
            point
        })
        .collect()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(generators: &[Vec<f64>], point: &[f64]) -> usize {
    generators
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| squared_distance(a, point).total_cmp(&squared_distance(b, point)))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Centroidal Voronoi tessellation by Lloyd iteration with Monte Carlo centroids.
#[instrument(level = "debug", skip(rng))]
fn cvt(n: usize, dims: usize, iterations: usize, rng: &mut impl Rng) -> Vec<Vec<f64>> {
    let mut generators = random(n, dims, rng);
    for _ in 0..iterations {
        let points = random(n * CVT_POINTS_PER_GENERATOR, dims, rng);

        #[cfg(not(feature = "parallel"))]
        let owners: Vec<usize> = points.iter().map(|p| nearest(&generators, p)).collect();

        #[cfg(feature = "parallel")]
        let owners: Vec<usize> = points.par_iter().map(|p| nearest(&generators, p)).collect();

        let mut sums = vec![vec![0.0; dims]; n];
        let mut counts = vec![0usize; n];
        for (point, owner) in points.iter().zip(owners) {
            counts[owner] += 1;
            for (sum, x) in sums[owner].iter_mut().zip(point) {
                *sum += x;
            }
        }
        for ((generator, sum), count) in generators.iter_mut().zip(sums).zip(counts) {
            if count > 0 {
                *generator = sum.into_iter().map(|s| s / count as f64).collect();
            }
        }
    }
    generators
}

/// Draws `n` points in the unit hypercube of dimension `dims`.
pub fn unit_samples(
    method: SamplingMethod,
    n: usize,
    dims: usize,
    cvt_iterations: usize,
    rng: &mut impl Rng,
) -> Vec<Vec<f64>> {
    match method {
        SamplingMethod::Random => random(n, dims, rng),
        SamplingMethod::LatinHypercube => latin_hypercube(n, dims, rng),
        SamplingMethod::Halton => halton(n, dims),
        SamplingMethod::Hammersley => hammersley(n, dims),
        SamplingMethod::Cvt => cvt(n, dims, cvt_iterations, rng),
    }
}

/// Maps a unit-hypercube point onto the problem's variables.
///
/// Continuous coordinates are scaled onto `[minimum, maximum]` (snapped to the increment when
/// one is set); discrete coordinates pick one of the selected perturbations.
pub fn map_to_problem(problem: &Problem, point: &[f64]) -> Option<Vec<VariableValue>> {
    problem
        .variables()
        .zip(point)
        .map(|(variable, &u)| match &variable.kind {
            VariableKind::Continuous(c) => c.from_unit(u).map(VariableValue::Continuous),
            VariableKind::Discrete(d) => {
                let selected = d.selected_indices();
                let slot = ((u * selected.len() as f64) as usize).min(selected.len().checked_sub(1)?);
                selected.get(slot).copied().map(VariableValue::Discrete)
            }
        })
        .collect()
}

/// Creates up to `num_samples` new DataPoints in a single iteration and completes.
///
/// Samples landing on an existing location are skipped.
pub(crate) fn create_next_iteration(
    algorithm: &mut Algorithm,
    options: &SamplingOptions,
    analysis: &mut Analysis,
) -> Result<usize, AlgorithmError> {
    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let dims = analysis.problem().num_variables();
    let samples = unit_samples(
        options.method,
        options.num_samples,
        dims,
        options.cvt_iterations,
        &mut rng,
    );

    algorithm.begin_iteration();
    let mut created = 0;
    for sample in samples {
        let Some(values) = map_to_problem(analysis.problem(), &sample) else {
            return Err(AlgorithmError::Incompatible {
                algorithm: algorithm.name(),
                reason: "every variable needs a finite sampling range".to_string(),
            });
        };
        if analysis.get_data_point_by_values(&values).is_some() {
            debug!("Skipped a sample duplicating an existing DataPoint.");
            continue;
        }
        let uuid = analysis.create_data_point(values)?;
        analysis.add_tag(uuid, tags::SAMPLE)?;
        created += 1;
    }
    algorithm.mark_complete();

    info!(
        method = ?options.method,
        requested = options.num_samples,
        created,
        "Sampling created DataPoints."
    );
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::variable::{ContinuousVariable, Perturbation, Variable};
    use crate::core::models::workflow::FileReference;
    use crate::engine::algorithms;

    fn in_unit_cube(samples: &[Vec<f64>], dims: usize) -> bool {
        samples
            .iter()
            .all(|s| s.len() == dims && s.iter().all(|x| (0.0..=1.0).contains(x)))
    }

    mod sequences {
        use super::*;

        #[test]
        fn primes_are_generated_in_order() {
            assert_eq!(primes(6), vec![2, 3, 5, 7, 11, 13]);
        }

        #[test]
        fn radical_inverse_reflects_digits() {
            assert_eq!(radical_inverse(1, 2), 0.5);
            assert_eq!(radical_inverse(3, 2), 0.75);
            assert!((radical_inverse(1, 3) - 1.0 / 3.0).abs() < 1e-12);
        }

        #[test]
        fn halton_uses_prime_bases_per_axis() {
            let samples = halton(3, 2);
            assert_eq!(samples[0], vec![0.5, 1.0 / 3.0]);
            assert_eq!(samples[1][0], 0.25);
        }

        #[test]
        fn hammersley_first_axis_is_evenly_spaced() {
            let samples = hammersley(4, 2);
            let first: Vec<f64> = samples.iter().map(|s| s[0]).collect();
            assert_eq!(first, vec![0.125, 0.375, 0.625, 0.875]);
        }

        #[test]
        fn latin_hypercube_hits_every_stratum_once() {
            let mut rng = StdRng::seed_from_u64(3);
            let n = 10;
            let samples = latin_hypercube(n, 3, &mut rng);
            for d in 0..3 {
                let mut strata: Vec<usize> = samples.iter().map(|s| (s[d] * n as f64) as usize).collect();
                strata.sort_unstable();
                assert_eq!(strata, (0..n).collect::<Vec<_>>());
            }
        }

        #[test]
        fn every_method_stays_in_the_unit_cube() {
            let mut rng = StdRng::seed_from_u64(11);
            for method in [
                SamplingMethod::Random,
                SamplingMethod::LatinHypercube,
                SamplingMethod::Halton,
                SamplingMethod::Hammersley,
                SamplingMethod::Cvt,
            ] {
                let samples = unit_samples(method, 8, 3, 5, &mut rng);
                assert_eq!(samples.len(), 8, "{:?}", method);
                assert!(in_unit_cube(&samples, 3), "{:?}", method);
            }
        }

        #[test]
        fn cvt_spreads_generators_apart() {
            let mut rng = StdRng::seed_from_u64(5);
            let samples = cvt(2, 1, 20, &mut rng);
            let mut xs: Vec<f64> = samples.iter().map(|s| s[0]).collect();
            xs.sort_by(f64::total_cmp);
            assert!((xs[0] - 0.25).abs() < 0.1);
            assert!((xs[1] - 0.75).abs() < 0.1);
        }
    }

    mod algorithm {
        use super::*;
        use crate::core::models::algorithm::SamplingOptions;

        fn problem() -> Problem {
            let wwr = Variable::continuous(
                "wwr",
                ContinuousVariable {
                    minimum: Some(0.1),
                    maximum: Some(0.9),
                    increment: Some(0.1),
                    ..Default::default()
                },
            );
            let walls = Variable::discrete(
                "walls",
                vec![Perturbation::null("None"), Perturbation::ruleset("R-19", "r19.xml")],
            );
            Problem::new("P", vec![wwr.into(), walls.into()])
        }

        #[test]
        fn mapped_values_are_valid_for_the_problem() {
            let problem = problem();
            let values = map_to_problem(&problem, &[0.5, 0.99]).unwrap();
            assert!(problem.validate_values(&values).is_ok());
            assert_eq!(values[1], VariableValue::Discrete(1));
            assert_eq!(
                map_to_problem(&problem, &[0.0, 0.0]).unwrap()[0],
                VariableValue::Continuous(0.1)
            );
        }

        #[test]
        fn seeded_sampling_is_reproducible_and_skips_duplicates() {
            let options = SamplingOptions {
                method: SamplingMethod::LatinHypercube,
                num_samples: 40,
                seed: Some(42),
                cvt_iterations: 0,
            };
            let build = || {
                Analysis::new("S", problem(), FileReference::new("seed.osm"))
                    .unwrap()
                    .with_algorithm(Algorithm::sampling(options))
                    .unwrap()
            };
            let (mut first, mut second) = (build(), build());

            let created = algorithms::create_next_iteration(&mut first).unwrap();
            algorithms::create_next_iteration(&mut second).unwrap();

            // 9 settings x 2 perturbations bound the number of distinct locations.
            assert!(created <= 18);
            assert_eq!(created, first.num_data_points());
            assert!(first.get_data_points_by_tag(tags::SAMPLE).len() == created);
            let values = |a: &Analysis| -> Vec<Vec<VariableValue>> {
                a.data_points().map(|dp| dp.variable_values().to_vec()).collect()
            };
            assert_eq!(values(&first), values(&second));
            assert_eq!(algorithms::create_next_iteration(&mut first).unwrap(), 0);
        }
    }
}
