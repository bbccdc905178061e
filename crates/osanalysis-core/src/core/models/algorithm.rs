use super::problem::Problem;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Options of the Sequential Search heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SequentialSearchOptions {
    /// Index (0 or 1) of the objective the minimum curve keeps lowest while the other
    /// objective is driven down.
    pub objective_to_minimize_first: usize,
}

impl Default for SequentialSearchOptions {
    fn default() -> Self {
        Self {
            objective_to_minimize_first: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DesignType {
    #[default]
    FullFactorial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DesignOfExperimentsOptions {
    pub design_type: DesignType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplingMethod {
    Random,
    LatinHypercube,
    Halton,
    Hammersley,
    /// Centroidal Voronoi tessellation.
    Cvt,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SamplingOptions {
    pub method: SamplingMethod,
    pub num_samples: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Lloyd iterations used by [`SamplingMethod::Cvt`].
    pub cvt_iterations: usize,
}

/// The algorithm an analysis runs, with its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum AlgorithmKind {
    SequentialSearch(SequentialSearchOptions),
    DesignOfExperiments(DesignOfExperimentsOptions),
    Sampling(SamplingOptions),
}

/// Progress an algorithm has made on its analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlgorithmState {
    pub iteration: usize,
    pub complete: bool,
    pub failed: bool,
}

/// A search or sampling algorithm attached to an analysis.
///
/// This is the persisted part of an algorithm. The procedures that generate DataPoints live
/// in [`crate::engine::algorithms`] and keep no memory beyond this state and the tags they
/// leave on the analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Algorithm {
    uuid: Uuid,
    version_uuid: Uuid,
    kind: AlgorithmKind,
    #[serde(default)]
    state: AlgorithmState,
}

impl Algorithm {
    pub fn new(kind: AlgorithmKind) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            version_uuid: Uuid::new_v4(),
            kind,
            state: AlgorithmState::default(),
        }
    }

    pub fn sequential_search(options: SequentialSearchOptions) -> Self {
        Self::new(AlgorithmKind::SequentialSearch(options))
    }

    pub fn design_of_experiments(options: DesignOfExperimentsOptions) -> Self {
        Self::new(AlgorithmKind::DesignOfExperiments(options))
    }

    pub fn sampling(options: SamplingOptions) -> Self {
        Self::new(AlgorithmKind::Sampling(options))
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn version_uuid(&self) -> Uuid {
        self.version_uuid
    }

    pub fn kind(&self) -> &AlgorithmKind {
        &self.kind
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            AlgorithmKind::SequentialSearch(_) => "SequentialSearch",
            AlgorithmKind::DesignOfExperiments(_) => "DesignOfExperiments",
            AlgorithmKind::Sampling(_) => "Sampling",
        }
    }

    pub fn state(&self) -> AlgorithmState {
        self.state
    }

    pub fn iteration(&self) -> usize {
        self.state.iteration
    }

    pub fn is_complete(&self) -> bool {
        self.state.complete
    }

    pub fn failed(&self) -> bool {
        self.state.failed
    }

    pub(crate) fn begin_iteration(&mut self) {
        self.state.iteration += 1;
        self.version_uuid = Uuid::new_v4();
    }

    pub(crate) fn mark_complete(&mut self) {
        self.state.complete = true;
        self.version_uuid = Uuid::new_v4();
    }

    pub(crate) fn mark_failed(&mut self) {
        self.state.complete = true;
        self.state.failed = true;
        self.version_uuid = Uuid::new_v4();
    }

    /// Forgets all progress so the algorithm starts over on its next iteration.
    pub fn reset(&mut self) {
        self.state = AlgorithmState::default();
        self.version_uuid = Uuid::new_v4();
    }

    /// Checks whether the algorithm can work on a problem.
    ///
    /// # Errors
    ///
    /// Returns a description of the first incompatibility found.
    pub fn check_compatibility(&self, problem: &Problem) -> Result<(), String> {
        match &self.kind {
            AlgorithmKind::SequentialSearch(options) => {
                if problem.objectives().len() != 2 {
                    return Err(format!(
                        "requires exactly 2 objective functions, the problem has {}",
                        problem.objectives().len()
                    ));
                }
                if options.objective_to_minimize_first > 1 {
                    return Err(format!(
                        "objective_to_minimize_first must be 0 or 1, got {}",
                        options.objective_to_minimize_first
                    ));
                }
                if problem.baseline_values().is_none() {
                    return Err("every variable needs a baseline setting".to_string());
                }
                let unstepped = problem.variables().find(|v| {
                    v.as_continuous()
                        .is_some_and(|c| c.step().is_none() || c.maximum.is_none())
                });
                if let Some(variable) = unstepped {
                    return Err(format!(
                        "continuous variable '{}' needs bounds and an increment",
                        variable.name
                    ));
                }
                Ok(())
            }
            AlgorithmKind::DesignOfExperiments(_) => {
                if problem.num_variables() == 0 {
                    return Err("the problem has no variables".to_string());
                }
                match problem.combinatorial_size(true) {
                    Some(_) => Ok(()),
                    None => Err(
                        "requires discrete variables, each with at least one selected perturbation"
                            .to_string(),
                    ),
                }
            }
            AlgorithmKind::Sampling(options) => {
                if options.num_samples == 0 {
                    return Err("num_samples must be positive".to_string());
                }
                let unbounded = problem.variables().find(|v| match v.as_continuous() {
                    Some(c) => c.minimum.is_none() || c.maximum.is_none(),
                    None => v.as_discrete().is_some_and(|d| d.num_perturbations(true) == 0),
                });
                match unbounded {
                    Some(variable) => Err(format!(
                        "variable '{}' has no finite sampling range",
                        variable.name
                    )),
                    None => Ok(()),
                }
            }
        }
    }
}
