use super::data_point::DataPoint;
use super::function::{Attribute, LinearFunction, ValueSource};
use super::job::{JobOutcome, MessageLevel};
use super::variable::{PerturbationKind, Variable, VariableKind, VariableValue, values_are_equal};
use super::workflow::{JobType, WorkItem, Workflow, WorkflowStep};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProblemError {
    #[error("DataPoint refers to problem {found}, expected {expected}")]
    WrongProblem { expected: Uuid, found: Uuid },

    #[error("Problem has {expected} variables but {found} values were given")]
    ValueCount { expected: usize, found: usize },

    #[error("Value {value} is not valid for variable '{variable}'")]
    InvalidValue {
        variable: String,
        value: VariableValue,
    },

    #[error("Variable {0} is not part of this problem")]
    UnknownVariable(Uuid),

    #[error("Variable '{0}' has no value at this DataPoint")]
    UnassignedValue(String),

    #[error("Attribute '{name}' is ambiguous: reported with conflicting values {values:?}")]
    AmbiguousValue { name: String, values: Vec<f64> },

    #[error("Attribute '{0}' was not reported by the job")]
    MissingValue(String),
}

/// A parametric design space together with the recipe used to simulate its points.
///
/// The order of the variable steps in the workflow defines the positional index used by
/// every DataPoint's value vector. A problem with objective functions is an optimization
/// problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    uuid: Uuid,
    version_uuid: Uuid,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    workflow: Vec<WorkflowStep>,
    #[serde(default)]
    responses: Vec<LinearFunction>,
    #[serde(default)]
    objectives: Vec<LinearFunction>,
}

impl Problem {
    /// Creates a problem from an ordered workflow.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the problem.
    /// * `workflow` - Variables and fixed work items in execution order.
    pub fn new(name: &str, workflow: Vec<WorkflowStep>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            version_uuid: Uuid::new_v4(),
            name: name.to_string(),
            display_name: None,
            description: None,
            workflow,
            responses: Vec::new(),
            objectives: Vec::new(),
        }
    }

    pub fn with_responses(mut self, responses: Vec<LinearFunction>) -> Self {
        self.responses = responses;
        self
    }

    pub fn with_objectives(mut self, objectives: Vec<LinearFunction>) -> Self {
        self.objectives = objectives;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn version_uuid(&self) -> Uuid {
        self.version_uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn workflow(&self) -> &[WorkflowStep] {
        &self.workflow
    }

    /// The variables of the problem in positional order.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.workflow.iter().filter_map(WorkflowStep::as_variable)
    }

    pub fn num_variables(&self) -> usize {
        self.variables().count()
    }

    pub fn variable(&self, index: usize) -> Option<&Variable> {
        self.variables().nth(index)
    }

    /// Resolves a variable's UUID to its position in every value vector.
    ///
    /// # Return
    ///
    /// Returns `Some(index)` if the variable belongs to this problem, otherwise `None`.
    pub fn get_variable_index_by_uuid(&self, uuid: Uuid) -> Option<usize> {
        self.variables().position(|v| v.uuid == uuid)
    }

    pub fn responses(&self) -> &[LinearFunction] {
        &self.responses
    }

    pub fn objectives(&self) -> &[LinearFunction] {
        &self.objectives
    }

    pub fn is_optimization(&self) -> bool {
        !self.objectives.is_empty()
    }

    /// Checks a value vector against the variables.
    ///
    /// # Errors
    ///
    /// Returns [`ProblemError::ValueCount`] on a length mismatch, or
    /// [`ProblemError::InvalidValue`] for the first value its variable rejects.
    pub fn validate_values(&self, values: &[VariableValue]) -> Result<(), ProblemError> {
        let expected = self.num_variables();
        if values.len() != expected {
            return Err(ProblemError::ValueCount {
                expected,
                found: values.len(),
            });
        }
        for (variable, value) in self.variables().zip(values) {
            if !variable.is_valid(value) {
                return Err(ProblemError::InvalidValue {
                    variable: variable.name.clone(),
                    value: *value,
                });
            }
        }
        Ok(())
    }

    /// Checks that a DataPoint was created for this problem and carries valid values.
    pub fn validate_data_point(&self, data_point: &DataPoint) -> Result<(), ProblemError> {
        if data_point.problem_uuid() != self.uuid {
            return Err(ProblemError::WrongProblem {
                expected: self.uuid,
                found: data_point.problem_uuid(),
            });
        }
        self.validate_values(data_point.variable_values())
    }

    pub fn is_valid(&self, data_point: &DataPoint) -> bool {
        match self.validate_data_point(data_point) {
            Ok(()) => true,
            Err(e) => {
                warn!("DataPoint {} is not valid for problem '{}': {}", data_point.uuid(), self.name, e);
                false
            }
        }
    }

    /// Creates a new, unevaluated DataPoint at the given location.
    ///
    /// # Errors
    ///
    /// Returns an error if the values are not valid for this problem.
    pub fn create_data_point(&self, values: Vec<VariableValue>) -> Result<DataPoint, ProblemError> {
        self.validate_values(&values)?;
        Ok(DataPoint::new(self.uuid, values))
    }

    /// The location where every variable takes its identity setting.
    ///
    /// # Return
    ///
    /// Returns `None` if some variable has no baseline (an empty discrete variable or a
    /// continuous variable without a lower bound).
    pub fn baseline_values(&self) -> Option<Vec<VariableValue>> {
        self.variables().map(Variable::baseline_value).collect()
    }

    /// Number of distinct points in a purely discrete design space.
    ///
    /// # Arguments
    ///
    /// * `selected_only` - Count only selected perturbations.
    ///
    /// # Return
    ///
    /// Returns `None` if any variable is continuous or has no (selected) perturbations.
    pub fn combinatorial_size(&self, selected_only: bool) -> Option<usize> {
        let mut size: Option<usize> = None;
        for variable in self.variables() {
            let discrete = variable.as_discrete()?;
            let n = discrete.num_perturbations(selected_only);
            if n == 0 {
                warn!(
                    "Variable '{}' of problem '{}' has no usable perturbations.",
                    variable.name, self.name
                );
                return None;
            }
            size = Some(size.map_or(n, |s| s.saturating_mul(n)));
        }
        size
    }

    /// Materializes the simulation recipe for one DataPoint.
    ///
    /// Null perturbations contribute nothing. Consecutive continuous variables bound to the
    /// same measure script are merged into a single work item carrying all their arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if the DataPoint is not valid for this problem.
    pub fn create_workflow(&self, data_point: &DataPoint) -> Result<Workflow, ProblemError> {
        self.validate_data_point(data_point)?;

        let mut items: Vec<WorkItem> = Vec::new();
        let mut open_measure: Option<PathBuf> = None;
        let mut index = 0;

        for step in &self.workflow {
            let variable = match step {
                WorkflowStep::WorkItem(item) => {
                    items.push(item.clone());
                    open_measure = None;
                    continue;
                }
                WorkflowStep::Variable(variable) => variable,
            };
            let value = data_point.variable_values()[index];
            index += 1;

            match (&variable.kind, value) {
                (VariableKind::Discrete(discrete), VariableValue::Discrete(i)) => {
                    open_measure = None;
                    let Some(perturbation) = discrete.perturbation(i) else {
                        continue;
                    };
                    match &perturbation.kind {
                        PerturbationKind::Null => {}
                        PerturbationKind::ModelRuleset { ruleset } => {
                            items.push(WorkItem::new(JobType::ModelRuleset).with_file(ruleset));
                        }
                        PerturbationKind::Ruby { script, arguments } => {
                            let mut item = WorkItem::new(JobType::UserScript).with_file(script);
                            item.arguments = arguments.clone();
                            items.push(item);
                        }
                    }
                }
                (VariableKind::Continuous(continuous), VariableValue::Continuous(v)) => {
                    let Some(binding) = &continuous.measure else {
                        open_measure = None;
                        continue;
                    };
                    let merges = open_measure.as_ref() == Some(&binding.script);
                    match items.last_mut() {
                        Some(last) if merges => {
                            last.arguments.insert(binding.argument.clone(), v.to_string());
                        }
                        _ => {
                            items.push(
                                WorkItem::new(JobType::UserScript)
                                    .with_file(&binding.script)
                                    .with_argument(&binding.argument, &v.to_string()),
                            );
                        }
                    }
                    open_measure = Some(binding.script.clone());
                }
                _ => open_measure = None,
            }
        }

        Ok(Workflow { items })
    }

    /// Evaluates a linear function at a DataPoint.
    ///
    /// # Errors
    ///
    /// Returns [`ProblemError::AmbiguousValue`] if an attribute is reported several times
    /// with different values, [`ProblemError::MissingValue`] if it is absent, and
    /// [`ProblemError::UnknownVariable`] for a term that names a foreign variable.
    ///
    /// # Panics
    ///
    /// Panics if the DataPoint's value vector does not match the problem's variables.
    pub fn evaluate_function(
        &self,
        function: &LinearFunction,
        data_point: &DataPoint,
        attributes: &[Attribute],
    ) -> Result<f64, ProblemError> {
        function.evaluate(|source| match source {
            ValueSource::Input { variable } => {
                let index = self
                    .get_variable_index_by_uuid(*variable)
                    .ok_or(ProblemError::UnknownVariable(*variable))?;
                let values = data_point.variable_values();
                assert_eq!(
                    values.len(),
                    self.num_variables(),
                    "DataPoint {} has a value vector inconsistent with problem '{}'",
                    data_point.uuid(),
                    self.name
                );
                values[index].as_f64().ok_or_else(|| {
                    let name = self.variable(index).map(|v| v.name.clone()).unwrap_or_default();
                    ProblemError::UnassignedValue(name)
                })
            }
            ValueSource::Attribute { name } => resolve_attribute(name, attributes),
        })
    }

    /// Writes a finished job's outcome onto its DataPoint.
    ///
    /// The point is marked complete. A failed job marks it failed as well. For a successful
    /// job the output attributes are stored and the response and objective functions are
    /// evaluated; if any of them cannot be resolved the point is marked failed instead.
    pub fn update_data_point(&self, data_point: &mut DataPoint, outcome: &JobOutcome) {
        data_point.mark_complete();

        for message in &outcome.messages {
            match message.level {
                MessageLevel::Error => error!("DataPoint {}: {}", data_point.uuid(), message.text),
                MessageLevel::Warning => warn!("DataPoint {}: {}", data_point.uuid(), message.text),
                MessageLevel::Info => info!("DataPoint {}: {}", data_point.uuid(), message.text),
            }
            if message.level == MessageLevel::Error {
                data_point.push_error(message.text.clone());
            }
        }

        if !outcome.is_success() {
            data_point.mark_failed();
            return;
        }

        data_point.set_output_attributes(outcome.attributes.clone());

        match self.evaluate_results(data_point, outcome) {
            Ok((responses, objectives)) => {
                debug!(
                    data_point = %data_point.uuid(),
                    ?objectives,
                    "Recorded results for DataPoint."
                );
                data_point.set_response_values(responses);
                data_point.set_objective_values(objectives);
            }
            Err(e) => {
                error!(
                    "Unable to extract results for DataPoint {}: {}",
                    data_point.uuid(),
                    e
                );
                data_point.push_error(e.to_string());
                data_point.mark_failed();
            }
        }
    }

    fn evaluate_results(
        &self,
        data_point: &DataPoint,
        outcome: &JobOutcome,
    ) -> Result<(Vec<f64>, Vec<f64>), ProblemError> {
        let responses = match &outcome.response_values {
            Some(values) if values.len() == self.responses.len() => values.clone(),
            _ => self
                .responses
                .iter()
                .map(|f| self.evaluate_function(f, data_point, &outcome.attributes))
                .collect::<Result<_, _>>()?,
        };
        let objectives = self
            .objectives
            .iter()
            .map(|f| self.evaluate_function(f, data_point, &outcome.attributes))
            .collect::<Result<_, _>>()?;
        Ok((responses, objectives))
    }
}

fn resolve_attribute(name: &str, attributes: &[Attribute]) -> Result<f64, ProblemError> {
    let values: Vec<f64> = attributes
        .iter()
        .filter(|a| a.name == name)
        .map(|a| a.value)
        .collect();
    let Some(&first) = values.first() else {
        return Err(ProblemError::MissingValue(name.to_string()));
    };
    if values.iter().all(|v| values_are_equal(*v, first)) {
        Ok(first)
    } else {
        Err(ProblemError::AmbiguousValue {
            name: name.to_string(),
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::job::JobOutcome;
    use crate::core::models::variable::{ContinuousVariable, MeasureBinding, Perturbation};
    use std::collections::BTreeMap;

    fn binary(name: &str) -> Variable {
        Variable::discrete(
            name,
            vec![
                Perturbation::null("Baseline"),
                Perturbation::ruleset(&format!("{} upgrade", name), format!("{}.xml", name)),
            ],
        )
    }

    fn bound(argument: &str, script: &str) -> Variable {
        Variable::continuous(
            argument,
            ContinuousVariable {
                minimum: Some(0.0),
                maximum: Some(1.0),
                increment: Some(0.25),
                measure: Some(MeasureBinding {
                    script: PathBuf::from(script),
                    argument: argument.to_string(),
                }),
                ..Default::default()
            },
        )
    }

    mod indexing {
        use super::*;

        #[test]
        fn variable_index_skips_work_items() {
            let walls = binary("walls");
            let roof = binary("roof");
            let (walls_uuid, roof_uuid) = (walls.uuid, roof.uuid);
            let problem = Problem::new(
                "Envelope",
                vec![
                    walls.into(),
                    WorkItem::new(JobType::ModelToIdf).into(),
                    roof.into(),
                ],
            );

            assert_eq!(problem.num_variables(), 2);
            assert_eq!(problem.get_variable_index_by_uuid(walls_uuid), Some(0));
            assert_eq!(problem.get_variable_index_by_uuid(roof_uuid), Some(1));
            assert_eq!(problem.get_variable_index_by_uuid(Uuid::new_v4()), None);
        }

        #[test]
        fn create_data_point_validates_length_and_range() {
            let problem = Problem::new("P", vec![binary("a").into(), binary("b").into()]);

            assert!(matches!(
                problem.create_data_point(vec![VariableValue::Discrete(0)]),
                Err(ProblemError::ValueCount { expected: 2, found: 1 })
            ));
            assert!(matches!(
                problem.create_data_point(vec![VariableValue::Discrete(0), VariableValue::Discrete(2)]),
                Err(ProblemError::InvalidValue { .. })
            ));
            let dp = problem
                .create_data_point(vec![VariableValue::Discrete(0), VariableValue::Discrete(1)])
                .unwrap();
            assert!(problem.is_valid(&dp));
        }

        #[test]
        fn data_point_from_another_problem_is_rejected() {
            let a = Problem::new("A", vec![binary("x").into()]);
            let b = Problem::new("B", vec![binary("x").into()]);
            let dp = a.create_data_point(vec![VariableValue::Discrete(1)]).unwrap();
            assert!(matches!(
                b.validate_data_point(&dp),
                Err(ProblemError::WrongProblem { .. })
            ));
        }

        #[test]
        fn combinatorial_size_multiplies_perturbation_counts() {
            let mut three = binary("c");
            if let VariableKind::Discrete(d) = &mut three.kind {
                *d = crate::core::models::variable::DiscreteVariable::new(vec![
                    Perturbation::null("0"),
                    Perturbation::ruleset("1", "1.xml"),
                    Perturbation::ruleset("2", "2.xml").with_selected(false),
                ]);
            }
            let problem = Problem::new("P", vec![binary("a").into(), three.into()]);
            assert_eq!(problem.combinatorial_size(false), Some(6));
            assert_eq!(problem.combinatorial_size(true), Some(4));

            let mixed = Problem::new("Q", vec![binary("a").into(), bound("wwr", "wwr.rb").into()]);
            assert_eq!(mixed.combinatorial_size(false), None);
        }
    }

    mod workflows {
        use super::*;

        #[test]
        fn null_perturbations_contribute_nothing() {
            let problem = Problem::new(
                "P",
                vec![
                    binary("walls").into(),
                    WorkItem::new(JobType::EnergyPlus).into(),
                ],
            );
            let dp = problem.create_data_point(vec![VariableValue::Discrete(0)]).unwrap();
            let workflow = problem.create_workflow(&dp).unwrap();
            assert_eq!(workflow.items, vec![WorkItem::new(JobType::EnergyPlus)]);
        }

        #[test]
        fn ruby_perturbation_becomes_user_script() {
            let mut args = BTreeMap::new();
            args.insert("r_value".to_string(), "30".to_string());
            let variable = Variable::discrete(
                "roof",
                vec![Perturbation::null("None"), Perturbation::ruby("R-30", "roof.rb", args)],
            );
            let problem = Problem::new("P", vec![variable.into()]);
            let dp = problem.create_data_point(vec![VariableValue::Discrete(1)]).unwrap();
            let workflow = problem.create_workflow(&dp).unwrap();

            assert_eq!(workflow.len(), 1);
            assert_eq!(workflow.items[0].job_type, JobType::UserScript);
            assert_eq!(workflow.items[0].arguments["r_value"], "30");
        }

        #[test]
        fn consecutive_continuous_variables_share_a_measure() {
            let problem = Problem::new(
                "P",
                vec![
                    bound("width", "window.rb").into(),
                    bound("height", "window.rb").into(),
                    bound("overhang", "shade.rb").into(),
                ],
            );
            let dp = problem
                .create_data_point(vec![
                    VariableValue::Continuous(0.5),
                    VariableValue::Continuous(0.25),
                    VariableValue::Continuous(1.0),
                ])
                .unwrap();
            let workflow = problem.create_workflow(&dp).unwrap();

            assert_eq!(workflow.len(), 2);
            assert_eq!(workflow.items[0].arguments.len(), 2);
            assert_eq!(workflow.items[0].arguments["width"], "0.5");
            assert_eq!(workflow.items[1].file, Some(PathBuf::from("shade.rb")));
        }
    }

    mod results {
        use super::*;

        fn problem_with_objective() -> (Problem, Uuid) {
            let walls = binary("walls");
            let walls_uuid = walls.uuid;
            let objective = LinearFunction::new("Cost")
                .with_attribute(1.0, "baseline")
                .with_input(-3.0, walls_uuid);
            let response = LinearFunction::new("EUI").with_attribute(0.5, "site_energy");
            let problem = Problem::new("P", vec![walls.into()])
                .with_objectives(vec![objective])
                .with_responses(vec![response]);
            (problem, walls_uuid)
        }

        #[test]
        fn successful_outcome_fills_responses_and_objectives() {
            let (problem, _) = problem_with_objective();
            let mut dp = problem.create_data_point(vec![VariableValue::Discrete(1)]).unwrap();
            let outcome = JobOutcome::succeeded(
                Uuid::new_v4(),
                vec![Attribute::new("baseline", 20.0), Attribute::new("site_energy", 100.0)],
            );

            problem.update_data_point(&mut dp, &outcome);

            assert!(dp.is_successful());
            assert_eq!(dp.objective_values(), &[17.0]);
            assert_eq!(dp.response_values(), &[50.0]);
        }

        #[test]
        fn ambiguous_attribute_marks_point_failed() {
            let (problem, _) = problem_with_objective();
            let mut dp = problem.create_data_point(vec![VariableValue::Discrete(0)]).unwrap();
            let outcome = JobOutcome::succeeded(
                Uuid::new_v4(),
                vec![
                    Attribute::new("baseline", 20.0),
                    Attribute::new("baseline", 21.0),
                    Attribute::new("site_energy", 1.0),
                ],
            );

            problem.update_data_point(&mut dp, &outcome);

            assert!(dp.is_complete());
            assert!(dp.is_failed());
            assert!(dp.errors()[0].contains("ambiguous"));
        }

        #[test]
        fn agreeing_duplicates_are_not_ambiguous() {
            let attributes = vec![Attribute::new("x", 2.0), Attribute::new("x", 2.0)];
            assert_eq!(resolve_attribute("x", &attributes), Ok(2.0));
            assert_eq!(
                resolve_attribute("y", &attributes),
                Err(ProblemError::MissingValue("y".to_string()))
            );
        }

        #[test]
        fn failed_job_is_recorded_without_results() {
            let (problem, _) = problem_with_objective();
            let mut dp = problem.create_data_point(vec![VariableValue::Discrete(0)]).unwrap();

            problem.update_data_point(&mut dp, &JobOutcome::failed(Uuid::new_v4(), "EnergyPlus crashed"));

            assert!(dp.is_failed());
            assert!(dp.objective_values().is_empty());
            assert_eq!(dp.errors(), &["EnergyPlus crashed".to_string()]);
        }

        #[test]
        fn reported_responses_take_precedence() {
            let (problem, _) = problem_with_objective();
            let mut dp = problem.create_data_point(vec![VariableValue::Discrete(0)]).unwrap();
            let mut outcome = JobOutcome::succeeded(Uuid::new_v4(), vec![Attribute::new("baseline", 20.0)]);
            outcome.response_values = Some(vec![42.0]);

            problem.update_data_point(&mut dp, &outcome);

            assert!(dp.is_successful());
            assert_eq!(dp.response_values(), &[42.0]);
        }
    }
}
