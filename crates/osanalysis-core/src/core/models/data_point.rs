use super::function::Attribute;
use super::variable::VariableValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Where a DataPoint is meant to be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunType {
    #[default]
    Local,
    External,
}

/// A single point in the design space together with its evaluation outcome.
///
/// The value vector is positional: entry `i` is the value of the problem's variable `i`.
/// Every mutation mints a new version UUID so that stale copies can be detected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    uuid: Uuid,
    version_uuid: Uuid,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    problem_uuid: Uuid,
    variable_values: Vec<VariableValue>,
    complete: bool,
    failed: bool,
    selected: bool,
    #[serde(default)]
    run_type: RunType,
    #[serde(default)]
    tags: BTreeSet<String>,
    #[serde(default)]
    response_values: Vec<f64>,
    #[serde(default)]
    objective_values: Vec<f64>,
    #[serde(default)]
    output_attributes: Vec<Attribute>,
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    directory: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    job_uuid: Option<Uuid>,
}

impl DataPoint {
    /// Creates an unevaluated, selected DataPoint.
    ///
    /// Points are normally created through
    /// [`Problem::create_data_point`](super::problem::Problem::create_data_point), which
    /// validates the values first.
    pub(crate) fn new(problem_uuid: Uuid, variable_values: Vec<VariableValue>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            version_uuid: Uuid::new_v4(),
            name: String::new(),
            description: None,
            problem_uuid,
            variable_values,
            complete: false,
            failed: false,
            selected: true,
            run_type: RunType::Local,
            tags: BTreeSet::new(),
            response_values: Vec::new(),
            objective_values: Vec::new(),
            output_attributes: Vec::new(),
            errors: Vec::new(),
            directory: None,
            job_uuid: None,
        }
    }

    fn touch(&mut self) {
        self.version_uuid = Uuid::new_v4();
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

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn problem_uuid(&self) -> Uuid {
        self.problem_uuid
    }

    pub fn variable_values(&self) -> &[VariableValue] {
        &self.variable_values
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Complete and not failed.
    pub fn is_successful(&self) -> bool {
        self.complete && !self.failed
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn run_type(&self) -> RunType {
        self.run_type
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn response_values(&self) -> &[f64] {
        &self.response_values
    }

    pub fn objective_values(&self) -> &[f64] {
        &self.objective_values
    }

    pub fn output_attributes(&self) -> &[Attribute] {
        &self.output_attributes
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// The job this point was dispatched under, if any.
    pub fn job_uuid(&self) -> Option<Uuid> {
        self.job_uuid
    }

    /// Dispatched to a backend and not yet harvested.
    pub fn is_in_flight(&self) -> bool {
        self.job_uuid.is_some() && !self.complete
    }

    /// Tests whether this point sits at the given (possibly partial) location.
    ///
    /// # Arguments
    ///
    /// * `values` - A prefix of the value vector. `Unassigned` entries match anything.
    ///
    /// # Return
    ///
    /// Returns `false` if `values` is longer than this point's value vector.
    pub fn matches(&self, values: &[VariableValue]) -> bool {
        values.len() <= self.variable_values.len()
            && self
                .variable_values
                .iter()
                .zip(values)
                .all(|(mine, query)| mine.satisfies(query))
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
        self.touch();
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
        self.touch();
    }

    pub fn set_selected(&mut self, selected: bool) {
        if self.selected != selected {
            self.selected = selected;
            self.touch();
        }
    }

    pub fn set_run_type(&mut self, run_type: RunType) {
        self.run_type = run_type;
        self.touch();
    }

    /// Adds a tag. Adding a tag that is already present is a no-op.
    ///
    /// # Return
    ///
    /// Returns `true` if the tag was newly added.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        let added = self.tags.insert(tag.to_string());
        if added {
            self.touch();
        }
        added
    }

    /// Removes a tag.
    ///
    /// # Return
    ///
    /// Returns `true` if the tag was present.
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let removed = self.tags.remove(tag);
        if removed {
            self.touch();
        }
        removed
    }

    /// Records that this point has been handed to a backend.
    pub fn set_run_information(&mut self, job_uuid: Uuid, directory: PathBuf) {
        self.job_uuid = Some(job_uuid);
        self.directory = Some(directory);
        self.touch();
    }

    /// Forgets the dispatch of an unfinished point so it can be queued again.
    pub fn clear_run_information(&mut self) {
        self.job_uuid = None;
        self.directory = None;
        self.touch();
    }

    pub fn mark_complete(&mut self) {
        self.complete = true;
        self.touch();
    }

    /// Marks the point as evaluated but unsuccessful. Failed points are also complete.
    pub fn mark_failed(&mut self) {
        self.complete = true;
        self.failed = true;
        self.touch();
    }

    pub fn set_response_values(&mut self, values: Vec<f64>) {
        self.response_values = values;
        self.touch();
    }

    pub fn set_objective_values(&mut self, values: Vec<f64>) {
        self.objective_values = values;
        self.touch();
    }

    pub fn set_output_attributes(&mut self, attributes: Vec<Attribute>) {
        self.output_attributes = attributes;
        self.touch();
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.touch();
    }

    /// Returns the point to the not-yet-run state. Tags and selection are kept.
    pub fn clear_results(&mut self) {
        self.complete = false;
        self.failed = false;
        self.response_values.clear();
        self.objective_values.clear();
        self.output_attributes.clear();
        self.errors.clear();
        self.job_uuid = None;
        self.directory = None;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> DataPoint {
        DataPoint::new(
            Uuid::new_v4(),
            vec![VariableValue::Discrete(1), VariableValue::Continuous(0.25)],
        )
    }

    mod lifecycle {
        use super::*;

        #[test]
        fn new_point_is_pending_and_selected() {
            let dp = point();
            assert!(!dp.is_complete());
            assert!(!dp.is_failed());
            assert!(dp.is_selected());
            assert!(!dp.is_in_flight());
        }

        #[test]
        fn every_mutation_mints_a_new_version() {
            let mut dp = point();
            let mut seen = vec![dp.version_uuid()];
            dp.add_tag("explored");
            seen.push(dp.version_uuid());
            dp.set_run_information(Uuid::new_v4(), PathBuf::from("runs/dataPoint1"));
            seen.push(dp.version_uuid());
            dp.mark_complete();
            seen.push(dp.version_uuid());
            let unique: BTreeSet<_> = seen.iter().collect();
            assert_eq!(unique.len(), seen.len());
        }

        #[test]
        fn failure_implies_completion() {
            let mut dp = point();
            dp.mark_failed();
            assert!(dp.is_complete());
            assert!(!dp.is_successful());
        }

        #[test]
        fn clear_results_keeps_tags() {
            let mut dp = point();
            dp.add_tag("curve0");
            dp.set_run_information(Uuid::new_v4(), PathBuf::from("runs/dataPoint1"));
            dp.set_objective_values(vec![1.0, 2.0]);
            dp.mark_failed();

            dp.clear_results();

            assert!(!dp.is_complete());
            assert!(!dp.is_failed());
            assert!(dp.objective_values().is_empty());
            assert!(dp.job_uuid().is_none());
            assert!(dp.has_tag("curve0"));
        }

        #[test]
        fn in_flight_until_complete() {
            let mut dp = point();
            dp.set_run_information(Uuid::new_v4(), PathBuf::from("runs/dataPoint1"));
            assert!(dp.is_in_flight());
            dp.mark_complete();
            assert!(!dp.is_in_flight());
        }
    }

    mod tags {
        use super::*;

        #[test]
        fn adding_existing_tag_is_a_noop() {
            let mut dp = point();
            assert!(dp.add_tag("current"));
            let version = dp.version_uuid();
            assert!(!dp.add_tag("current"));
            assert_eq!(dp.version_uuid(), version);
            assert_eq!(dp.tags().len(), 1);
        }

        #[test]
        fn remove_reports_presence() {
            let mut dp = point();
            dp.add_tag("current");
            assert!(dp.remove_tag("current"));
            assert!(!dp.remove_tag("current"));
        }
    }

    mod matching {
        use super::*;

        #[test]
        fn partial_queries_match_prefixes() {
            let dp = point();
            assert!(dp.matches(&[VariableValue::Discrete(1)]));
            assert!(dp.matches(&[VariableValue::Unassigned, VariableValue::Continuous(0.25)]));
            assert!(!dp.matches(&[VariableValue::Discrete(0)]));
            assert!(!dp.matches(&[
                VariableValue::Discrete(1),
                VariableValue::Continuous(0.25),
                VariableValue::Discrete(0),
            ]));
        }
    }
}
