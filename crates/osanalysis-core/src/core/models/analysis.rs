use super::algorithm::Algorithm;
use super::data_point::DataPoint;
use super::ids::DataPointId;
use super::job::JobOutcome;
use super::problem::{Problem, ProblemError};
use super::summary::SummaryTable;
use super::variable::VariableValue;
use super::workflow::{FileReference, FileReferenceType};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("DataPoint {uuid} is already part of the analysis")]
    DuplicateDataPoint { uuid: Uuid },

    #[error("DataPoint {uuid} has the same variable values as existing DataPoint {existing}")]
    DuplicateVariableValues { uuid: Uuid, existing: Uuid },

    #[error("DataPoint {uuid} was created for a different problem")]
    WrongProblem { uuid: Uuid },

    #[error("Invalid DataPoint: {0}")]
    InvalidDataPoint(#[from] ProblemError),

    #[error("Algorithm {algorithm} cannot be used with this problem: {reason}")]
    IncompatibleAlgorithm { algorithm: String, reason: String },

    #[error("Expected {expected} file but '{path}' is of type {found:?}")]
    InvalidFileType {
        expected: &'static str,
        found: FileReferenceType,
        path: String,
    },

    #[error("DataPoint {0} is not part of the analysis")]
    UnknownDataPoint(Uuid),
}

/// A Problem, its seed model, the active algorithm and every DataPoint ever created for it.
///
/// DataPoints live in an arena and are never removed. Their insertion order is kept and is
/// the order every query reports them in. Mutations through the analysis mint a new analysis
/// version UUID and raise the dirty flag so callers know a save is due.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "AnalysisRecord", try_from = "AnalysisRecord")]
pub struct Analysis {
    uuid: Uuid,
    version_uuid: Uuid,
    name: String,
    display_name: Option<String>,
    problem: Problem,
    algorithm: Option<Algorithm>,
    seed: FileReference,
    weather_file: Option<FileReference>,
    data_points: SlotMap<DataPointId, DataPoint>,
    order: Vec<DataPointId>,
    index: HashMap<Uuid, DataPointId>,
    results_are_invalid: bool,
    dirty: bool,
}

impl Analysis {
    /// Creates an empty analysis.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the analysis.
    /// * `problem` - The design space and simulation recipe.
    /// * `seed` - The baseline model every workflow perturbs.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidFileType`] if the seed is not an OSM or IDF file.
    pub fn new(name: &str, problem: Problem, seed: FileReference) -> Result<Self, AnalysisError> {
        check_seed(&seed)?;
        Ok(Self {
            uuid: Uuid::new_v4(),
            version_uuid: Uuid::new_v4(),
            name: name.to_string(),
            display_name: None,
            problem,
            algorithm: None,
            seed,
            weather_file: None,
            data_points: SlotMap::with_key(),
            order: Vec::new(),
            index: HashMap::new(),
            results_are_invalid: false,
            dirty: true,
        })
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Result<Self, AnalysisError> {
        self.set_algorithm(algorithm)?;
        Ok(self)
    }

    /// Rebuilds an equivalent analysis around a supplied DataPoint collection.
    ///
    /// The result shares this analysis's UUID, problem, algorithm and files but carries a new
    /// version UUID, as if it had been saved and loaded again.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection contains duplicates or points that are not valid
    /// for the problem.
    pub fn restore(&self, data_points: Vec<DataPoint>) -> Result<Self, AnalysisError> {
        let mut restored = Self {
            uuid: self.uuid,
            version_uuid: Uuid::new_v4(),
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            problem: self.problem.clone(),
            algorithm: self.algorithm.clone(),
            seed: self.seed.clone(),
            weather_file: self.weather_file.clone(),
            data_points: SlotMap::with_key(),
            order: Vec::new(),
            index: HashMap::new(),
            results_are_invalid: self.results_are_invalid,
            dirty: false,
        };
        for data_point in data_points {
            restored.insert(data_point)?;
        }
        Ok(restored)
    }

    /// A copy holding only the problem formulation: no DataPoints and a fresh algorithm.
    pub fn problem_formulation(&self) -> Self {
        let mut algorithm = self.algorithm.clone();
        if let Some(algorithm) = algorithm.as_mut() {
            algorithm.reset();
        }
        Self {
            uuid: self.uuid,
            version_uuid: self.version_uuid,
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            problem: self.problem.clone(),
            algorithm,
            seed: self.seed.clone(),
            weather_file: self.weather_file.clone(),
            data_points: SlotMap::with_key(),
            order: Vec::new(),
            index: HashMap::new(),
            results_are_invalid: false,
            dirty: self.dirty,
        }
    }

    fn touch(&mut self) {
        self.version_uuid = Uuid::new_v4();
        self.dirty = true;
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

    pub fn set_display_name(&mut self, display_name: Option<String>) {
        self.display_name = display_name;
        self.touch();
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn algorithm(&self) -> Option<&Algorithm> {
        self.algorithm.as_ref()
    }

    pub fn seed(&self) -> &FileReference {
        &self.seed
    }

    pub fn weather_file(&self) -> Option<&FileReference> {
        self.weather_file.as_ref()
    }

    /// Set when the seed changed after results were recorded. Such an analysis refuses to run
    /// until [`Analysis::clear_all_results`] is called.
    pub fn results_are_invalid(&self) -> bool {
        self.results_are_invalid
    }

    /// Whether the analysis changed since the dirty flag was last cleared.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Replaces the seed model.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidFileType`] if the seed is not an OSM or IDF file.
    pub fn set_seed(&mut self, seed: FileReference) -> Result<(), AnalysisError> {
        check_seed(&seed)?;
        if self.data_points().any(DataPoint::is_complete) {
            warn!(
                "Seed of analysis '{}' changed while results exist; results are now invalid.",
                self.name
            );
            self.results_are_invalid = true;
        }
        self.seed = seed;
        self.touch();
        Ok(())
    }

    /// Sets or clears the weather file.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidFileType`] if the file is not an EPW file.
    pub fn set_weather_file(&mut self, weather_file: Option<FileReference>) -> Result<(), AnalysisError> {
        if let Some(file) = &weather_file {
            if file.file_type != FileReferenceType::Epw {
                return Err(AnalysisError::InvalidFileType {
                    expected: "EPW",
                    found: file.file_type,
                    path: file.path.display().to_string(),
                });
            }
        }
        self.weather_file = weather_file;
        self.touch();
        Ok(())
    }

    /// Attaches an algorithm after checking it can work on the problem.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::IncompatibleAlgorithm`] with the reason for the rejection.
    pub fn set_algorithm(&mut self, algorithm: Algorithm) -> Result<(), AnalysisError> {
        algorithm
            .check_compatibility(&self.problem)
            .map_err(|reason| AnalysisError::IncompatibleAlgorithm {
                algorithm: algorithm.name().to_string(),
                reason,
            })?;
        self.algorithm = Some(algorithm);
        self.touch();
        Ok(())
    }

    pub fn clear_algorithm(&mut self) {
        self.algorithm = None;
        self.touch();
    }

    pub(crate) fn take_algorithm(&mut self) -> Option<Algorithm> {
        self.algorithm.take()
    }

    pub(crate) fn put_algorithm(&mut self, algorithm: Algorithm) {
        self.algorithm = Some(algorithm);
        self.touch();
    }

    fn insert(&mut self, data_point: DataPoint) -> Result<DataPointId, AnalysisError> {
        let uuid = data_point.uuid();
        if self.index.contains_key(&uuid) {
            return Err(AnalysisError::DuplicateDataPoint { uuid });
        }
        self.problem
            .validate_data_point(&data_point)
            .map_err(|e| match e {
                ProblemError::WrongProblem { .. } => AnalysisError::WrongProblem { uuid },
                other => AnalysisError::InvalidDataPoint(other),
            })?;
        if let Some(existing) = self.get_data_point_by_values(data_point.variable_values()) {
            return Err(AnalysisError::DuplicateVariableValues {
                uuid,
                existing: existing.uuid(),
            });
        }

        let id = self.data_points.insert(data_point);
        self.order.push(id);
        self.index.insert(uuid, id);
        Ok(id)
    }

    /// Appends a DataPoint.
    ///
    /// A rejected add leaves the analysis untouched.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::DuplicateDataPoint`] if the UUID is already present,
    /// [`AnalysisError::DuplicateVariableValues`] if another point sits at the same location,
    /// [`AnalysisError::WrongProblem`] or [`AnalysisError::InvalidDataPoint`] if the point
    /// does not belong to this problem.
    pub fn add_data_point(&mut self, data_point: DataPoint) -> Result<DataPointId, AnalysisError> {
        let uuid = data_point.uuid();
        let id = self.insert(data_point)?;
        debug!(data_point = %uuid, "Added DataPoint to analysis '{}'.", self.name);
        self.touch();
        Ok(id)
    }

    /// Creates a DataPoint at the given location and appends it.
    pub fn create_data_point(&mut self, values: Vec<VariableValue>) -> Result<Uuid, AnalysisError> {
        let data_point = self.problem.create_data_point(values)?;
        let uuid = data_point.uuid();
        self.add_data_point(data_point)?;
        Ok(uuid)
    }

    pub fn num_data_points(&self) -> usize {
        self.order.len()
    }

    /// Every DataPoint in insertion order.
    pub fn data_points(&self) -> impl Iterator<Item = &DataPoint> {
        self.order.iter().filter_map(|id| self.data_points.get(*id))
    }

    pub fn data_point(&self, id: DataPointId) -> Option<&DataPoint> {
        self.data_points.get(id)
    }

    pub fn data_point_id(&self, uuid: Uuid) -> Option<DataPointId> {
        self.index.get(&uuid).copied()
    }

    pub fn data_point_by_uuid(&self, uuid: Uuid) -> Option<&DataPoint> {
        self.data_point_id(uuid).and_then(|id| self.data_points.get(id))
    }

    /// Mutable access to a DataPoint. Marks the analysis as changed.
    pub fn data_point_mut(&mut self, uuid: Uuid) -> Option<&mut DataPoint> {
        let id = self.data_point_id(uuid)?;
        self.touch();
        self.data_points.get_mut(id)
    }

    fn require_mut(&mut self, uuid: Uuid) -> Result<&mut DataPoint, AnalysisError> {
        self.data_point_mut(uuid)
            .ok_or(AnalysisError::UnknownDataPoint(uuid))
    }

    pub fn complete_data_points(&self) -> Vec<&DataPoint> {
        self.data_points().filter(|dp| dp.is_complete()).collect()
    }

    pub fn successful_data_points(&self) -> Vec<&DataPoint> {
        self.data_points().filter(|dp| dp.is_successful()).collect()
    }

    pub fn failed_data_points(&self) -> Vec<&DataPoint> {
        self.data_points().filter(|dp| dp.is_failed()).collect()
    }

    /// Selected points that are neither complete nor already dispatched.
    pub fn data_points_to_queue(&self) -> Vec<&DataPoint> {
        self.data_points()
            .filter(|dp| dp.is_selected() && !dp.is_complete() && dp.job_uuid().is_none())
            .collect()
    }

    pub fn get_data_points_by_tag(&self, tag: &str) -> Vec<&DataPoint> {
        self.data_points().filter(|dp| dp.has_tag(tag)).collect()
    }

    /// Every DataPoint matching a (possibly partial) value vector.
    ///
    /// `Unassigned` entries act as wildcards; a shorter vector constrains only the leading
    /// variables.
    pub fn get_data_points_by_values(&self, values: &[VariableValue]) -> Vec<&DataPoint> {
        self.data_points().filter(|dp| dp.matches(values)).collect()
    }

    /// The DataPoint at exactly this location, if any.
    pub fn get_data_point_by_values(&self, values: &[VariableValue]) -> Option<&DataPoint> {
        self.data_points()
            .find(|dp| dp.variable_values().len() == values.len() && dp.matches(values))
    }

    /// Adds a tag to a DataPoint.
    ///
    /// # Return
    ///
    /// Returns `Ok(false)` if the point already carried the tag.
    pub fn add_tag(&mut self, uuid: Uuid, tag: &str) -> Result<bool, AnalysisError> {
        Ok(self.require_mut(uuid)?.add_tag(tag))
    }

    pub fn remove_tag(&mut self, uuid: Uuid, tag: &str) -> Result<bool, AnalysisError> {
        Ok(self.require_mut(uuid)?.remove_tag(tag))
    }

    /// Writes a job's outcome onto the DataPoint it was run for.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::UnknownDataPoint`] if the point is not in this analysis.
    pub fn record_outcome(&mut self, uuid: Uuid, outcome: &JobOutcome) -> Result<(), AnalysisError> {
        let id = self
            .data_point_id(uuid)
            .ok_or(AnalysisError::UnknownDataPoint(uuid))?;
        if let Some(data_point) = self.data_points.get_mut(id) {
            self.problem.update_data_point(data_point, outcome);
        }
        self.touch();
        Ok(())
    }

    pub fn clear_results(&mut self, uuid: Uuid) -> Result<(), AnalysisError> {
        self.require_mut(uuid)?.clear_results();
        Ok(())
    }

    /// Returns every DataPoint to the not-run state and restarts the algorithm.
    pub fn clear_all_results(&mut self) {
        for data_point in self.data_points.values_mut() {
            data_point.clear_results();
        }
        if let Some(algorithm) = self.algorithm.as_mut() {
            algorithm.reset();
        }
        self.results_are_invalid = false;
        self.touch();
    }

    pub fn summary_table(&self) -> SummaryTable {
        SummaryTable::from_analysis(self)
    }
}

fn check_seed(seed: &FileReference) -> Result<(), AnalysisError> {
    match seed.file_type {
        FileReferenceType::Osm | FileReferenceType::Idf => Ok(()),
        found => Err(AnalysisError::InvalidFileType {
            expected: "OSM or IDF",
            found,
            path: seed.path.display().to_string(),
        }),
    }
}

/// The persisted shape of an [`Analysis`]: the arena is flattened to an ordered list.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnalysisRecord {
    uuid: Uuid,
    version_uuid: Uuid,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    problem: Problem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    algorithm: Option<Algorithm>,
    seed: FileReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    weather_file: Option<FileReference>,
    #[serde(default)]
    results_are_invalid: bool,
    #[serde(default)]
    data_points: Vec<DataPoint>,
}

impl From<Analysis> for AnalysisRecord {
    fn from(analysis: Analysis) -> Self {
        let Analysis {
            uuid,
            version_uuid,
            name,
            display_name,
            problem,
            algorithm,
            seed,
            weather_file,
            mut data_points,
            order,
            results_are_invalid,
            ..
        } = analysis;
        let data_points = order
            .into_iter()
            .filter_map(|id| data_points.remove(id))
            .collect();
        Self {
            uuid,
            version_uuid,
            name,
            display_name,
            problem,
            algorithm,
            seed,
            weather_file,
            results_are_invalid,
            data_points,
        }
    }
}

impl TryFrom<AnalysisRecord> for Analysis {
    type Error = AnalysisError;

    fn try_from(record: AnalysisRecord) -> Result<Self, Self::Error> {
        check_seed(&record.seed)?;
        let mut analysis = Self {
            uuid: record.uuid,
            version_uuid: record.version_uuid,
            name: record.name,
            display_name: record.display_name,
            problem: record.problem,
            algorithm: record.algorithm,
            seed: record.seed,
            weather_file: record.weather_file,
            data_points: SlotMap::with_key(),
            order: Vec::new(),
            index: HashMap::new(),
            results_are_invalid: record.results_are_invalid,
            dirty: false,
        };
        for data_point in record.data_points {
            analysis.insert(data_point)?;
        }
        Ok(analysis)
    }
}
