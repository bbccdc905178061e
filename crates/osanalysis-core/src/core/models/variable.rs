use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Relative tolerance used when comparing continuous variable values.
const CONTINUOUS_TOLERANCE: f64 = 1.0e-9;

/// Compares two real values with a relative tolerance.
///
/// Values stored in a DataPoint come back from serialization and from increment
/// arithmetic, so exact equality is too strict for deciding whether two points
/// sit at the same location in the design space.
pub fn values_are_equal(a: f64, b: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= CONTINUOUS_TOLERANCE * scale
}

/// The value a single variable takes at a DataPoint.
///
/// Discrete variables are set by the index of one of their perturbations, continuous
/// variables by a real number. `Unassigned` marks a value that has not been chosen yet and
/// acts as a wildcard in value-vector queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type", content = "value")]
pub enum VariableValue {
    Unassigned,
    Discrete(usize),
    Continuous(f64),
}

impl VariableValue {
    pub fn is_assigned(&self) -> bool {
        !matches!(self, VariableValue::Unassigned)
    }

    pub fn as_discrete(&self) -> Option<usize> {
        match self {
            VariableValue::Discrete(index) => Some(*index),
            _ => None,
        }
    }

    /// Returns the numeric form of the value as used by linear functions.
    ///
    /// Discrete values contribute their perturbation index.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            VariableValue::Unassigned => None,
            VariableValue::Discrete(index) => Some(*index as f64),
            VariableValue::Continuous(value) => Some(*value),
        }
    }

    /// Tests whether this (concrete) value satisfies a query value.
    ///
    /// # Arguments
    ///
    /// * `query` - The value being searched for. `Unassigned` matches anything.
    ///
    /// # Return
    ///
    /// Returns `true` if the query is a wildcard or denotes the same value.
    pub fn satisfies(&self, query: &VariableValue) -> bool {
        match (self, query) {
            (_, VariableValue::Unassigned) => true,
            (VariableValue::Discrete(mine), VariableValue::Discrete(theirs)) => mine == theirs,
            (VariableValue::Continuous(mine), VariableValue::Continuous(theirs)) => {
                values_are_equal(*mine, *theirs)
            }
            _ => false,
        }
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableValue::Unassigned => write!(f, "unassigned"),
            VariableValue::Discrete(index) => write!(f, "#{}", index),
            VariableValue::Continuous(value) => write!(f, "{}", value),
        }
    }
}

/// The change a discrete choice applies to the seed model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum PerturbationKind {
    /// Applies no change to the seed model.
    Null,
    /// Applies an opaque model ruleset file.
    ModelRuleset { ruleset: PathBuf },
    /// Runs a Ruby measure script with fixed arguments.
    Ruby {
        script: PathBuf,
        #[serde(default)]
        arguments: BTreeMap<String, String>,
    },
}

/// One mutually exclusive choice offered by a [`DiscreteVariable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Perturbation {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Deselected perturbations stay addressable but are never proposed by algorithms.
    pub selected: bool,
    pub kind: PerturbationKind,
}

impl Perturbation {
    /// Creates a selected perturbation with a fresh UUID.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the perturbation.
    /// * `kind` - What the perturbation does to the seed model.
    pub fn new(name: &str, kind: PerturbationKind) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            display_name: None,
            description: None,
            selected: true,
            kind,
        }
    }

    /// Creates the identity perturbation.
    pub fn null(name: &str) -> Self {
        Self::new(name, PerturbationKind::Null)
    }

    pub fn ruleset(name: &str, ruleset: impl Into<PathBuf>) -> Self {
        Self::new(
            name,
            PerturbationKind::ModelRuleset {
                ruleset: ruleset.into(),
            },
        )
    }

    pub fn ruby(name: &str, script: impl Into<PathBuf>, arguments: BTreeMap<String, String>) -> Self {
        Self::new(
            name,
            PerturbationKind::Ruby {
                script: script.into(),
                arguments,
            },
        )
    }

    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, PerturbationKind::Null)
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

/// A design-space axis made of an ordered list of perturbations.
///
/// The value of the variable at a DataPoint is an index into this list, so the list is
/// fixed once the variable belongs to a [`Problem`](super::problem::Problem).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteVariable {
    perturbations: Vec<Perturbation>,
}

impl DiscreteVariable {
    pub fn new(perturbations: Vec<Perturbation>) -> Self {
        Self { perturbations }
    }

    pub fn perturbations(&self) -> &[Perturbation] {
        &self.perturbations
    }

    /// Counts the perturbations of this variable.
    ///
    /// # Arguments
    ///
    /// * `selected_only` - If `true`, deselected perturbations are not counted.
    pub fn num_perturbations(&self, selected_only: bool) -> usize {
        if selected_only {
            self.perturbations.iter().filter(|p| p.selected).count()
        } else {
            self.perturbations.len()
        }
    }

    /// Decodes a value index into its perturbation.
    ///
    /// # Return
    ///
    /// Returns `Some(&Perturbation)` if `index` is in range, otherwise `None`.
    pub fn perturbation(&self, index: usize) -> Option<&Perturbation> {
        self.perturbations.get(index)
    }

    /// Encodes a perturbation into its value index.
    ///
    /// # Return
    ///
    /// Returns the position of the perturbation with the given UUID, or `None` if it does
    /// not belong to this variable.
    pub fn perturbation_index(&self, uuid: Uuid) -> Option<usize> {
        self.perturbations.iter().position(|p| p.uuid == uuid)
    }

    /// Returns the index of the identity setting used for baseline points.
    ///
    /// This is the first null perturbation if there is one, and index 0 otherwise.
    pub fn null_index(&self) -> usize {
        self.perturbations
            .iter()
            .position(Perturbation::is_null)
            .unwrap_or(0)
    }

    /// Indices of the perturbations algorithms are allowed to propose, in list order.
    pub fn selected_indices(&self) -> Vec<usize> {
        self.perturbations
            .iter()
            .enumerate()
            .filter(|(_, p)| p.selected)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_valid(&self, value: &VariableValue) -> bool {
        matches!(value, VariableValue::Discrete(index) if *index < self.perturbations.len())
    }
}

/// Binds a continuous variable to one argument of a Ruby measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureBinding {
    pub script: PathBuf,
    pub argument: String,
}

/// A real-valued design-space axis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContinuousVariable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub increment: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_steps: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measure: Option<MeasureBinding>,
}

impl ContinuousVariable {
    pub fn is_valid(&self, value: &VariableValue) -> bool {
        let VariableValue::Continuous(v) = value else {
            return false;
        };
        if !v.is_finite() {
            return false;
        }
        if let Some(min) = self.minimum {
            if *v < min && !values_are_equal(*v, min) {
                return false;
            }
        }
        if let Some(max) = self.maximum {
            if *v > max && !values_are_equal(*v, max) {
                return false;
            }
        }
        true
    }

    /// The setting used for baseline points: the lower bound.
    pub fn baseline(&self) -> Option<f64> {
        self.minimum
    }

    /// The effective step between adjacent settings.
    ///
    /// An explicit increment wins; otherwise the range is split into `n_steps` intervals.
    pub fn step(&self) -> Option<f64> {
        if let Some(increment) = self.increment {
            return (increment > 0.0).then_some(increment);
        }
        match (self.minimum, self.maximum, self.n_steps) {
            (Some(min), Some(max), Some(n)) if n > 0 && max > min => Some((max - min) / n as f64),
            _ => None,
        }
    }

    /// Returns the settings one step below and above `value` that stay within bounds.
    ///
    /// # Return
    ///
    /// The neighboring values in increasing order; empty if the variable has no step.
    pub fn neighbors(&self, value: f64) -> Vec<f64> {
        let Some(step) = self.step() else {
            return Vec::new();
        };
        [value - step, value + step]
            .into_iter()
            .filter(|v| self.is_valid(&VariableValue::Continuous(*v)))
            .collect()
    }

    /// Maps a unit-interval coordinate onto the variable's range.
    ///
    /// When a step is defined the result is snapped to the nearest step from the minimum.
    ///
    /// # Return
    ///
    /// Returns `None` if either bound is missing.
    pub fn from_unit(&self, u: f64) -> Option<f64> {
        let (min, max) = (self.minimum?, self.maximum?);
        let raw = min + u.clamp(0.0, 1.0) * (max - min);
        let value = match self.step() {
            Some(step) => min + ((raw - min) / step).round() * step,
            None => raw,
        };
        Some(value.clamp(min, max))
    }
}

/// The two kinds of design-space axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum VariableKind {
    Discrete(DiscreteVariable),
    Continuous(ContinuousVariable),
}

/// A named design-space axis of a problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub uuid: Uuid,
    pub version_uuid: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub kind: VariableKind,
}

impl Variable {
    pub fn new(name: &str, kind: VariableKind) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            version_uuid: Uuid::new_v4(),
            name: name.to_string(),
            display_name: None,
            description: None,
            kind,
        }
    }

    /// Creates a discrete variable from an ordered perturbation list.
    pub fn discrete(name: &str, perturbations: Vec<Perturbation>) -> Self {
        Self::new(
            name,
            VariableKind::Discrete(DiscreteVariable::new(perturbations)),
        )
    }

    pub fn continuous(name: &str, variable: ContinuousVariable) -> Self {
        Self::new(name, VariableKind::Continuous(variable))
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn as_discrete(&self) -> Option<&DiscreteVariable> {
        match &self.kind {
            VariableKind::Discrete(d) => Some(d),
            VariableKind::Continuous(_) => None,
        }
    }

    pub fn as_continuous(&self) -> Option<&ContinuousVariable> {
        match &self.kind {
            VariableKind::Continuous(c) => Some(c),
            VariableKind::Discrete(_) => None,
        }
    }

    pub fn is_valid(&self, value: &VariableValue) -> bool {
        match &self.kind {
            VariableKind::Discrete(d) => d.is_valid(value),
            VariableKind::Continuous(c) => c.is_valid(value),
        }
    }

    /// The identity setting of this variable, used for baseline points.
    ///
    /// # Return
    ///
    /// Returns `None` for a discrete variable with no perturbations or a continuous variable
    /// without a lower bound.
    pub fn baseline_value(&self) -> Option<VariableValue> {
        match &self.kind {
            VariableKind::Discrete(d) if d.num_perturbations(false) > 0 => {
                Some(VariableValue::Discrete(d.null_index()))
            }
            VariableKind::Discrete(_) => None,
            VariableKind::Continuous(c) => c.baseline().map(VariableValue::Continuous),
        }
    }

    /// Human-readable label for a value of this variable.
    ///
    /// Discrete values are shown by perturbation name.
    pub fn value_label(&self, value: &VariableValue) -> String {
        match (&self.kind, value) {
            (VariableKind::Discrete(d), VariableValue::Discrete(index)) => d
                .perturbation(*index)
                .map(|p| p.display_name().to_string())
                .unwrap_or_else(|| value.to_string()),
            _ => value.to_string(),
        }
    }
}
