use super::variable::Variable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// The file formats an analysis refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileReferenceType {
    Osm,
    Idf,
    Epw,
    Sql,
    Xml,
    Unknown,
}

impl FileReferenceType {
    /// Infers the type from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("osm") => Self::Osm,
            Some("idf") => Self::Idf,
            Some("epw") => Self::Epw,
            Some("sql") => Self::Sql,
            Some("xml") => Self::Xml,
            _ => Self::Unknown,
        }
    }
}

/// An opaque reference to a file on disk. The analysis never inspects the contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReference {
    pub uuid: Uuid,
    pub path: PathBuf,
    pub file_type: FileReferenceType,
}

impl FileReference {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_type = FileReferenceType::from_path(&path);
        Self {
            uuid: Uuid::new_v4(),
            path,
            file_type,
        }
    }
}

/// The kind of job a work item asks the backend to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    ModelRuleset,
    UserScript,
    ModelToIdf,
    ExpandObjects,
    EnergyPlus,
    Custom(String),
}

/// One concrete step of a materialized workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub job_type: JobType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub arguments: BTreeMap<String, String>,
}

impl WorkItem {
    pub fn new(job_type: JobType) -> Self {
        Self {
            job_type,
            file: None,
            arguments: BTreeMap::new(),
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_argument(mut self, name: &str, value: &str) -> Self {
        self.arguments.insert(name.to_string(), value.to_string());
        self
    }
}

/// A step of a problem's simulation recipe: either a design variable or a fixed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "step")]
pub enum WorkflowStep {
    Variable(Variable),
    WorkItem(WorkItem),
}

impl WorkflowStep {
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            WorkflowStep::Variable(v) => Some(v),
            WorkflowStep::WorkItem(_) => None,
        }
    }
}

impl From<Variable> for WorkflowStep {
    fn from(variable: Variable) -> Self {
        WorkflowStep::Variable(variable)
    }
}

impl From<WorkItem> for WorkflowStep {
    fn from(item: WorkItem) -> Self {
        WorkflowStep::WorkItem(item)
    }
}

/// The runnable recipe for a single DataPoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Workflow {
    pub items: Vec<WorkItem>,
}

impl Workflow {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
