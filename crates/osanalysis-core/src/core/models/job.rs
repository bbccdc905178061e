use super::function::Attribute;
use super::variable::VariableValue;
use super::workflow::{FileReference, Workflow};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Everything a job-running backend needs to evaluate one DataPoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub uuid: Uuid,
    pub data_point_uuid: Uuid,
    pub analysis_name: String,
    pub variable_values: Vec<VariableValue>,
    pub workflow: Workflow,
    pub seed: FileReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_file: Option<FileReference>,
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Succeeded,
    Failed,
    /// The job was stopped before it produced a result.
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMessage {
    pub level: MessageLevel,
    pub text: String,
}

impl JobMessage {
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Error,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Warning,
            text: text.into(),
        }
    }
}

/// The terminal result of a job as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_uuid: Uuid,
    pub status: JobStatus,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    /// Response values computed by the job itself. When absent they are derived from the
    /// attributes by the problem's response functions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_values: Option<Vec<f64>>,
    #[serde(default)]
    pub messages: Vec<JobMessage>,
}

impl JobOutcome {
    pub fn succeeded(job_uuid: Uuid, attributes: Vec<Attribute>) -> Self {
        Self {
            job_uuid,
            status: JobStatus::Succeeded,
            attributes,
            response_values: None,
            messages: Vec::new(),
        }
    }

    pub fn failed(job_uuid: Uuid, message: impl Into<String>) -> Self {
        Self {
            job_uuid,
            status: JobStatus::Failed,
            attributes: Vec::new(),
            response_values: None,
            messages: vec![JobMessage::error(message)],
        }
    }

    pub fn canceled(job_uuid: Uuid) -> Self {
        Self {
            job_uuid,
            status: JobStatus::Canceled,
            attributes: Vec::new(),
            response_values: None,
            messages: Vec::new(),
        }
    }

    /// A job succeeded if its status says so and it reported no error messages.
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Succeeded
            && !self.messages.iter().any(|m| m.level == MessageLevel::Error)
    }
}
