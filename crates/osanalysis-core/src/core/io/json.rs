use super::traits::AnalysisFile;
use crate::core::models::analysis::Analysis;
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Write};
use thiserror::Error;

/// Version of the JSON document layout written by this library.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum JsonFileError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported analysis document version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// How much of an analysis a document holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SaveScope {
    /// The problem, algorithm, files and every DataPoint with its results.
    #[default]
    Full,
    /// Only what is needed to start the study over: no DataPoints and a fresh algorithm.
    ProblemFormulation,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JsonMetadata {
    #[serde(default)]
    pub scope: SaveScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
}

impl JsonMetadata {
    pub fn full() -> Self {
        Self {
            scope: SaveScope::Full,
            generator: Some(generator()),
        }
    }

    pub fn problem_formulation() -> Self {
        Self {
            scope: SaveScope::ProblemFormulation,
            generator: Some(generator()),
        }
    }
}

fn generator() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct DocumentRef<'a> {
    format_version: u32,
    metadata: &'a JsonMetadata,
    analysis: &'a Analysis,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Document {
    format_version: u32,
    #[serde(default)]
    metadata: JsonMetadata,
    analysis: Analysis,
}

/// Versioned JSON analysis documents.
///
/// Floating-point values survive a write/read cycle bit for bit, as do every UUID and
/// version UUID, tag and value vector.
pub struct JsonAnalysisFile;

impl AnalysisFile for JsonAnalysisFile {
    type Metadata = JsonMetadata;
    type Error = JsonFileError;

    fn read_from(reader: &mut impl BufRead) -> Result<(Analysis, Self::Metadata), Self::Error> {
        let document: Document = serde_json::from_reader(reader)?;
        if document.format_version != FORMAT_VERSION {
            return Err(JsonFileError::UnsupportedVersion {
                found: document.format_version,
                expected: FORMAT_VERSION,
            });
        }
        Ok((document.analysis, document.metadata))
    }

    fn write_to(
        analysis: &Analysis,
        metadata: &Self::Metadata,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error> {
        let formulation;
        let analysis = match metadata.scope {
            SaveScope::Full => analysis,
            SaveScope::ProblemFormulation => {
                formulation = analysis.problem_formulation();
                &formulation
            }
        };
        let document = DocumentRef {
            format_version: FORMAT_VERSION,
            metadata,
            analysis,
        };
        serde_json::to_writer_pretty(&mut *writer, &document)?;
        writeln!(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::data_point::DataPoint;
    use crate::core::models::problem::Problem;
    use crate::core::models::variable::{ContinuousVariable, Variable, VariableValue};
    use crate::core::models::workflow::FileReference;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn analysis() -> Analysis {
        let variable = Variable::continuous(
            "wwr",
            ContinuousVariable {
                minimum: Some(0.0),
                maximum: Some(1.0),
                ..Default::default()
            },
        );
        let problem = Problem::new("Glazing", vec![variable.into()]);
        let mut analysis = Analysis::new("Study", problem, FileReference::new("seed.osm")).unwrap();
        let uuid = analysis
            .create_data_point(vec![VariableValue::Continuous(0.1 + 0.2)])
            .unwrap();
        let dp = analysis.data_point_mut(uuid).unwrap();
        dp.add_tag("explored");
        dp.set_objective_values(vec![1.0 / 3.0, 2.0_f64.sqrt()]);
        dp.mark_complete();
        analysis
    }

    #[test]
    fn full_document_round_trips_exactly() {
        let original = analysis();
        let mut buffer = Vec::new();
        JsonAnalysisFile::write_to(&original, &JsonMetadata::full(), &mut buffer).unwrap();

        let (loaded, metadata) = JsonAnalysisFile::read_from(&mut Cursor::new(buffer)).unwrap();

        assert_eq!(metadata.scope, SaveScope::Full);
        assert_eq!(loaded.uuid(), original.uuid());
        assert_eq!(loaded.version_uuid(), original.version_uuid());
        let before: Vec<&DataPoint> = original.data_points().collect();
        let after: Vec<&DataPoint> = loaded.data_points().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn problem_formulation_omits_data_points() {
        let original = analysis();
        let mut buffer = Vec::new();
        JsonAnalysisFile::write_to(&original, &JsonMetadata::problem_formulation(), &mut buffer)
            .unwrap();

        let (loaded, metadata) = JsonAnalysisFile::read_from(&mut Cursor::new(buffer)).unwrap();

        assert_eq!(metadata.scope, SaveScope::ProblemFormulation);
        assert_eq!(loaded.num_data_points(), 0);
        assert_eq!(loaded.problem(), original.problem());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let original = analysis();
        let mut buffer = Vec::new();
        JsonAnalysisFile::write_to(&original, &JsonMetadata::full(), &mut buffer).unwrap();
        let text = String::from_utf8(buffer)
            .unwrap()
            .replacen("\"format-version\": 1", "\"format-version\": 99", 1);

        let result = JsonAnalysisFile::read_from(&mut Cursor::new(text.into_bytes()));

        assert!(matches!(
            result,
            Err(JsonFileError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn path_helpers_write_and_read_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("analysis.json");
        let original = analysis();

        JsonAnalysisFile::write_to_path(&original, &JsonMetadata::full(), &path).unwrap();
        let (loaded, _) = JsonAnalysisFile::read_from_path(&path).unwrap();

        assert_eq!(loaded.num_data_points(), 1);
    }
}
