use crate::core::models::analysis::Analysis;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Defines the interface for reading and writing analysis documents.
///
/// Implementors handle a concrete on-disk format; the path-based helpers wrap the
/// reader/writer methods with buffered file handles.
pub trait AnalysisFile {
    /// Format-specific information stored next to the analysis.
    type Metadata;

    /// The error type for I/O and format errors.
    type Error: Error + From<io::Error>;

    /// Reads an analysis from a buffered reader.
    ///
    /// # Arguments
    ///
    /// * `reader` - The buffered reader to read from.
    ///
    /// # Return
    ///
    /// Returns the analysis and the metadata stored with it.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or describes an inconsistent analysis.
    fn read_from(reader: &mut impl BufRead) -> Result<(Analysis, Self::Metadata), Self::Error>;

    /// Writes an analysis and its metadata to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    fn write_to(
        analysis: &Analysis,
        metadata: &Self::Metadata,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error>;

    /// Reads an analysis from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsing fails.
    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<(Analysis, Self::Metadata), Self::Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    /// Writes an analysis and its metadata to a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or writing fails.
    fn write_to_path<P: AsRef<Path>>(
        analysis: &Analysis,
        metadata: &Self::Metadata,
        path: P,
    ) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(analysis, metadata, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}
