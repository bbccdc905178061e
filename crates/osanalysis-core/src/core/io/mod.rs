//! Saving, loading and exporting analyses.
//!
//! Analyses are persisted as versioned JSON documents through the [`traits::AnalysisFile`]
//! interface. Summary tables are exported as CSV.

pub mod json;
pub mod summary;
pub mod traits;
