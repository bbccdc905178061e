//! # osanalysis
//!
//! A design-of-experiments and multi-objective optimization driver for parametric
//! building-energy simulation.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture.
//!
//! - **[`core`]: The Foundation.** Plain data models (`Problem`, `DataPoint`, `Analysis`),
//!   the variable and perturbation model, and file formats for saving analyses and
//!   exporting summaries.
//!
//! - **[`engine`]: The Logic Core.** The search algorithms that decide which DataPoints to
//!   evaluate next, the job-running backend seam, and the `AnalysisDriver` that submits
//!   jobs and harvests their outcomes.
//!
//! - **[`workflows`]: The Public API.** Runs an analysis end to end and returns its
//!   postprocessed results.

pub mod core;
pub mod engine;
pub mod workflows;
