//! # Workflows Module
//!
//! Top-level entry points that run a complete analysis: preparation, the iterate-evaluate
//! loop through a job backend, and postprocessing of the results.
//!
//! - **Run Workflow** ([`run`]) - Drives an analysis to completion and collects its Pareto
//!   front and minimum curves.

pub mod run;
