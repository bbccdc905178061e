//! # Core Models Module
//!
//! The data structures that describe a parametric study: its design space, the points
//! sampled from it and the analysis that collects them.
//!
//! ## Key Components
//!
//! - [`variable`] - Discrete and continuous design-space axes and their perturbations
//! - [`function`] - Linear response and objective functions over inputs and job attributes
//! - [`workflow`] - Workflow steps, materialized work items and file references
//! - [`problem`] - The ordered variable list, the workflow and the objective functions
//! - [`data_point`] - One location in the design space and its evaluation outcome
//! - [`job`] - The job handed to a backend and the outcome it reports
//! - [`algorithm`] - Persisted algorithm options and progress
//! - [`analysis`] - The append-only DataPoint arena with its derived queries
//! - [`summary`] - Tabulation of an analysis for export
//! - [`ids`] - Arena keys
//!
//! ## Usage
//!
//! ```ignore
//! use osanalysis::core::models::{analysis::Analysis, problem::Problem, variable::*};
//! use osanalysis::core::models::workflow::FileReference;
//!
//! let walls = Variable::discrete("walls", vec![
//!     Perturbation::null("Baseline"),
//!     Perturbation::ruleset("R-19", "rulesets/r19.xml"),
//! ]);
//! let problem = Problem::new("Envelope", vec![walls.into()]);
//! let mut analysis = Analysis::new("Study", problem, FileReference::new("seed.osm"))?;
//! analysis.create_data_point(vec![VariableValue::Discrete(1)])?;
//! ```

pub mod algorithm;
pub mod analysis;
pub mod data_point;
pub mod function;
pub mod ids;
pub mod job;
pub mod problem;
pub mod summary;
pub mod variable;
pub mod workflow;
