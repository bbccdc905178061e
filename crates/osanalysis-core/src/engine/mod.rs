//! # Engine Module
//!
//! The stateful layer that turns an [`Analysis`](crate::core::models::analysis::Analysis)
//! into evaluated DataPoints.
//!
//! ## Architecture
//!
//! - **Algorithms** ([`algorithms`]) - Sequential Search, design of experiments and sampling,
//!   plus Pareto-front and minimum-curve postprocessing
//! - **Backend** ([`backend`]) - The job-running seam, a thread-pool backend and the external
//!   command runner
//! - **Driver** ([`driver`]) - Queues DataPoints, harvests job outcomes and calls the algorithm
//!   between batches
//! - **Configuration** ([`config`]) - Run options and algorithm option builders
//! - **Progress Monitoring** ([`progress`]) - Progress events for front ends
//! - **Error Handling** ([`error`]) - The engine-wide error type

pub mod algorithms;
pub mod backend;
pub mod config;
pub mod driver;
pub mod error;
pub mod progress;
