//! Side-effecting collaborators for the pipeline.

pub mod config;
pub mod goal;
pub mod model;
pub mod pacing;
pub mod prompt;
pub mod run_log;
pub mod store;
