//! Deterministic, pure logic shared by the pipeline stages.
//!
//! Core modules must be free of I/O side effects. They operate on text and
//! in-memory values and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod literal;
pub mod parser;
pub mod retry;
pub mod types;
