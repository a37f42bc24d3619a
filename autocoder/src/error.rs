//! Typed failures raised by the pipeline.
//!
//! Orchestration code returns `anyhow::Result` and wraps every stage error in a
//! [`StageFailure`] context, so callers can both print a readable chain and
//! `downcast_ref` to the typed cause.

use thiserror::Error;

use crate::core::types::{Stage, TaskRoute};

/// Failure reported by a [`ModelClient`](crate::io::model::ModelClient).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Network, rate-limit or server-side failure. Retrying after a delay may succeed.
    #[error("transient model service failure: {0}")]
    Transient(String),
    /// The service rejected the request outright. Never retried.
    #[error("model service rejected the request: {0}")]
    InvalidRequest(String),
}

impl ModelError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ModelError::Transient(_))
    }
}

/// Every task-list parsing strategy failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no task list found in model response ({})", .reasons.join("; "))]
pub struct UnparseableResponseError {
    /// One entry per attempted strategy, in attempt order.
    pub reasons: Vec<String>,
}

/// Code generation for a single task failed; the run continues without it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task {index} ({route}) could not be synthesized: {reason}")]
pub struct TaskSynthesisFailure {
    pub index: usize,
    pub route: TaskRoute,
    pub reason: String,
}

/// Context marker naming the pipeline stage that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{stage} stage failed")]
pub struct StageFailure {
    pub stage: Stage,
}

impl StageFailure {
    pub fn new(stage: Stage) -> Self {
        Self { stage }
    }
}
