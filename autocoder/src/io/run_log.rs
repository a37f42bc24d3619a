//! Run summary persisted next to the generated code.
//!
//! Tracing output is diagnostics; the summary is a product artifact and is
//! always written, regardless of `RUST_LOG`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::types::TaskRoute;
use crate::error::TaskSynthesisFailure;
use crate::io::config::ModelsConfig;
use crate::io::store::{ArtifactKey, ArtifactStore, Namespace, Phase, WriteMode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub project: String,
    pub folder: String,
    pub models: ModelsConfig,
    pub refinement: RefinementSummary,
    pub tasks: usize,
    pub task_failures: Vec<TaskFailureRecord>,
    /// Improvement versions written by this run, in order.
    pub versions: Vec<u32>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RefinementSummary {
    pub rounds: u32,
    /// Rounds (0-based) whose critique approved the design.
    pub approved_rounds: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailureRecord {
    pub index: usize,
    pub route: TaskRoute,
    pub reason: String,
}

impl From<&TaskSynthesisFailure> for TaskFailureRecord {
    fn from(failure: &TaskSynthesisFailure) -> Self {
        Self {
            index: failure.index,
            route: failure.route,
            reason: failure.reason.clone(),
        }
    }
}

/// Write `summary` as pretty JSON under the namespace's summary key.
pub fn write_summary(
    store: &dyn ArtifactStore,
    namespace: &Namespace,
    summary: &RunSummary,
) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(summary).context("serialize run summary")?;
    buf.push('\n');
    store
        .write(&ArtifactKey::new(namespace, Phase::Summary), &buf, WriteMode::Overwrite)
        .context("write run summary")
}

pub fn read_summary(
    store: &dyn ArtifactStore,
    namespace: &Namespace,
) -> Result<Option<RunSummary>> {
    let Some(raw) = store.read(&ArtifactKey::new(namespace, Phase::Summary))? else {
        return Ok(None);
    };
    let summary = serde_json::from_str(&raw).context("parse run summary")?;
    Ok(Some(summary))
}
