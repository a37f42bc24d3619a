//! Test-only collaborators: scripted models, recording pauses and builders.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use serde_json::Value;

use crate::core::types::TaskDescriptor;
use crate::error::ModelError;
use crate::io::config::{ModelsConfig, PacingConfig, PipelineConfig, RetryConfig};
use crate::io::model::{CompletionRequest, ModelClient};
use crate::io::pacing::Pause;

/// Model client that replays queued responses and records every request.
///
/// Running out of responses yields an `InvalidRequest` so an unexpected
/// extra call fails the test instead of hanging on retries.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    responses: RefCell<VecDeque<Result<String, ModelError>>>,
    requests: RefCell<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<String, ModelError>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Convenience for scripts without failures.
    pub fn replying<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(responses.into_iter().map(|text| Ok(text.into())).collect())
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.borrow().len()
    }
}

impl ModelClient for ScriptedModel {
    fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError> {
        self.requests.borrow_mut().push(request.clone());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::InvalidRequest("script exhausted".to_string())))
    }
}

/// Pause that records requested durations without sleeping.
#[derive(Debug, Default)]
pub struct RecordingPause {
    pauses: RefCell<Vec<Duration>>,
}

impl RecordingPause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.borrow().clone()
    }
}

impl Pause for RecordingPause {
    fn pause(&self, duration: Duration) {
        self.pauses.borrow_mut().push(duration);
    }
}

/// Build a task descriptor from a JSON object literal.
pub fn task(value: Value) -> TaskDescriptor {
    match value {
        Value::Object(fields) => TaskDescriptor::from_fields(fields),
        other => panic!("task fixture must be an object, got {other}"),
    }
}

/// Config with no pacing, no retries and the given refinement/improvement counts.
pub fn fast_config(iterations: u32, rounds: u32) -> PipelineConfig {
    let mut config = PipelineConfig {
        models: ModelsConfig::uniform("test-model"),
        pacing: PacingConfig::none(),
        retry: RetryConfig {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        },
        ..PipelineConfig::default()
    };
    config.refine.iterations = iterations;
    config.improve.rounds = rounds;
    config
}
