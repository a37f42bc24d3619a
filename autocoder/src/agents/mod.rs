//! Model-driven pipeline stages.
//!
//! Each stage owns its prompt settings and receives its collaborators through
//! [`StageIo`], so tests can substitute scripted models, recording pauses and
//! in-memory stores.

use std::fmt::Display;

use tracing::warn;

use crate::core::retry::RetryPolicy;
use crate::error::ModelError;
use crate::io::model::{CompletionRequest, ModelClient};
use crate::io::pacing::Pause;
use crate::io::store::{ArtifactStore, Namespace};

pub mod coder;
pub mod designer;
pub mod improver;

/// Collaborators shared by every stage of one run.
#[derive(Clone, Copy)]
pub struct StageIo<'a> {
    pub client: &'a dyn ModelClient,
    pub pause: &'a dyn Pause,
    pub store: &'a dyn ArtifactStore,
    pub namespace: &'a Namespace,
}

/// Call the model, retrying transient failures under `policy`.
///
/// `InvalidRequest` is returned immediately.
pub fn complete_with_retry(
    client: &dyn ModelClient,
    pause: &dyn Pause,
    policy: &RetryPolicy,
    request: &CompletionRequest,
) -> Result<String, ModelError> {
    retry(pause, policy, || client.complete(request), ModelError::is_transient)
}

/// Run `call` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of attempts. Sleeps through `pause` between attempts.
pub(crate) fn retry<T, E: Display>(
    pause: &dyn Pause,
    policy: &RetryPolicy,
    mut call: impl FnMut() -> Result<T, E>,
    is_retryable: impl Fn(&E) -> bool,
) -> Result<T, E> {
    let mut attempts = 0u32;
    loop {
        match call() {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempts += 1;
                if !is_retryable(&err) || !policy.allows_another(attempts) {
                    return Err(err);
                }
                let delay = policy.delay_for(attempts - 1);
                warn!(
                    attempt = attempts,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "model call failed, retrying"
                );
                pause.pause(delay);
            }
        }
    }
}
