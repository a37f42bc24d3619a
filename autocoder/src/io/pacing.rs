//! Deliberate pauses between model calls.
//!
//! The model service enforces a requests-per-minute ceiling; the pipeline
//! pauses after every round or task, and between retry attempts. Pausing
//! goes through [`Pause`] so tests can observe it without sleeping.

use std::thread;
use std::time::Duration;

use tracing::debug;

pub trait Pause {
    fn pause(&self, duration: Duration);
}

/// Blocks the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        debug!(millis = duration.as_millis() as u64, "pausing");
        thread::sleep(duration);
    }
}
