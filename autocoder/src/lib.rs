//! Turn a natural-language goal into source code through repeated model calls.
//!
//! A run has three phases: a draft/critique/merge loop refines a design, the
//! design is decomposed into tasks that are coded one at a time against the
//! growing codebase, and whole-program rewriting rounds polish the result.
//!
//! - **[`core`]**: Pure, deterministic logic (data model, response parsing,
//!   task routing, backoff). No I/O.
//! - **[`io`]**: Side-effecting collaborators (model service, artifact store,
//!   prompts, config, pacing). Behind traits so tests can substitute them.
//! - **[`agents`]**: The model-driven stages.
//!
//! [`pipeline`] chains the stages into the CLI commands.

pub mod agents;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
