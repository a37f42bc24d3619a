//! Stable exit codes for autocoder CLI commands.

/// Command completed.
pub const OK: i32 = 0;
/// Command failed; the error chain is printed to stderr.
pub const FAILED: i32 = 1;
