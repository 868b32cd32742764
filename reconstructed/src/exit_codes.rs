//! Stable exit codes for the CLI.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid input: unreadable files, schema or parse errors.
pub const INVALID: i32 = 1;
/// A host failed under `full` strictness and the run was aborted.
pub const ABORTED: i32 = 2;
/// The run completed but some hosts failed under `host` strictness.
pub const HOST_FAILURES: i32 = 3;
