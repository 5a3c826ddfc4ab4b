//! Stable exit codes for pilot CLI commands.

/// Command succeeded: the plan completed, or a preview was printed.
pub const OK: i32 = 0;
/// Invalid usage, config, plan file, or any other error.
pub const INVALID: i32 = 1;
/// Execution halted on a failed step.
pub const HALTED: i32 = 2;
/// The planner produced no steps (or the plan file is empty).
pub const EMPTY_PLAN: i32 = 3;
