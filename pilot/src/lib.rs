//! Plan, execute, and self-correct: a coding agent that works inside one
//! project directory.
//!
//! A planner turns a task into an ordered plan of steps (shell commands, file
//! writes and deletions, notes). The engine runs the steps one at a time and,
//! when a step fails, can ask the planner for a replacement plan and start
//! over, up to a fixed number of corrections. The architecture enforces a
//! strict separation:
//!
//! - **[`core`]**: Pure logic (plan types, step checking, session state, the
//!   correction budget, tree rendering). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (processes, the workspace, disk
//!   scans, config, the planner agent). Isolated behind traits where tests
//!   need fakes.
//!
//! [`engine`] coordinates the two to implement `pilot run` and `pilot exec`.
//! `pilot explain` and `pilot refactor` go straight to [`io::assist`].

pub mod core;
pub mod engine;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
