//! Side-effecting parts of pilot: processes, files, config, the planner and
//! the file assistant.

pub mod assist;
pub mod config;
pub mod executor;
pub mod planner;
pub mod process;
pub mod prompt;
pub mod scan;
pub mod workspace;
