//! Resolution of plan steps into executable actions.
//!
//! Planner output is decoded permissively, so a step may arrive without the
//! fields it needs. This module is the only place that decides what such a
//! step means; the engine dispatches on [`StepAction`] and never inspects raw
//! optional fields.

use serde::{Deserialize, Serialize};

use super::types::{PlanStep, StepKind};

/// What to do with a step whose required fields are missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedStepPolicy {
    /// Treat the step as a no-op that succeeds.
    #[default]
    Skip,
    /// Record the step as failed, which feeds the correction cycle.
    Fail,
}

/// Whether a write step creates or modifies a file.
///
/// Both are an overwrite on disk; the distinction only changes reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteIntent {
    Create,
    Modify,
}

/// A fully-specified side effect for one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction<'a> {
    Run { command: &'a str },
    Write {
        path: &'a str,
        content: &'a str,
        intent: WriteIntent,
    },
    Delete { path: &'a str },
    Reflect,
}

/// Outcome of checking one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepCheck<'a> {
    Ready(StepAction<'a>),
    /// Required fields are missing; carries a human-readable reason.
    Malformed(String),
}

/// Resolve a step into an action, or report which field is missing.
///
/// Blank strings count as missing for commands and paths. File content may be
/// empty (an empty file is a legitimate result).
pub fn check_step(step: &PlanStep) -> StepCheck<'_> {
    match &step.kind {
        StepKind::Command { command } => match present(command) {
            Some(command) => StepCheck::Ready(StepAction::Run { command }),
            None => StepCheck::Malformed("command step has no command".to_string()),
        },
        StepKind::FileCreation { file_path, content } => {
            check_write(file_path, content, WriteIntent::Create)
        }
        StepKind::FileModification { file_path, content } => {
            check_write(file_path, content, WriteIntent::Modify)
        }
        StepKind::FileDeletion { file_path } => match present(file_path) {
            Some(path) => StepCheck::Ready(StepAction::Delete { path }),
            None => StepCheck::Malformed("file_deletion step has no filePath".to_string()),
        },
        StepKind::Thought => StepCheck::Ready(StepAction::Reflect),
    }
}

fn check_write<'a>(
    file_path: &'a Option<String>,
    content: &'a Option<String>,
    intent: WriteIntent,
) -> StepCheck<'a> {
    let kind = match intent {
        WriteIntent::Create => "file_creation",
        WriteIntent::Modify => "file_modification",
    };
    let Some(path) = present(file_path) else {
        return StepCheck::Malformed(format!("{kind} step has no filePath"));
    };
    let Some(content) = content.as_deref() else {
        return StepCheck::Malformed(format!("{kind} step for {path} has no content"));
    };
    StepCheck::Ready(StepAction::Write {
        path,
        content,
        intent,
    })
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}
