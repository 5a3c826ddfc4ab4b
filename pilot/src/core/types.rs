//! Plan, step and status types shared by the planner and the engine.
//!
//! These types define the contract between the planner (which produces plans)
//! and the engine (which executes them). They carry no I/O.

use serde::{Deserialize, Serialize};

/// A multi-step plan produced by the planner for one task.
///
/// Step order is execution order. An empty `plan` is valid and means there is
/// nothing to execute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Free-text rationale produced by the planner.
    #[serde(default)]
    pub thought: String,
    #[serde(default)]
    pub plan: Vec<PlanStep>,
}

impl ExecutionPlan {
    /// An empty plan carrying an explanation of why nothing was planned.
    pub fn empty(thought: impl Into<String>) -> Self {
        Self {
            thought: thought.into(),
            plan: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.plan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plan.is_empty()
    }
}

/// One unit of work in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Human-readable summary shown next to the step status.
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub kind: StepKind,
}

/// The closed set of step kinds.
///
/// Fields are optional on the wire: a planner may omit them, and the engine
/// decides what a step with missing fields means (see
/// [`crate::core::step_check`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    Command {
        #[serde(default)]
        command: Option<String>,
    },
    FileCreation {
        #[serde(default, rename = "filePath")]
        file_path: Option<String>,
        #[serde(default)]
        content: Option<String>,
    },
    FileModification {
        #[serde(default, rename = "filePath")]
        file_path: Option<String>,
        #[serde(default)]
        content: Option<String>,
    },
    FileDeletion {
        #[serde(default, rename = "filePath")]
        file_path: Option<String>,
    },
    Thought,
}

impl StepKind {
    /// Wire tag of this kind (`command`, `file_creation`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Command { .. } => "command",
            StepKind::FileCreation { .. } => "file_creation",
            StepKind::FileModification { .. } => "file_modification",
            StepKind::FileDeletion { .. } => "file_deletion",
            StepKind::Thought => "thought",
        }
    }
}

impl PlanStep {
    pub fn command(description: &str, command: &str) -> Self {
        Self {
            description: description.to_string(),
            kind: StepKind::Command {
                command: Some(command.to_string()),
            },
        }
    }

    pub fn file_creation(description: &str, path: &str, content: &str) -> Self {
        Self {
            description: description.to_string(),
            kind: StepKind::FileCreation {
                file_path: Some(path.to_string()),
                content: Some(content.to_string()),
            },
        }
    }

    pub fn file_modification(description: &str, path: &str, content: &str) -> Self {
        Self {
            description: description.to_string(),
            kind: StepKind::FileModification {
                file_path: Some(path.to_string()),
                content: Some(content.to_string()),
            },
        }
    }

    pub fn file_deletion(description: &str, path: &str) -> Self {
        Self {
            description: description.to_string(),
            kind: StepKind::FileDeletion {
                file_path: Some(path.to_string()),
            },
        }
    }

    pub fn thought(description: &str) -> Self {
        Self {
            description: description.to_string(),
            kind: StepKind::Thought,
        }
    }
}

/// Per-step execution status, indexed positionally against the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failure,
}

impl StepStatus {
    pub fn is_settled(self) -> bool {
        matches!(self, StepStatus::Success | StepStatus::Failure)
    }
}

/// A file handed to the planner as extra context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextFile {
    pub path: String,
    pub content: String,
}

/// Everything the planner needs to propose a corrected plan.
///
/// Built only when a step fails, and handed to the planner once per failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugContext {
    pub original_task: String,
    pub failed_plan: ExecutionPlan,
    pub failed_step_index: usize,
    /// Captured output (or error text) of the failing step.
    pub error_output: String,
    /// Text snapshot of the project tree taken right after the failure.
    pub project_tree: String,
}
