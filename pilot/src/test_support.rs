//! Test-only helpers: scripted planner and command runner, a scratch project
//! directory, and event inspection.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::core::types::{ContextFile, DebugContext, ExecutionPlan, StepStatus};
use crate::engine::EngineEvent;
use crate::io::planner::Planner;
use crate::io::process::{CommandResult, CommandRunner};
use crate::io::workspace::Workspace;

/// Planner that replays queued plans and records what it was asked.
///
/// When the correction queue runs dry, the `repeat_corrections` plan (if any)
/// is returned on every further request; otherwise an empty plan.
#[derive(Debug, Default)]
pub struct ScriptedPlanner {
    plans: RefCell<VecDeque<ExecutionPlan>>,
    corrections: RefCell<VecDeque<ExecutionPlan>>,
    repeat: Option<ExecutionPlan>,
    tasks: RefCell<Vec<String>>,
    debug_contexts: RefCell<Vec<DebugContext>>,
    context_files: RefCell<Vec<Vec<ContextFile>>>,
}

impl ScriptedPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan(self, plan: ExecutionPlan) -> Self {
        self.plans.borrow_mut().push_back(plan);
        self
    }

    pub fn with_correction(self, plan: ExecutionPlan) -> Self {
        self.corrections.borrow_mut().push_back(plan);
        self
    }

    pub fn repeat_corrections(mut self, plan: ExecutionPlan) -> Self {
        self.repeat = Some(plan);
        self
    }

    pub fn tasks(&self) -> Vec<String> {
        self.tasks.borrow().clone()
    }

    pub fn debug_contexts(&self) -> Vec<DebugContext> {
        self.debug_contexts.borrow().clone()
    }

    /// Context files passed with each call, in call order.
    pub fn context_files(&self) -> Vec<Vec<ContextFile>> {
        self.context_files.borrow().clone()
    }
}

impl Planner for ScriptedPlanner {
    fn generate_plan(&self, task: &str, files: &[ContextFile]) -> ExecutionPlan {
        self.tasks.borrow_mut().push(task.to_string());
        self.context_files.borrow_mut().push(files.to_vec());
        self.plans
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| ExecutionPlan::empty("no scripted plan"))
    }

    fn generate_correction(&self, debug: &DebugContext, files: &[ContextFile]) -> ExecutionPlan {
        self.debug_contexts.borrow_mut().push(debug.clone());
        self.context_files.borrow_mut().push(files.to_vec());
        self.corrections
            .borrow_mut()
            .pop_front()
            .or_else(|| self.repeat.clone())
            .unwrap_or_else(|| ExecutionPlan::empty("no scripted correction"))
    }
}

/// Command runner with canned responses keyed by the exact command string.
///
/// Unknown commands behave like a spawn failure.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: HashMap<String, (String, bool)>,
    commands: RefCell<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, command: &str, output: &str, success: bool) -> Self {
        self.responses
            .insert(command.to_string(), (output.to_string(), success));
        self
    }

    /// Commands run so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(
        &self,
        command: &str,
        _cwd: &Path,
        on_data: &mut dyn FnMut(&str),
    ) -> Result<CommandResult> {
        self.commands.borrow_mut().push(command.to_string());
        let Some((output, success)) = self.responses.get(command) else {
            on_data("[failed to start command: not scripted]\n");
            return Err(anyhow!("unscripted command {command}"));
        };
        if !output.is_empty() {
            on_data(output);
        }
        if *success {
            return Ok(CommandResult {
                success: true,
                exit_code: Some(0),
            });
        }
        on_data("\n[process exited with code 1]\n");
        Ok(CommandResult {
            success: false,
            exit_code: Some(1),
        })
    }
}

/// Scratch project directory removed on drop.
pub struct TempProject {
    dir: TempDir,
}

impl TempProject {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn workspace(&self) -> Workspace {
        Workspace::open(self.path()).expect("open workspace")
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, content).expect("write file");
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path().join(rel)).expect("read file")
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path().join(rel).exists()
    }

    /// Top-level entry names, sorted.
    pub fn entries(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.path())
            .expect("read dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

impl Default for TempProject {
    fn default() -> Self {
        Self::new()
    }
}

/// `(index, status)` pairs from `StepStatusChanged` events, in emission order.
pub fn status_trace(events: &[EngineEvent]) -> Vec<(usize, StepStatus)> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::StepStatusChanged { index, status } => Some((*index, *status)),
            _ => None,
        })
        .collect()
}

/// Concatenated output chunks for step `index`.
pub fn output_of(events: &[EngineEvent], index: usize) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::OutputAppended { index: i, chunk } if *i == index => Some(chunk.as_str()),
            _ => None,
        })
        .collect()
}
