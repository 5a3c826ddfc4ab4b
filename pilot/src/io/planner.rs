//! Planner: turns a task (or a failure) into an [`ExecutionPlan`].
//!
//! Planning never fails from the caller's point of view. Any problem talking
//! to the agent or decoding its reply degrades to an empty plan whose
//! `thought` explains what went wrong.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::core::project_tree::IgnoreSet;
use crate::core::types::{ContextFile, DebugContext, ExecutionPlan};
use crate::io::config::{PilotPaths, PlannerConfig};
use crate::io::executor::{AgentTarget, CodexExecutor, Executor, execute_and_read};
use crate::io::prompt::{CorrectionPromptInputs, PlanPromptInputs, PromptBuilder};
use crate::io::scan::snapshot;

/// Schema handed to the agent so its final message is a plan object.
pub const EXECUTION_PLAN_SCHEMA: &str = include_str!("schemas/execution_plan.schema.json");

static JSON_OBJECT_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?s)\{.*\}").expect("json object regex is valid"));

/// Looser shape accepted from the agent: step fields may be missing and are
/// judged later, step by step.
static REPLY_SHAPE: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "type": "object",
        "properties": {
            "thought": { "type": ["string", "null"] },
            "plan": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["type"],
                    "properties": {
                        "type": {
                            "enum": [
                                "command",
                                "file_creation",
                                "file_modification",
                                "file_deletion",
                                "thought"
                            ]
                        },
                        "description": { "type": ["string", "null"] },
                        "command": { "type": ["string", "null"] },
                        "filePath": { "type": ["string", "null"] },
                        "content": { "type": ["string", "null"] }
                    }
                }
            }
        }
    })
});

/// Source of plans for the engine.
pub trait Planner {
    /// Plan a new task. `files` are optional context the user attached.
    fn generate_plan(&self, task: &str, files: &[ContextFile]) -> ExecutionPlan;

    /// Plan a replacement after a failed step.
    fn generate_correction(&self, debug: &DebugContext, files: &[ContextFile]) -> ExecutionPlan;
}

/// Planner backed by an agent [`Executor`].
pub struct AgentPlanner<E> {
    executor: E,
    target: AgentTarget,
    ignore: IgnoreSet,
    prompts: PromptBuilder,
}

impl<E: Executor> AgentPlanner<E> {
    pub fn new(executor: E, root: &Path, ignore: IgnoreSet, config: &PlannerConfig) -> Self {
        Self {
            executor,
            target: AgentTarget::new(&PilotPaths::new(root), config),
            ignore,
            prompts: PromptBuilder::new(config.prompt_budget_bytes),
        }
    }

    fn try_plan(&self, task: &str, files: &[ContextFile]) -> Result<ExecutionPlan> {
        let tree = match snapshot(&self.target.workdir, &self.ignore) {
            Ok(tree) => Some(tree),
            Err(err) => {
                warn!(err = %err, "project snapshot unavailable for planning");
                None
            }
        };
        let prompt = self.prompts.build_plan(&PlanPromptInputs {
            task,
            project_tree: tree.as_deref(),
            files,
        })?;
        self.request("plan", prompt)
    }

    fn try_correction(&self, ctx: &DebugContext, files: &[ContextFile]) -> Result<ExecutionPlan> {
        let prompt = self
            .prompts
            .build_correction(&CorrectionPromptInputs { debug: ctx, files })?;
        self.request("correction", prompt)
    }

    fn request(&self, name: &str, prompt: String) -> Result<ExecutionPlan> {
        let request = self.target.stage(
            name,
            "execution_plan.schema.json",
            EXECUTION_PLAN_SCHEMA,
            prompt,
        )?;
        let raw = execute_and_read(&self.executor, &request)?;
        extract_plan(&raw)
    }
}

/// The shipped planner: an agent CLI driven through [`CodexExecutor`].
pub type CodexPlanner = AgentPlanner<CodexExecutor>;

impl CodexPlanner {
    pub fn from_config(root: &Path, ignore: IgnoreSet, config: &PlannerConfig) -> Self {
        AgentPlanner::new(
            CodexExecutor::new(config.command.clone()),
            root,
            ignore,
            config,
        )
    }
}

impl<E: Executor> Planner for AgentPlanner<E> {
    #[instrument(skip_all, fields(files = files.len()))]
    fn generate_plan(&self, task: &str, files: &[ContextFile]) -> ExecutionPlan {
        match self.try_plan(task, files) {
            Ok(plan) => {
                info!(steps = plan.len(), "plan generated");
                plan
            }
            Err(err) => degraded("planning failed", &err),
        }
    }

    #[instrument(skip_all, fields(failed_step = ctx.failed_step_index))]
    fn generate_correction(&self, ctx: &DebugContext, files: &[ContextFile]) -> ExecutionPlan {
        match self.try_correction(ctx, files) {
            Ok(plan) => {
                info!(steps = plan.len(), "correction plan generated");
                plan
            }
            Err(err) => degraded("correction planning failed", &err),
        }
    }
}

fn degraded(what: &str, err: &anyhow::Error) -> ExecutionPlan {
    warn!(err = %format!("{err:#}"), "{what}");
    ExecutionPlan::empty(format!("{what}: {err:#}"))
}

/// Decode an agent reply into a plan.
///
/// The reply should be a bare JSON object. When it is wrapped in prose or a
/// code fence, the outermost `{ ... }` span is used instead.
pub fn extract_plan(raw: &str) -> Result<ExecutionPlan> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("planner reply is empty");
    }
    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(direct_err) => {
            let span = JSON_OBJECT_RE
                .find(trimmed)
                .ok_or_else(|| anyhow!("planner reply contains no JSON object: {direct_err}"))?;
            debug!(start = span.start(), end = span.end(), "extracted JSON from reply");
            serde_json::from_str(span.as_str()).context("parse JSON extracted from planner reply")?
        }
    };
    validate_reply_shape(&value)?;
    let mut value = value;
    drop_nulls(&mut value);
    let plan: ExecutionPlan =
        serde_json::from_value(value).context("decode planner reply as a plan")?;
    Ok(plan)
}

fn validate_reply_shape(value: &Value) -> Result<()> {
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&*REPLY_SHAPE)
        .context("compile reply schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("planner reply has the wrong shape:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

/// Null `thought`/`description` decode as if absent.
fn drop_nulls(value: &mut Value) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };
    obj.retain(|_, v| !v.is_null());
    if let Some(Value::Array(steps)) = obj.get_mut("plan") {
        for step in steps {
            if let Some(step) = step.as_object_mut() {
                step.retain(|_, v| !v.is_null());
            }
        }
    }
}
