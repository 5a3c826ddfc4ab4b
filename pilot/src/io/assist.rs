//! One-shot agent requests about a single project file: explain it, or
//! propose a rewrite that follows an instruction.
//!
//! Unlike planning, these requests fail loudly. Nothing here touches the
//! project; applying a rewrite is the caller's decision.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::core::types::ContextFile;
use crate::io::config::{PilotPaths, PlannerConfig};
use crate::io::executor::{AgentTarget, CodexExecutor, Executor, execute_and_read};
use crate::io::prompt::PromptBuilder;

pub const EXPLANATION_SCHEMA: &str = include_str!("schemas/explanation.schema.json");
pub const REFACTOR_SCHEMA: &str = include_str!("schemas/refactor.schema.json");

/// A reply that is a single fenced code block.
static FENCED_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?s)\A```[\w+#.-]*[ \t]*\r?\n(.*?)\r?\n?```\s*\z")
        .expect("fenced block regex is valid")
});

/// Rewrite proposed for one file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Refactoring {
    #[serde(default)]
    pub summary: String,
    /// Complete new file content.
    pub content: String,
}

impl Refactoring {
    /// True when applying the rewrite would leave `original` as it is.
    pub fn is_noop(&self, original: &str) -> bool {
        self.content.trim_end() == original.trim_end()
    }
}

#[derive(Deserialize)]
struct ExplanationReply {
    explanation: String,
}

/// File assistant backed by an agent [`Executor`].
pub struct Assistant<E> {
    executor: E,
    target: AgentTarget,
    prompts: PromptBuilder,
}

impl<E: Executor> Assistant<E> {
    pub fn new(executor: E, root: &Path, config: &PlannerConfig) -> Self {
        Self {
            executor,
            target: AgentTarget::new(&PilotPaths::new(root), config),
            prompts: PromptBuilder::new(config.prompt_budget_bytes),
        }
    }

    /// Ask the agent for a Markdown explanation of `file`.
    #[instrument(skip_all, fields(path = %file.path))]
    pub fn explain(&self, file: &ContextFile) -> Result<String> {
        if file.content.trim().is_empty() {
            bail!("{} is empty; nothing to explain", file.path);
        }
        let prompt = self.prompts.build_explain(file)?;
        let request = self
            .target
            .stage("explain", "explanation.schema.json", EXPLANATION_SCHEMA, prompt)?;
        let raw = execute_and_read(&self.executor, &request)?;
        let explanation = decode_explanation(&raw);
        if explanation.is_empty() {
            bail!("agent returned an empty explanation");
        }
        info!(bytes = explanation.len(), "explanation received");
        Ok(explanation)
    }

    /// Ask the agent to rewrite `file` following `instruction`.
    #[instrument(skip_all, fields(path = %file.path))]
    pub fn refactor(&self, file: &ContextFile, instruction: &str) -> Result<Refactoring> {
        if instruction.trim().is_empty() {
            bail!("refactor instruction is empty");
        }
        let prompt = self.prompts.build_refactor(file, instruction)?;
        let request = self
            .target
            .stage("refactor", "refactor.schema.json", REFACTOR_SCHEMA, prompt)?;
        let raw = execute_and_read(&self.executor, &request)?;
        let refactoring = decode_refactoring(&raw)?;
        info!(bytes = refactoring.content.len(), "rewrite received");
        Ok(refactoring)
    }
}

/// The shipped assistant: the configured agent CLI.
pub type CodexAssistant = Assistant<CodexExecutor>;

impl CodexAssistant {
    pub fn from_config(root: &Path, config: &PlannerConfig) -> Self {
        Assistant::new(CodexExecutor::new(config.command.clone()), root, config)
    }
}

/// Plain-text replies are taken as the explanation itself.
fn decode_explanation(raw: &str) -> String {
    let trimmed = raw.trim();
    match serde_json::from_str::<ExplanationReply>(trimmed) {
        Ok(reply) => reply.explanation.trim().to_string(),
        Err(err) => {
            debug!(err = %err, "explanation reply is not JSON; using it as text");
            trimmed.to_string()
        }
    }
}

/// Decode a rewrite reply.
///
/// The reply should match [`REFACTOR_SCHEMA`]. A reply that is only a fenced
/// code block, or bare code, is taken as the new content.
pub fn decode_refactoring(raw: &str) -> Result<Refactoring> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("agent reply is empty");
    }
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed).context("decode rewrite reply");
    }
    let content = FENCED_RE
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map_or(trimmed, |body| body.as_str());
    debug!(bytes = content.len(), "rewrite reply is bare code");
    Ok(Refactoring {
        summary: String::new(),
        content: format!("{content}\n"),
    })
}
