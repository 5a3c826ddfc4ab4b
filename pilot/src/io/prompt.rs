//! Prompt builder for planner requests.

use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use minijinja::{Environment, context};
use tracing::{debug, warn};

use crate::core::types::{ContextFile, DebugContext};

const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");
const CORRECTION_TEMPLATE: &str = include_str!("prompts/correction.md");
const EXPLAIN_TEMPLATE: &str = include_str!("prompts/explain.md");
const REFACTOR_TEMPLATE: &str = include_str!("prompts/refactor.md");

static SECTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
        .expect("section marker regex is valid")
});

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("plan", PLAN_TEMPLATE)
            .context("load plan template")?;
        env.add_template("correction", CORRECTION_TEMPLATE)
            .context("load correction template")?;
        env.add_template("explain", EXPLAIN_TEMPLATE)
            .context("load explain template")?;
        env.add_template("refactor", REFACTOR_TEMPLATE)
            .context("load refactor template")?;
        Ok(Self { env })
    }

    fn render_plan(&self, input: &PlanPromptInputs<'_>) -> Result<String> {
        let template = self.env.get_template("plan")?;
        let rendered = template.render(context! {
            task => input.task.trim(),
            project_tree => non_blank(input.project_tree),
            files => input.files,
        })?;
        Ok(rendered)
    }

    fn render_correction(
        &self,
        input: &CorrectionPromptInputs<'_>,
        error_output: &str,
    ) -> Result<String> {
        let debug = input.debug;
        let failed_step_description = debug
            .failed_plan
            .plan
            .get(debug.failed_step_index)
            .map(|step| format!("[{}] {}", step.kind.as_str(), step.description))
            .unwrap_or_default();
        let failed_plan =
            serde_json::to_string_pretty(&debug.failed_plan).context("serialize failed plan")?;
        let template = self.env.get_template("correction")?;
        let rendered = template.render(context! {
            task => debug.original_task.trim(),
            failed_step_number => debug.failed_step_index + 1,
            step_count => debug.failed_plan.len(),
            failed_step_description => failed_step_description,
            error_output => error_output,
            failed_plan => failed_plan,
            project_tree => non_blank(Some(debug.project_tree.as_str())),
            files => input.files,
        })?;
        Ok(rendered)
    }

    fn render_file(&self, name: &str, file: &ContextFile, instruction: &str) -> Result<String> {
        let template = self.env.get_template(name)?;
        let rendered = template.render(context! {
            path => file.path,
            content => file.content.trim_end(),
            instruction => instruction.trim(),
        })?;
        Ok(rendered)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Inputs for an initial planning prompt.
#[derive(Debug, Clone, Copy)]
pub struct PlanPromptInputs<'a> {
    pub task: &'a str,
    pub project_tree: Option<&'a str>,
    pub files: &'a [ContextFile],
}

/// Inputs for a correction prompt.
#[derive(Debug, Clone, Copy)]
pub struct CorrectionPromptInputs<'a> {
    pub debug: &'a DebugContext,
    pub files: &'a [ContextFile],
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    /// Section identifier (e.g., "contract", "task").
    key: String,
    /// Whether this section is required (cannot be dropped).
    required: bool,
    /// Full section content including header.
    content: String,
}

/// Parse sections from rendered template output using HTML comment markers.
///
/// Markers follow format: `<!-- section:KEY required|droppable -->`
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<(usize, usize, String, bool)> = SECTION_RE
        .captures_iter(rendered)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let key = caps.get(1)?.as_str().to_string();
            let required = caps.get(2)?.as_str() == "required";
            Some((whole.start(), whole.end(), key, required))
        })
        .collect();

    let mut sections = Vec::new();
    for (i, (_, body_start, key, required)) in markers.iter().enumerate() {
        let body_end = markers
            .get(i + 1)
            .map(|(start, ..)| *start)
            .unwrap_or(rendered.len());
        let content = rendered[*body_start..body_end].trim().to_string();
        if !content.is_empty() || *required {
            sections.push(ParsedSection {
                key: key.clone(),
                required: *required,
                content,
            });
        }
    }
    sections
}

/// Byte length of the sections once joined by [`render_sections`].
fn rendered_len(sections: &[ParsedSection]) -> usize {
    let body: usize = sections.iter().map(|s| s.content.len()).sum();
    body + 2 * sections.len().saturating_sub(1)
}

/// Drop droppable sections until the prompt fits. Drop order: files -> tree.
fn drop_for_budget(sections: &mut Vec<ParsedSection>, budget: usize) {
    for key in ["files", "tree"] {
        if rendered_len(sections) <= budget {
            break;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            let dropped_len = sections[idx].content.len();
            debug!(
                section = key,
                bytes_dropped = dropped_len,
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }
}

/// Cut the end of the section named `key` so the prompt fits. Other sections
/// are never touched.
fn truncate_for_budget(sections: &mut [ParsedSection], key: &str, budget: usize) {
    let total = rendered_len(sections);
    if total <= budget {
        return;
    }
    let Some(section) = sections.iter_mut().find(|s| s.key == key) else {
        warn!(total, budget, "prompt exceeds budget with nothing left to shrink");
        return;
    };
    let before_len = section.content.len();
    let allowed = budget.saturating_sub(total - before_len);
    let keep = floor_char_boundary(&section.content, allowed.saturating_sub(12));
    section.content.truncate(keep);
    section.content.push_str("\n[truncated]");
    debug!(
        section = key,
        before_len,
        after_len = section.content.len(),
        "truncated section for budget"
    );
}

/// Apply budget to parsed sections: drop optional sections, then shrink
/// `shrink_key` as a last resort.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize, shrink_key: &str) {
    drop_for_budget(sections, budget);
    truncate_for_budget(sections, shrink_key, budget);
}

/// Keep at most `max` bytes from the end of `text`, prefixed with a note on
/// how much was cut.
fn keep_tail(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let room = max.saturating_sub(omitted_marker(text.len()).len());
    let start = ceil_char_boundary(text, text.len() - room.min(text.len()));
    format!("{}{}", omitted_marker(start), &text[start..])
}

fn omitted_marker(bytes: usize) -> String {
    format!("[... {bytes} earlier bytes omitted]\n")
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    while !s.is_char_boundary(index) {
        index += 1;
    }
    index
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Render sections back to a single string.
fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds planner prompts within a byte budget, dropping less critical
/// sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    /// Build the prompt for an initial plan.
    pub fn build_plan(&self, input: &PlanPromptInputs<'_>) -> Result<String> {
        let rendered = PromptEngine::new()?.render_plan(input)?;
        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes, "task");
        Ok(render_sections(&sections))
    }

    /// Build the prompt for a correction plan.
    ///
    /// After the optional sections are gone, the failing step's output is cut
    /// from the front so its tail survives. The contract and the failed plan
    /// are always sent whole.
    pub fn build_correction(&self, input: &CorrectionPromptInputs<'_>) -> Result<String> {
        let engine = PromptEngine::new()?;
        let output = input.debug.error_output.trim_end();
        let mut sections = parse_sections(&engine.render_correction(input, output)?);
        drop_for_budget(&mut sections, self.budget_bytes);

        let excess = rendered_len(&sections).saturating_sub(self.budget_bytes);
        if excess > 0 {
            let tail = keep_tail(output, output.len().saturating_sub(excess));
            debug!(
                before_len = output.len(),
                after_len = tail.len(),
                "trimmed failure output for budget"
            );
            sections = parse_sections(&engine.render_correction(input, &tail)?);
            drop_for_budget(&mut sections, self.budget_bytes);
        }
        truncate_for_budget(&mut sections, "failure", self.budget_bytes);
        Ok(render_sections(&sections))
    }

    /// Build the prompt asking for an explanation of `file`. An oversized
    /// file is cut from the end.
    pub fn build_explain(&self, file: &ContextFile) -> Result<String> {
        let rendered = PromptEngine::new()?.render_file("explain", file, "")?;
        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes, "file");
        Ok(render_sections(&sections))
    }

    /// Build the prompt asking for a rewrite of `file`.
    ///
    /// The agent must see the whole file, so a prompt over budget is an error.
    pub fn build_refactor(&self, file: &ContextFile, instruction: &str) -> Result<String> {
        let rendered = PromptEngine::new()?.render_file("refactor", file, instruction)?;
        let sections = parse_sections(&rendered);
        let len = rendered_len(&sections);
        if len > self.budget_bytes {
            bail!(
                "{} is too large to refactor: prompt is {len} bytes, budget is {}",
                file.path,
                self.budget_bytes
            );
        }
        Ok(render_sections(&sections))
    }
}
