//! Executor abstraction for the coding agent.
//!
//! The [`Executor`] trait decouples planning (and the one-shot file requests)
//! from the actual agent backend, an agent CLI such as `codex exec`. Tests use
//! scripted executors that write predetermined replies without spawning
//! processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::config::{PilotPaths, PlannerConfig};
use crate::io::process::{CommandOutput, run_command_with_timeout};

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Working directory for the agent process.
    pub workdir: PathBuf,
    /// Prompt text fed to the agent on stdin.
    pub prompt: String,
    /// JSON Schema that constrains the agent's final message.
    pub output_schema_path: PathBuf,
    /// Where the agent must write its final message.
    pub output_path: PathBuf,
    /// Where to write the agent's stdout/stderr.
    pub log_path: PathBuf,
    pub timeout: Duration,
    /// Truncate the log beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Where agent requests run and how they are bounded.
#[derive(Debug, Clone)]
pub struct AgentTarget {
    pub workdir: PathBuf,
    /// Holds prompts, schemas, replies and logs of each request.
    pub dir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl AgentTarget {
    pub fn new(paths: &PilotPaths, config: &PlannerConfig) -> Self {
        Self {
            workdir: paths.root.clone(),
            dir: paths.planner_dir.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    /// Write the prompt and output schema of request `name` to disk and
    /// describe the call.
    pub fn stage(
        &self,
        name: &str,
        schema_file: &str,
        schema: &str,
        prompt: String,
    ) -> Result<ExecRequest> {
        fs::create_dir_all(&self.dir).with_context(|| format!("create {}", self.dir.display()))?;
        let schema_path = self.dir.join(schema_file);
        fs::write(&schema_path, schema)
            .with_context(|| format!("write {}", schema_path.display()))?;
        let prompt_path = self.dir.join(format!("{name}.prompt.md"));
        fs::write(&prompt_path, &prompt)
            .with_context(|| format!("write {}", prompt_path.display()))?;

        Ok(ExecRequest {
            workdir: self.workdir.clone(),
            prompt,
            output_schema_path: schema_path,
            output_path: self.dir.join(format!("{name}.reply.json")),
            log_path: self.dir.join(format!("{name}.log")),
            timeout: self.timeout,
            output_limit_bytes: self.output_limit_bytes,
        })
    }
}

/// Abstraction over agent backends.
pub trait Executor {
    /// Run the agent. On success its reply is at `request.output_path`.
    fn exec(&self, request: &ExecRequest) -> Result<()>;
}

/// Executor that spawns a codex-style agent CLI.
///
/// `command` is the base invocation; `--output-schema`, `--output-last-message`
/// and `-` (prompt on stdin) are appended.
#[derive(Debug, Clone)]
pub struct CodexExecutor {
    command: Vec<String>,
}

impl CodexExecutor {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Executor for CodexExecutor {
    #[instrument(skip_all, fields(timeout_secs = request.timeout.as_secs()))]
    fn exec(&self, request: &ExecRequest) -> Result<()> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("agent command is empty"))?;
        info!(program = %program, workdir = %request.workdir.display(), "starting agent");

        if !request.output_schema_path.exists() {
            return Err(anyhow!(
                "missing output schema {}",
                request.output_schema_path.display()
            ));
        }
        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }
        // A stale reply from an earlier call must never be mistaken for this one.
        if request.output_path.exists() {
            fs::remove_file(&request.output_path).with_context(|| {
                format!("remove stale output {}", request.output_path.display())
            })?;
        }

        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg("--output-schema")
            .arg(&request.output_schema_path)
            .arg("--output-last-message")
            .arg(&request.output_path)
            .arg("-")
            .current_dir(&request.workdir);

        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .with_context(|| format!("run {program}"))?;

        write_executor_log(&request.log_path, &output, request.output_limit_bytes)?;

        if output.timed_out {
            warn!(
                timeout_secs = request.timeout.as_secs(),
                "agent timed out"
            );
            return Err(anyhow!("{program} timed out after {:?}", request.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent failed");
            return Err(anyhow!(
                "{program} failed with status {:?}",
                output.status.code()
            ));
        }

        debug!("agent completed");
        Ok(())
    }
}

/// Run the agent and return its raw reply text.
#[instrument(skip_all, fields(output_path = %request.output_path.display()))]
pub fn execute_and_read<E: Executor + ?Sized>(executor: &E, request: &ExecRequest) -> Result<String> {
    executor.exec(request)?;
    if !request.output_path.exists() {
        return Err(anyhow!(
            "missing agent output {}",
            request.output_path.display()
        ));
    }
    fs::read_to_string(&request.output_path)
        .with_context(|| format!("read agent output {}", request.output_path.display()))
}

fn write_executor_log(path: &Path, output: &CommandOutput, output_limit: usize) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stdout));
    if output.stdout_truncated > 0 {
        buf.push_str(&format!("\n[stdout truncated {} bytes]\n", output.stdout_truncated));
    }
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stderr));
    if output.stderr_truncated > 0 {
        buf.push_str(&format!("\n[stderr truncated {} bytes]\n", output.stderr_truncated));
    }
    if output.timed_out {
        buf.push_str("\n[agent timed out]\n");
    }

    if buf.len() > output_limit {
        let mut keep = output_limit;
        while !buf.is_char_boundary(keep) {
            keep -= 1;
        }
        let dropped = buf.len() - keep;
        buf.truncate(keep);
        buf.push_str(&format!("\n[truncated {dropped} bytes]\n"));
    }

    fs::write(path, buf).with_context(|| format!("write agent log {}", path.display()))
}
