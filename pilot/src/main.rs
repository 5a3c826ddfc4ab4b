//! Plan, execute, and self-correct coding tasks from the command line.
//!
//! `pilot run` asks the planner agent for a plan and prints it; with
//! `--execute` (or `--auto`) the plan is run step by step in the project
//! directory. `pilot exec` runs a plan file, which lets a user edit a plan
//! before executing it. `pilot explain` and `pilot refactor` send a single
//! file to the agent.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use pilot::core::project_tree::IgnoreSet;
use pilot::core::types::{ContextFile, ExecutionPlan, PlanStep, StepKind, StepStatus};
use pilot::engine::{Engine, EngineEvent, EngineSettings, RunOutcome, SubmitOutcome};
use pilot::exit_codes;
use pilot::io::assist::CodexAssistant;
use pilot::io::config::{PilotConfig, PilotPaths, STATE_DIR, init_state_dir, load_config};
use pilot::io::planner::{CodexPlanner, extract_plan};
use pilot::io::process::ShellRunner;
use pilot::io::scan::snapshot;
use pilot::io::workspace::Workspace;
use pilot::logging;

#[derive(Parser)]
#[command(
    name = "pilot",
    version,
    about = "Plan, execute, and self-correct coding tasks"
)]
struct Cli {
    /// Project directory the agent works in.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.pilot/` with a default config.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Plan a task, and optionally execute the plan.
    Run {
        /// What the agent should do.
        task: String,
        /// Execute and self-correct failed steps without asking.
        #[arg(long)]
        auto: bool,
        /// Execute the plan instead of only printing it.
        #[arg(long)]
        execute: bool,
        /// Correction cycles allowed before halting.
        #[arg(long, value_name = "N")]
        max_corrections: Option<u32>,
        /// Project file to show the planner (repeatable).
        #[arg(long = "context", value_name = "FILE")]
        context: Vec<String>,
        /// Write the generated plan to a JSON file.
        #[arg(long, value_name = "FILE")]
        save_plan: Option<PathBuf>,
    },
    /// Execute a plan file.
    Exec {
        #[arg(long, value_name = "FILE")]
        plan: PathBuf,
        /// Task the plan belongs to (sent with correction requests).
        #[arg(long)]
        task: Option<String>,
        #[arg(long)]
        auto: bool,
        #[arg(long, value_name = "N")]
        max_corrections: Option<u32>,
    },
    /// Ask the agent to explain a project file.
    Explain {
        file: String,
    },
    /// Ask the agent to rewrite a project file, then confirm before writing.
    Refactor {
        file: String,
        /// What to change.
        #[arg(short, long)]
        instruction: String,
        /// Write the rewrite without asking.
        #[arg(short, long)]
        yes: bool,
    },
    /// Print the project structure snapshot.
    Tree,
    /// List a directory inside the project.
    Ls {
        dir: Option<String>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.root, force),
        Command::Run {
            task,
            auto,
            execute,
            max_corrections,
            context,
            save_plan,
        } => cmd_run(
            &cli.root,
            &task,
            &RunFlags {
                auto,
                max_corrections,
            },
            execute,
            &context,
            save_plan.as_deref(),
        ),
        Command::Exec {
            plan,
            task,
            auto,
            max_corrections,
        } => cmd_exec(
            &cli.root,
            &plan,
            task.as_deref(),
            &RunFlags {
                auto,
                max_corrections,
            },
        ),
        Command::Explain { file } => cmd_explain(&cli.root, &file),
        Command::Refactor {
            file,
            instruction,
            yes,
        } => cmd_refactor(&cli.root, &file, &instruction, yes),
        Command::Tree => cmd_tree(&cli.root),
        Command::Ls { dir } => cmd_ls(&cli.root, dir.as_deref()),
    }
}

/// Command-line overrides for [`PilotConfig`].
struct RunFlags {
    auto: bool,
    max_corrections: Option<u32>,
}

impl RunFlags {
    fn apply(&self, config: &mut PilotConfig) {
        config.autonomous |= self.auto;
        if let Some(max) = self.max_corrections {
            config.max_corrections = max;
        }
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let written = init_state_dir(root, force)?;
    if written {
        println!("wrote {STATE_DIR}/config.toml");
    } else {
        println!("kept existing {STATE_DIR}/config.toml (use --force to overwrite)");
    }
    Ok(exit_codes::OK)
}

fn open_project(root: &Path) -> Result<(Workspace, PilotConfig)> {
    let workspace = Workspace::open(root)?;
    let paths = PilotPaths::new(workspace.root());
    let config = load_config(&paths.config_path)
        .with_context(|| format!("load {}", paths.config_path.display()))?;
    Ok((workspace, config))
}

fn build_engine(
    workspace: Workspace,
    config: &PilotConfig,
) -> Engine<CodexPlanner, ShellRunner> {
    let settings = EngineSettings::from_config(config);
    let planner = CodexPlanner::from_config(workspace.root(), settings.ignore.clone(), &config.planner);
    Engine::new(workspace, planner, ShellRunner, settings)
}

fn cmd_run(
    root: &Path,
    task: &str,
    flags: &RunFlags,
    execute: bool,
    context: &[String],
    save_plan: Option<&Path>,
) -> Result<i32> {
    let (workspace, mut config) = open_project(root)?;
    flags.apply(&mut config);

    let files = context
        .iter()
        .map(|path| read_project_file(&workspace, path).context("load context file"))
        .collect::<Result<Vec<_>>>()?;

    let mut engine = build_engine(workspace, &config);
    let mut console = Console::new(config.max_corrections);
    let submitted = engine.submit_task(task, files, &mut |e: &EngineEvent| console.on_event(e));
    if let SubmitOutcome::Empty { thought } = submitted {
        println!("planner produced no steps: {}", thought.trim());
        return Ok(exit_codes::EMPTY_PLAN);
    }

    if let (Some(path), Some(plan)) = (save_plan, engine.session().plan()) {
        write_plan(path, plan)?;
        println!("saved plan to {}", path.display());
    }
    if !(execute || config.autonomous) {
        println!("preview only; pass --execute to run the plan");
        return Ok(exit_codes::OK);
    }

    let outcome = engine.execute(&mut |e: &EngineEvent| console.on_event(e));
    Ok(exit_code(&outcome))
}

fn cmd_exec(root: &Path, plan_path: &Path, task: Option<&str>, flags: &RunFlags) -> Result<i32> {
    let (workspace, mut config) = open_project(root)?;
    flags.apply(&mut config);

    let raw = fs::read_to_string(plan_path)
        .with_context(|| format!("read plan {}", plan_path.display()))?;
    let plan = extract_plan(&raw).with_context(|| format!("parse plan {}", plan_path.display()))?;
    if plan.is_empty() {
        println!("plan has no steps");
        return Ok(exit_codes::EMPTY_PLAN);
    }
    let task = task
        .map(str::to_string)
        .unwrap_or_else(|| plan.thought.clone());
    debug!(steps = plan.len(), "loaded plan file");

    let mut console = Console::new(config.max_corrections);
    console.show_plan(&plan);
    let mut engine = build_engine(workspace, &config);
    engine.load_plan(&task, plan);
    let outcome = engine.execute(&mut |e: &EngineEvent| console.on_event(e));
    Ok(exit_code(&outcome))
}

fn read_project_file(workspace: &Workspace, path: &str) -> Result<ContextFile> {
    let content = workspace
        .read(path)
        .with_context(|| format!("read {path}"))?;
    Ok(ContextFile {
        path: path.to_string(),
        content,
    })
}

fn cmd_explain(root: &Path, path: &str) -> Result<i32> {
    let (workspace, config) = open_project(root)?;
    let file = read_project_file(&workspace, path)?;
    let assistant = CodexAssistant::from_config(workspace.root(), &config.planner);
    let explanation = assistant.explain(&file)?;
    println!("{explanation}");
    Ok(exit_codes::OK)
}

fn cmd_refactor(root: &Path, path: &str, instruction: &str, yes: bool) -> Result<i32> {
    let (workspace, config) = open_project(root)?;
    let file = read_project_file(&workspace, path)?;
    let assistant = CodexAssistant::from_config(workspace.root(), &config.planner);
    let rewrite = assistant.refactor(&file, instruction)?;

    if rewrite.is_noop(&file.content) {
        println!("no changes proposed for {path}");
        return Ok(exit_codes::OK);
    }
    if !rewrite.summary.trim().is_empty() {
        println!("{}", rewrite.summary.trim());
    }
    println!("--- proposed {path} ---");
    print!("{}", rewrite.content);
    if !rewrite.content.ends_with('\n') {
        println!();
    }
    println!("--- end of {path} ---");

    if !(yes || confirm(&format!("apply changes to {path}?"))?) {
        println!("no changes written");
        return Ok(exit_codes::OK);
    }
    workspace.write(path, &rewrite.content)?;
    println!("updated {path}");
    Ok(exit_codes::OK)
}

/// Ask a yes/no question on stdin. End of input counts as no.
fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    std::io::stdout().flush().context("flush stdout")?;
    let mut answer = String::new();
    let read = std::io::stdin()
        .read_line(&mut answer)
        .context("read confirmation")?;
    if read == 0 {
        println!();
        return Ok(false);
    }
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn cmd_tree(root: &Path) -> Result<i32> {
    let (workspace, config) = open_project(root)?;
    let text = snapshot(workspace.root(), &IgnoreSet::with_defaults(&config.ignore))?;
    println!("{text}");
    Ok(exit_codes::OK)
}

fn cmd_ls(root: &Path, dir: Option<&str>) -> Result<i32> {
    let workspace = Workspace::open(root)?;
    for name in workspace.list(dir)? {
        println!("{name}");
    }
    Ok(exit_codes::OK)
}

fn write_plan(path: &Path, plan: &ExecutionPlan) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(plan).context("serialize plan")?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

fn exit_code(outcome: &RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Completed { .. } => exit_codes::OK,
        RunOutcome::Halted { .. } => exit_codes::HALTED,
        RunOutcome::NothingToExecute => exit_codes::EMPTY_PLAN,
    }
}

/// Prints engine progress to stdout as it happens.
struct Console {
    plan: ExecutionPlan,
    max_corrections: u32,
    corrections: u32,
    at_line_start: bool,
}

impl Console {
    fn new(max_corrections: u32) -> Self {
        Self {
            plan: ExecutionPlan::default(),
            max_corrections,
            corrections: 0,
            at_line_start: true,
        }
    }

    fn show_plan(&mut self, plan: &ExecutionPlan) {
        self.plan = plan.clone();
        let title = if self.corrections == 0 {
            "Plan".to_string()
        } else {
            format!("Correction plan {}", self.corrections)
        };
        println!("{title} ({} steps)", plan.len());
        if !plan.thought.trim().is_empty() {
            println!("  {}", plan.thought.trim());
        }
        for (i, step) in plan.plan.iter().enumerate() {
            println!("  {:>2}. {}", i + 1, describe_step(step));
        }
    }

    fn on_event(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::PlanReplaced(plan) => self.show_plan(plan),
            EngineEvent::StepStatusChanged { index, status } => {
                self.finish_line();
                let description = self
                    .plan
                    .plan
                    .get(*index)
                    .map(|s| s.description.as_str())
                    .unwrap_or_default();
                let n = self.plan.len();
                match status {
                    StepStatus::Running => println!("==> [{}/{n}] {description}", index + 1),
                    StepStatus::Success => println!("<== [{}/{n}] ok", index + 1),
                    StepStatus::Failure => println!("<== [{}/{n}] FAILED", index + 1),
                    StepStatus::Pending => {}
                }
            }
            EngineEvent::OutputAppended { chunk, .. } => {
                print!("{chunk}");
                self.at_line_start = chunk.ends_with('\n');
                if let Err(err) = std::io::stdout().flush() {
                    debug!(err = %err, "flush stdout");
                }
            }
            EngineEvent::CorrectionRequested {
                attempt,
                failed_step,
            } => {
                self.corrections = *attempt;
                println!(
                    "step {} failed; requesting correction {attempt}/{}",
                    failed_step + 1,
                    self.max_corrections
                );
            }
            EngineEvent::RunFinished(outcome) => {
                self.finish_line();
                println!("{}", summarize(outcome));
            }
            EngineEvent::PhaseChanged(phase) => debug!(phase = phase.as_str(), "phase changed"),
            EngineEvent::WorkspaceChanged => {}
        }
    }

    fn finish_line(&mut self) {
        if !self.at_line_start {
            println!();
            self.at_line_start = true;
        }
    }
}

fn describe_step(step: &PlanStep) -> String {
    let detail = match &step.kind {
        StepKind::Command { command } => command.as_deref().map(|c| format!("$ {c}")),
        StepKind::FileCreation { file_path, .. }
        | StepKind::FileModification { file_path, .. }
        | StepKind::FileDeletion { file_path } => file_path.clone(),
        StepKind::Thought => None,
    };
    match detail {
        Some(detail) => format!("[{}] {} ({detail})", step.kind.as_str(), step.description),
        None => format!("[{}] {}", step.kind.as_str(), step.description),
    }
}

fn summarize(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed { corrections: 0 } => "completed".to_string(),
        RunOutcome::Completed { corrections } => {
            format!("completed after {corrections} correction(s)")
        }
        RunOutcome::Halted {
            failed_step,
            reason,
            corrections,
            ..
        } => format!(
            "halted at step {} after {corrections} correction(s): {}",
            failed_step + 1,
            reason.describe()
        ),
        RunOutcome::NothingToExecute => "nothing to execute".to_string(),
    }
}
