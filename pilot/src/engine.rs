//! Plan execution engine: runs a plan step by step and drives the
//! self-correction loop.
//!
//! The engine owns the [`Session`]. Progress is pushed to the caller through
//! an event callback while a run is in progress; nothing is buffered until the
//! end. Step failures are never returned as errors: [`Engine::execute`] always
//! yields a [`RunOutcome`].

use tracing::{debug, info, instrument, warn};

use crate::core::budget::CorrectionBudget;
use crate::core::project_tree::IgnoreSet;
use crate::core::session::{Phase, Session};
use crate::core::step_check::{MalformedStepPolicy, StepAction, StepCheck, WriteIntent, check_step};
use crate::core::types::{ContextFile, DebugContext, ExecutionPlan, PlanStep, StepStatus};
use crate::io::config::PilotConfig;
use crate::io::planner::Planner;
use crate::io::process::CommandRunner;
use crate::io::scan::snapshot;
use crate::io::workspace::Workspace;

/// Knobs that shape a run.
///
/// `max_corrections` and `autonomous` seed the [`Session`]; afterwards the
/// session holds them.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_corrections: u32,
    pub autonomous: bool,
    pub malformed_steps: MalformedStepPolicy,
    /// Names hidden from the snapshot sent with a correction request.
    pub ignore: IgnoreSet,
}

impl EngineSettings {
    pub fn from_config(config: &PilotConfig) -> Self {
        Self {
            max_corrections: config.max_corrections,
            autonomous: config.autonomous,
            malformed_steps: config.malformed_steps,
            ignore: IgnoreSet::with_defaults(&config.ignore),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&PilotConfig::default())
    }
}

/// Observable progress of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    PhaseChanged(Phase),
    /// A new plan was loaded (initial or correction); all statuses are pending.
    PlanReplaced(ExecutionPlan),
    StepStatusChanged {
        index: usize,
        status: StepStatus,
    },
    /// Output produced by step `index`. Commands emit chunks as they arrive;
    /// file steps emit a single confirmation line.
    OutputAppended {
        index: usize,
        chunk: String,
    },
    CorrectionRequested {
        attempt: u32,
        failed_step: usize,
    },
    /// The run finished successfully and files on disk may have changed.
    WorkspaceChanged,
    RunFinished(RunOutcome),
}

/// Why a run stopped on a failed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// Autonomous mode is off.
    ManualMode,
    /// The correction budget is spent.
    BudgetExhausted,
    /// The planner had no replacement plan to offer.
    EmptyCorrection { thought: String },
}

impl HaltReason {
    pub fn describe(&self) -> String {
        match self {
            HaltReason::ManualMode => "autonomous mode is off".to_string(),
            HaltReason::BudgetExhausted => "correction budget exhausted".to_string(),
            HaltReason::EmptyCorrection { thought } if thought.trim().is_empty() => {
                "planner returned an empty correction plan".to_string()
            }
            HaltReason::EmptyCorrection { thought } => {
                format!("planner returned an empty correction plan: {}", thought.trim())
            }
        }
    }
}

/// Result of [`Engine::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every step of the current plan succeeded.
    Completed { corrections: u32 },
    /// Execution stopped on `failed_step` of the current plan.
    Halted {
        failed_step: usize,
        output: String,
        reason: HaltReason,
        corrections: u32,
    },
    /// No plan, or a plan with zero steps.
    NothingToExecute,
}

/// Result of [`Engine::submit_task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Ready { steps: usize },
    /// The planner produced no steps; `thought` says why.
    Empty { thought: String },
}

enum PassResult {
    Succeeded,
    Failed { index: usize, output: String },
}

/// Sequential plan executor with bounded self-correction.
pub struct Engine<P, R> {
    workspace: Workspace,
    planner: P,
    runner: R,
    malformed_steps: MalformedStepPolicy,
    ignore: IgnoreSet,
    session: Session,
    context_files: Vec<ContextFile>,
}

impl<P: Planner, R: CommandRunner> Engine<P, R> {
    pub fn new(workspace: Workspace, planner: P, runner: R, settings: EngineSettings) -> Self {
        let session = Session::new(
            CorrectionBudget::new(settings.max_corrections),
            settings.autonomous,
        );
        Self {
            workspace,
            planner,
            runner,
            malformed_steps: settings.malformed_steps,
            ignore: settings.ignore,
            session,
            context_files: Vec::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn planner(&self) -> &P {
        &self.planner
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Switch between manual and autonomous mode. Takes effect at the next
    /// failed step.
    pub fn set_autonomous(&mut self, autonomous: bool) {
        info!(autonomous, "mode changed");
        self.session.set_autonomous(autonomous);
    }

    /// Ask the planner for a plan and load it.
    ///
    /// `files` are kept and sent again with any correction request.
    #[instrument(skip_all, fields(files = files.len()))]
    pub fn submit_task(
        &mut self,
        task: &str,
        files: Vec<ContextFile>,
        on_event: &mut dyn FnMut(&EngineEvent),
    ) -> SubmitOutcome {
        self.session.set_task(task);
        self.set_phase(Phase::Planning, on_event);
        let plan = self.planner.generate_plan(task, &files);
        self.context_files = files;

        if plan.is_empty() {
            info!("planner returned no steps");
            self.session.clear_plan();
            self.set_phase(Phase::Idle, on_event);
            return SubmitOutcome::Empty {
                thought: plan.thought,
            };
        }

        let steps = plan.len();
        self.replace_plan(plan, on_event);
        SubmitOutcome::Ready { steps }
    }

    /// Load a plan supplied by the user (for example an edited plan file).
    pub fn load_plan(&mut self, task: &str, plan: ExecutionPlan) {
        self.session.set_task(task);
        self.session.load_plan(plan);
        self.session.set_phase(Phase::PlanReady);
    }

    /// Run the loaded plan from step 0.
    ///
    /// This is the manual trigger: it resets the correction budget. In
    /// autonomous mode a failed step leads to a correction plan, which
    /// replaces the current plan and runs from its first step.
    #[instrument(skip_all, fields(autonomous = self.session.is_autonomous()))]
    pub fn execute(&mut self, on_event: &mut dyn FnMut(&EngineEvent)) -> RunOutcome {
        if self.session.plan().is_none_or(ExecutionPlan::is_empty) {
            return self.finish(RunOutcome::NothingToExecute, on_event);
        }
        self.session.budget_mut().reset();

        loop {
            self.set_phase(Phase::Executing, on_event);
            let (index, output) = match self.run_pass(on_event) {
                PassResult::Succeeded => {
                    let corrections = self.session.budget().used();
                    info!(corrections, "plan completed");
                    self.set_phase(Phase::Completed, on_event);
                    on_event(&EngineEvent::WorkspaceChanged);
                    return self.finish(RunOutcome::Completed { corrections }, on_event);
                }
                PassResult::Failed { index, output } => (index, output),
            };

            if !self.session.is_autonomous() {
                return self.halt(index, output, HaltReason::ManualMode, on_event);
            }
            let Some(attempt) = self.session.budget_mut().try_consume() else {
                warn!(
                    max_corrections = self.session.budget().max(),
                    "correction budget exhausted"
                );
                return self.halt(index, output, HaltReason::BudgetExhausted, on_event);
            };

            let debug = self.debug_context(index, &output);
            self.set_phase(Phase::Correcting, on_event);
            on_event(&EngineEvent::CorrectionRequested {
                attempt,
                failed_step: index,
            });
            info!(attempt, failed_step = index, "requesting correction plan");
            let correction = self
                .planner
                .generate_correction(&debug, &self.context_files);
            if correction.is_empty() {
                let reason = HaltReason::EmptyCorrection {
                    thought: correction.thought,
                };
                return self.halt(index, output, reason, on_event);
            }
            self.replace_plan(correction, on_event);
        }
    }

    /// One pass over the current plan, stopping at the first failure.
    fn run_pass(&mut self, on_event: &mut dyn FnMut(&EngineEvent)) -> PassResult {
        let Some(plan) = self.session.plan().cloned() else {
            return PassResult::Succeeded;
        };
        for (index, step) in plan.plan.iter().enumerate() {
            if !self.session.start_step(index) {
                warn!(index, "step started out of order");
                return PassResult::Failed {
                    index,
                    output: "step started out of order".to_string(),
                };
            }
            on_event(&EngineEvent::StepStatusChanged {
                index,
                status: StepStatus::Running,
            });

            let (success, output) = self.run_step(index, step, on_event);
            self.session.finish_step(index, success, output.clone());
            let status = if success {
                StepStatus::Success
            } else {
                StepStatus::Failure
            };
            on_event(&EngineEvent::StepStatusChanged { index, status });
            debug!(index, kind = step.kind.as_str(), success, "step finished");

            if !success {
                return PassResult::Failed { index, output };
            }
        }
        PassResult::Succeeded
    }

    /// Execute one step. Returns whether it succeeded and its output.
    fn run_step(
        &self,
        index: usize,
        step: &PlanStep,
        on_event: &mut dyn FnMut(&EngineEvent),
    ) -> (bool, String) {
        let action = match check_step(step) {
            StepCheck::Ready(action) => action,
            StepCheck::Malformed(reason) => {
                warn!(index, reason = %reason, "malformed step");
                let (success, output) = match self.malformed_steps {
                    MalformedStepPolicy::Skip => (true, format!("skipped: {reason}")),
                    MalformedStepPolicy::Fail => (false, format!("malformed step: {reason}")),
                };
                emit_line(index, &output, on_event);
                return (success, output);
            }
        };

        match action {
            StepAction::Run { command } => {
                let mut transcript = String::new();
                let result = self.runner.run(command, self.workspace.root(), &mut |chunk: &str| {
                    transcript.push_str(chunk);
                    on_event(&EngineEvent::OutputAppended {
                        index,
                        chunk: chunk.to_string(),
                    });
                });
                match result {
                    Ok(result) => (result.success, transcript),
                    Err(err) => {
                        warn!(index, err = %err, "command could not be started");
                        (false, transcript)
                    }
                }
            }
            StepAction::Write {
                path,
                content,
                intent,
            } => {
                let verb = match intent {
                    WriteIntent::Create => "created",
                    WriteIntent::Modify => "updated",
                };
                let (success, output) = match self.workspace.write(path, content) {
                    Ok(()) => (true, format!("{verb} {path} ({} bytes)", content.len())),
                    Err(err) => (false, err.to_string()),
                };
                emit_line(index, &output, on_event);
                (success, output)
            }
            StepAction::Delete { path } => {
                let (success, output) = match self.workspace.delete(path) {
                    Ok(()) => (true, format!("deleted {path}")),
                    Err(err) => (false, err.to_string()),
                };
                emit_line(index, &output, on_event);
                (success, output)
            }
            StepAction::Reflect => (true, String::new()),
        }
    }

    fn debug_context(&self, index: usize, output: &str) -> DebugContext {
        let project_tree = snapshot(self.workspace.root(), &self.ignore)
            .unwrap_or_else(|err| format!("(project snapshot unavailable: {err:#})"));
        DebugContext {
            original_task: self.session.task().unwrap_or_default().to_string(),
            failed_plan: self.session.plan().cloned().unwrap_or_default(),
            failed_step_index: index,
            error_output: output.to_string(),
            project_tree,
        }
    }

    fn replace_plan(&mut self, plan: ExecutionPlan, on_event: &mut dyn FnMut(&EngineEvent)) {
        on_event(&EngineEvent::PlanReplaced(plan.clone()));
        self.session.load_plan(plan);
        self.set_phase(Phase::PlanReady, on_event);
    }

    fn halt(
        &mut self,
        failed_step: usize,
        output: String,
        reason: HaltReason,
        on_event: &mut dyn FnMut(&EngineEvent),
    ) -> RunOutcome {
        warn!(failed_step, reason = %reason.describe(), "run halted");
        self.set_phase(Phase::Halted, on_event);
        let corrections = self.session.budget().used();
        self.finish(
            RunOutcome::Halted {
                failed_step,
                output,
                reason,
                corrections,
            },
            on_event,
        )
    }

    fn finish(&self, outcome: RunOutcome, on_event: &mut dyn FnMut(&EngineEvent)) -> RunOutcome {
        on_event(&EngineEvent::RunFinished(outcome.clone()));
        outcome
    }

    fn set_phase(&mut self, phase: Phase, on_event: &mut dyn FnMut(&EngineEvent)) {
        if self.session.phase() != phase {
            self.session.set_phase(phase);
            on_event(&EngineEvent::PhaseChanged(phase));
        }
    }
}

fn emit_line(index: usize, line: &str, on_event: &mut dyn FnMut(&EngineEvent)) {
    on_event(&EngineEvent::OutputAppended {
        index,
        chunk: format!("{line}\n"),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedPlanner, ScriptedRunner, TempProject, status_trace};

    fn engine(
        project: &TempProject,
        planner: ScriptedPlanner,
        runner: ScriptedRunner,
        settings: EngineSettings,
    ) -> Engine<ScriptedPlanner, ScriptedRunner> {
        Engine::new(project.workspace(), planner, runner, settings)
    }

    fn autonomous(max_corrections: u32) -> EngineSettings {
        EngineSettings {
            max_corrections,
            autonomous: true,
            ..EngineSettings::default()
        }
    }

    fn plan(steps: Vec<PlanStep>) -> ExecutionPlan {
        ExecutionPlan {
            thought: "t".to_string(),
            plan: steps,
        }
    }

    #[test]
    fn submit_task_loads_plan_with_pending_statuses() {
        let project = TempProject::new();
        let planner = ScriptedPlanner::new().with_plan(plan(vec![
            PlanStep::thought("a"),
            PlanStep::thought("b"),
            PlanStep::thought("c"),
        ]));
        let mut engine = engine(&project, planner, ScriptedRunner::new(), EngineSettings::default());

        let mut events = Vec::new();
        let outcome = engine.submit_task("do it", Vec::new(), &mut |e: &EngineEvent| {
            events.push(e.clone());
        });

        assert_eq!(outcome, SubmitOutcome::Ready { steps: 3 });
        assert_eq!(engine.session().statuses(), &[StepStatus::Pending; 3]);
        assert_eq!(engine.session().phase(), Phase::PlanReady);
        assert_eq!(events[0], EngineEvent::PhaseChanged(Phase::Planning));
        assert!(matches!(events[1], EngineEvent::PlanReplaced(_)));
    }

    #[test]
    fn empty_plan_returns_to_idle() {
        let project = TempProject::new();
        let planner = ScriptedPlanner::new().with_plan(ExecutionPlan::empty("nothing to do"));
        let mut engine = engine(&project, planner, ScriptedRunner::new(), EngineSettings::default());

        let outcome = engine.submit_task("noop", Vec::new(), &mut |_: &EngineEvent| {});
        assert_eq!(
            outcome,
            SubmitOutcome::Empty {
                thought: "nothing to do".to_string()
            }
        );
        assert_eq!(engine.session().phase(), Phase::Idle);
        assert_eq!(
            engine.execute(&mut |_: &EngineEvent| {}),
            RunOutcome::NothingToExecute
        );
    }

    #[test]
    fn steps_run_strictly_in_order() {
        let project = TempProject::new();
        let runner = ScriptedRunner::new().respond("build", "ok\n", true);
        let mut engine = engine(&project, ScriptedPlanner::new(), runner, EngineSettings::default());
        engine.load_plan(
            "t",
            plan(vec![
                PlanStep::thought("think"),
                PlanStep::file_creation("make", "a.txt", "A"),
                PlanStep::command("build", "build"),
            ]),
        );

        let mut events = Vec::new();
        let outcome = engine.execute(&mut |e: &EngineEvent| events.push(e.clone()));

        assert_eq!(outcome, RunOutcome::Completed { corrections: 0 });
        assert_eq!(
            status_trace(&events),
            vec![
                (0, StepStatus::Running),
                (0, StepStatus::Success),
                (1, StepStatus::Running),
                (1, StepStatus::Success),
                (2, StepStatus::Running),
                (2, StepStatus::Success),
            ]
        );
        assert!(events.contains(&EngineEvent::WorkspaceChanged));
        assert_eq!(project.read("a.txt"), "A");
    }

    #[test]
    fn thought_step_has_no_side_effects() {
        let project = TempProject::new();
        let runner = ScriptedRunner::new();
        let mut engine = engine(&project, ScriptedPlanner::new(), runner, EngineSettings::default());
        engine.load_plan("t", plan(vec![PlanStep::thought("ponder")]));

        let outcome = engine.execute(&mut |_: &EngineEvent| {});

        assert_eq!(outcome, RunOutcome::Completed { corrections: 0 });
        assert_eq!(engine.session().statuses(), &[StepStatus::Success]);
        assert!(engine.runner().commands().is_empty());
        assert!(project.entries().is_empty());
    }

    #[test]
    fn manual_mode_halts_on_first_failure() {
        let project = TempProject::new();
        let runner = ScriptedRunner::new().respond("test", "1 failed\n", false);
        let planner = ScriptedPlanner::new();
        let mut engine = engine(&project, planner, runner, EngineSettings::default());
        engine.load_plan(
            "t",
            plan(vec![
                PlanStep::command("test", "test"),
                PlanStep::thought("never"),
            ]),
        );

        let outcome = engine.execute(&mut |_: &EngineEvent| {});

        assert!(matches!(
            outcome,
            RunOutcome::Halted {
                failed_step: 0,
                reason: HaltReason::ManualMode,
                corrections: 0,
                ..
            }
        ));
        assert_eq!(
            engine.session().statuses(),
            &[StepStatus::Failure, StepStatus::Pending]
        );
        assert!(engine.planner().debug_contexts().is_empty());
    }

    #[test]
    fn correction_replaces_plan_and_restarts_at_step_zero() {
        let project = TempProject::new();
        let runner = ScriptedRunner::new()
            .respond("first", "", true)
            .respond("broken", "boom\n", false)
            .respond("fixed", "", true);
        let planner = ScriptedPlanner::new().with_correction(plan(vec![
            PlanStep::command("fixed", "fixed"),
            PlanStep::thought("done"),
        ]));
        let mut engine = engine(&project, planner, runner, autonomous(5));
        engine.load_plan(
            "fix things",
            plan(vec![
                PlanStep::command("first", "first"),
                PlanStep::command("broken", "broken"),
            ]),
        );

        let mut events = Vec::new();
        let outcome = engine.execute(&mut |e: &EngineEvent| events.push(e.clone()));

        assert_eq!(outcome, RunOutcome::Completed { corrections: 1 });
        assert_eq!(engine.runner().commands(), vec!["first", "broken", "fixed"]);

        let replaced = events
            .iter()
            .position(|e| matches!(e, EngineEvent::PlanReplaced(_)))
            .expect("plan replaced");
        assert_eq!(
            status_trace(&events[replaced..])[0],
            (0, StepStatus::Running)
        );

        let contexts = engine.planner().debug_contexts();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].failed_step_index, 1);
        assert_eq!(contexts[0].original_task, "fix things");
        assert!(contexts[0].error_output.contains("boom"));
        assert_eq!(contexts[0].failed_plan.len(), 2);
    }

    #[test]
    fn empty_correction_halts() {
        let project = TempProject::new();
        let runner = ScriptedRunner::new().respond("x", "", false);
        let planner = ScriptedPlanner::new().with_correction(ExecutionPlan::empty("no idea"));
        let mut engine = engine(&project, planner, runner, autonomous(5));
        engine.load_plan("t", plan(vec![PlanStep::command("x", "x")]));

        let outcome = engine.execute(&mut |_: &EngineEvent| {});
        match outcome {
            RunOutcome::Halted {
                reason: HaltReason::EmptyCorrection { thought },
                corrections,
                ..
            } => {
                assert_eq!(thought, "no idea");
                assert_eq!(corrections, 1);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(engine.session().phase(), Phase::Halted);
    }

    #[test]
    fn malformed_step_policy_controls_outcome() {
        let project = TempProject::new();
        let malformed = PlanStep {
            description: "no command".to_string(),
            kind: crate::core::types::StepKind::Command { command: None },
        };

        let mut lenient = engine(
            &project,
            ScriptedPlanner::new(),
            ScriptedRunner::new(),
            EngineSettings::default(),
        );
        lenient.load_plan("t", plan(vec![malformed.clone()]));
        assert_eq!(
            lenient.execute(&mut |_: &EngineEvent| {}),
            RunOutcome::Completed { corrections: 0 }
        );
        assert!(
            lenient.session().outputs()[0]
                .as_deref()
                .is_some_and(|o| o.starts_with("skipped"))
        );

        let mut strict = engine(
            &project,
            ScriptedPlanner::new(),
            ScriptedRunner::new(),
            EngineSettings {
                malformed_steps: MalformedStepPolicy::Fail,
                ..EngineSettings::default()
            },
        );
        strict.load_plan("t", plan(vec![malformed]));
        assert!(matches!(
            strict.execute(&mut |_: &EngineEvent| {}),
            RunOutcome::Halted { failed_step: 0, .. }
        ));
    }

    #[test]
    fn traversal_fails_the_step() {
        let project = TempProject::new();
        let mut engine = engine(
            &project,
            ScriptedPlanner::new(),
            ScriptedRunner::new(),
            EngineSettings::default(),
        );
        engine.load_plan(
            "t",
            plan(vec![PlanStep::file_creation("escape", "../../etc/passwd", "x")]),
        );

        let outcome = engine.execute(&mut |_: &EngineEvent| {});
        match outcome {
            RunOutcome::Halted { output, .. } => {
                assert!(output.contains("escapes the workspace root"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn command_that_cannot_start_enters_correction() {
        let project = TempProject::new();
        let planner =
            ScriptedPlanner::new().with_correction(plan(vec![PlanStep::thought("skip it")]));
        let mut engine = engine(&project, planner, ScriptedRunner::new(), autonomous(5));
        engine.load_plan(
            "t",
            plan(vec![PlanStep::command("tool", "missing-tool --version")]),
        );

        let mut events = Vec::new();
        let outcome = engine.execute(&mut |e: &EngineEvent| events.push(e.clone()));

        assert_eq!(outcome, RunOutcome::Completed { corrections: 1 });
        assert_eq!(
            status_trace(&events)[..2],
            [(0, StepStatus::Running), (0, StepStatus::Failure)]
        );
        assert!(events.contains(&EngineEvent::CorrectionRequested {
            attempt: 1,
            failed_step: 0,
        }));
        let contexts = engine.planner().debug_contexts();
        assert_eq!(contexts.len(), 1);
        assert!(contexts[0].error_output.contains("failed to start command"));
    }

    #[test]
    fn file_steps_modify_and_delete_on_disk() {
        let project = TempProject::new();
        project.write("notes.txt", "old notes");
        project.write("stale.txt", "remove me");
        let mut engine = engine(
            &project,
            ScriptedPlanner::new(),
            ScriptedRunner::new(),
            EngineSettings::default(),
        );
        engine.load_plan(
            "t",
            plan(vec![
                PlanStep::file_modification("rewrite notes", "notes.txt", "new"),
                PlanStep::file_deletion("drop stale file", "stale.txt"),
            ]),
        );

        let outcome = engine.execute(&mut |_: &EngineEvent| {});

        assert_eq!(outcome, RunOutcome::Completed { corrections: 0 });
        assert_eq!(project.read("notes.txt"), "new");
        assert!(!project.exists("stale.txt"));
        assert_eq!(
            engine.session().outputs(),
            &[
                Some("updated notes.txt (3 bytes)".to_string()),
                Some("deleted stale.txt".to_string()),
            ]
        );
    }

    #[test]
    fn deleting_a_missing_file_fails_the_step() {
        let project = TempProject::new();
        let mut engine = engine(
            &project,
            ScriptedPlanner::new(),
            ScriptedRunner::new(),
            EngineSettings::default(),
        );
        engine.load_plan("t", plan(vec![PlanStep::file_deletion("drop", "ghost.txt")]));

        let outcome = engine.execute(&mut |_: &EngineEvent| {});

        assert!(matches!(
            outcome,
            RunOutcome::Halted {
                failed_step: 0,
                reason: HaltReason::ManualMode,
                ..
            }
        ));
        assert_eq!(engine.session().statuses(), &[StepStatus::Failure]);
    }

    #[test]
    fn switching_to_autonomous_after_a_manual_halt() {
        let project = TempProject::new();
        let runner = ScriptedRunner::new()
            .respond("broken", "boom\n", false)
            .respond("fixed", "", true);
        let planner =
            ScriptedPlanner::new().with_correction(plan(vec![PlanStep::command("fixed", "fixed")]));
        let mut engine = engine(&project, planner, runner, EngineSettings::default());
        engine.load_plan("t", plan(vec![PlanStep::command("broken", "broken")]));

        let first = engine.execute(&mut |_: &EngineEvent| {});
        assert!(matches!(
            first,
            RunOutcome::Halted {
                reason: HaltReason::ManualMode,
                ..
            }
        ));
        assert!(engine.planner().debug_contexts().is_empty());

        engine.set_autonomous(true);
        assert!(engine.session().is_autonomous());
        let second = engine.execute(&mut |_: &EngineEvent| {});

        assert_eq!(second, RunOutcome::Completed { corrections: 1 });
        assert_eq!(engine.planner().debug_contexts().len(), 1);
        assert_eq!(engine.runner().commands(), vec!["broken", "broken", "fixed"]);

        engine.set_autonomous(false);
        engine.load_plan("t", plan(vec![PlanStep::command("broken", "broken")]));
        let third = engine.execute(&mut |_: &EngineEvent| {});
        assert!(matches!(
            third,
            RunOutcome::Halted {
                reason: HaltReason::ManualMode,
                ..
            }
        ));
        assert_eq!(engine.planner().debug_contexts().len(), 1);
    }
}
