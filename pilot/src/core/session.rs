//! In-memory run state owned by the engine.
//!
//! The session holds the current plan together with its per-step statuses and
//! captured outputs, the engine phase, and the correction budget. It performs
//! no I/O so the state machine can be tested without a planner or a shell.

use serde::Serialize;

use super::budget::CorrectionBudget;
use super::types::{ExecutionPlan, StepStatus};

/// Engine lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Planning,
    PlanReady,
    Executing,
    Correcting,
    Halted,
    Completed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Planning => "planning",
            Phase::PlanReady => "plan-ready",
            Phase::Executing => "executing",
            Phase::Correcting => "correcting",
            Phase::Halted => "halted",
            Phase::Completed => "completed",
        }
    }
}

/// Current plan plus everything recorded while running it.
#[derive(Debug, Clone)]
pub struct Session {
    task: Option<String>,
    plan: Option<ExecutionPlan>,
    statuses: Vec<StepStatus>,
    outputs: Vec<Option<String>>,
    phase: Phase,
    budget: CorrectionBudget,
    autonomous: bool,
}

impl Session {
    pub fn new(budget: CorrectionBudget, autonomous: bool) -> Self {
        Self {
            task: None,
            plan: None,
            statuses: Vec::new(),
            outputs: Vec::new(),
            phase: Phase::Idle,
            budget,
            autonomous,
        }
    }

    pub fn task(&self) -> Option<&str> {
        self.task.as_deref()
    }

    pub fn set_task(&mut self, task: impl Into<String>) {
        self.task = Some(task.into());
    }

    pub fn plan(&self) -> Option<&ExecutionPlan> {
        self.plan.as_ref()
    }

    pub fn statuses(&self) -> &[StepStatus] {
        &self.statuses
    }

    pub fn outputs(&self) -> &[Option<String>] {
        &self.outputs
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn budget(&self) -> &CorrectionBudget {
        &self.budget
    }

    pub fn budget_mut(&mut self) -> &mut CorrectionBudget {
        &mut self.budget
    }

    pub fn is_autonomous(&self) -> bool {
        self.autonomous
    }

    pub fn set_autonomous(&mut self, autonomous: bool) {
        self.autonomous = autonomous;
    }

    /// Replace the plan wholesale. Statuses and outputs are reset to match the
    /// new step count; nothing carries over from the previous plan.
    pub fn load_plan(&mut self, plan: ExecutionPlan) {
        let len = plan.len();
        self.statuses = vec![StepStatus::Pending; len];
        self.outputs = vec![None; len];
        self.plan = Some(plan);
    }

    /// Drop the plan and everything recorded against it.
    pub fn clear_plan(&mut self) {
        self.plan = None;
        self.statuses.clear();
        self.outputs.clear();
    }

    /// Mark step `index` as running.
    ///
    /// Returns `false` (and changes nothing) if the index is out of range or
    /// an earlier step has not settled yet.
    pub fn start_step(&mut self, index: usize) -> bool {
        if index >= self.statuses.len() {
            return false;
        }
        if !self.statuses[..index].iter().all(|s| s.is_settled()) {
            return false;
        }
        self.statuses[index] = StepStatus::Running;
        true
    }

    /// Record the outcome of a running step.
    pub fn finish_step(&mut self, index: usize, success: bool, output: String) {
        if index >= self.statuses.len() {
            return;
        }
        self.statuses[index] = if success {
            StepStatus::Success
        } else {
            StepStatus::Failure
        };
        self.outputs[index] = Some(output);
    }
}
