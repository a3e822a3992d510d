//! The structured record of one run.
//!
//! A [`RunReport`] is assembled by the sequencer through a
//! [`RunReportBuilder`] and is read-only once finished. It serializes to
//! JSON for `--report-json`.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Criticality;
use crate::steps::{AttemptRecord, ProbeOutcome, StepFailure};

/// Observable state of a step during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    /// Not visited yet.
    Pending,
    /// An attempt is executing.
    Running,
    /// Waiting to retry after a transient failure.
    Retrying,
    /// Not executed.
    Skipped,
    /// Action completed.
    Succeeded,
    /// Action failed permanently.
    Failed,
}

impl StepState {
    /// Check if this is a terminal state (no more changes expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Skipped | StepState::Succeeded | StepState::Failed
        )
    }

    /// Get a display character for this state.
    pub fn display_char(&self) -> char {
        match self {
            StepState::Pending => '○',
            StepState::Running => '◉',
            StepState::Retrying => '↻',
            StepState::Skipped => '⊘',
            StepState::Succeeded => '✓',
            StepState::Failed => '✗',
        }
    }
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepState::Pending => "pending",
            StepState::Running => "running",
            StepState::Retrying => "retrying",
            StepState::Skipped => "skipped",
            StepState::Succeeded => "succeeded",
            StepState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Why a step was not executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The probe reported the effect already holds.
    AlreadySatisfied,
    /// Dry run: the step would have executed.
    DryRun,
    /// A dependency failed or was itself blocked.
    BlockedByDependency(String),
    /// A required step failed earlier in the run.
    BlockedByAbort,
}

impl SkipReason {
    /// Whether dependents may proceed as if this step succeeded.
    pub fn counts_as_success(&self) -> bool {
        matches!(self, SkipReason::AlreadySatisfied | SkipReason::DryRun)
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::AlreadySatisfied => write!(f, "already satisfied"),
            SkipReason::DryRun => write!(f, "dry run"),
            SkipReason::BlockedByDependency(dep) => {
                write!(f, "blocked by failed dependency '{}'", dep)
            }
            SkipReason::BlockedByAbort => write!(f, "blocked by abort"),
        }
    }
}

/// Final outcome of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The action ran and completed.
    Succeeded,
    /// The action did not run.
    Skipped(SkipReason),
    /// The action failed permanently.
    Failed(StepFailure),
}

impl StepOutcome {
    /// The terminal state for this outcome.
    pub fn state(&self) -> StepState {
        match self {
            StepOutcome::Succeeded => StepState::Succeeded,
            StepOutcome::Skipped(_) => StepState::Skipped,
            StepOutcome::Failed(_) => StepState::Failed,
        }
    }

    /// Whether dependents may run after this outcome.
    pub fn unblocks_dependents(&self) -> bool {
        match self {
            StepOutcome::Succeeded => true,
            StepOutcome::Skipped(reason) => reason.counts_as_success(),
            StepOutcome::Failed(_) => false,
        }
    }

    /// Whether this is a failure.
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

/// Everything recorded about one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    /// Step name.
    pub name: String,
    /// Whether failure aborts the run.
    pub criticality: Criticality,
    /// Final outcome.
    pub outcome: StepOutcome,
    /// Attempts made (0 when skipped).
    pub attempts: u32,
    /// Time spent on the step, probe included.
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    /// One-line summary for display.
    pub message: String,
    /// Probe result, if the probe ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeOutcome>,
    /// The probe could not determine state and the step ran anyway.
    pub probe_degraded: bool,
    /// Every attempt with captured output.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attempt_log: Vec<AttemptRecord>,
}

impl StepResult {
    /// A skipped step that never ran.
    pub fn skipped(
        name: &str,
        criticality: Criticality,
        reason: SkipReason,
        probe: Option<ProbeOutcome>,
    ) -> Self {
        let message = match (&reason, &probe) {
            (SkipReason::AlreadySatisfied, Some(p)) => {
                format!("{} ({})", reason, p.description)
            }
            _ => reason.to_string(),
        };
        Self {
            name: name.to_string(),
            criticality,
            outcome: StepOutcome::Skipped(reason),
            attempts: 0,
            duration: Duration::ZERO,
            message,
            probe,
            probe_degraded: false,
            attempt_log: Vec::new(),
        }
    }

    /// Set the time spent.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// The terminal state.
    pub fn state(&self) -> StepState {
        self.outcome.state()
    }

    /// Combined output of every captured action, attempt by attempt.
    pub fn captured_output(&self) -> String {
        let mut out = String::new();
        for attempt in &self.attempt_log {
            for action in &attempt.actions {
                out.push_str(&format!("[attempt {}] $ {}\n", attempt.attempt, action.command));
                for stream in [&action.stdout, &action.stderr] {
                    if !stream.trim().is_empty() {
                        out.push_str(stream.trim_end());
                        out.push('\n');
                    }
                }
            }
        }
        out
    }
}

/// Overall verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every step succeeded or was skipped as satisfied.
    Success,
    /// Only best-effort steps failed.
    PartialFailure,
    /// A required step failed.
    Aborted,
}

impl RunOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Success => 0,
            RunOutcome::PartialFailure => 3,
            RunOutcome::Aborted => 4,
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Success => write!(f, "success"),
            RunOutcome::PartialFailure => write!(f, "partial failure"),
            RunOutcome::Aborted => write!(f, "aborted"),
        }
    }
}

/// Immutable record of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    name: Option<String>,
    started_at: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    duration: Duration,
    dry_run: bool,
    steps: Vec<StepResult>,
    outcome: RunOutcome,
}

impl RunReport {
    /// Manifest name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// When the run started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Total run time.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Whether this was a dry run.
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Step results in execution order.
    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    /// Look a step result up by name.
    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Overall verdict.
    pub fn outcome(&self) -> RunOutcome {
        self.outcome
    }

    /// Steps that ran and succeeded.
    pub fn succeeded_count(&self) -> usize {
        self.count(StepState::Succeeded)
    }

    /// Steps that were skipped for any reason.
    pub fn skipped_count(&self) -> usize {
        self.count(StepState::Skipped)
    }

    /// Steps that failed.
    pub fn failed_count(&self) -> usize {
        self.count(StepState::Failed)
    }

    fn count(&self, state: StepState) -> usize {
        self.steps.iter().filter(|s| s.state() == state).count()
    }
}

/// Accumulates step results while a run is in progress.
#[derive(Debug)]
pub struct RunReportBuilder {
    name: Option<String>,
    started_at: DateTime<Utc>,
    started: Instant,
    dry_run: bool,
    aborted: bool,
    steps: Vec<StepResult>,
}

impl RunReportBuilder {
    /// Start a report now.
    pub fn new(name: Option<String>, dry_run: bool) -> Self {
        Self {
            name,
            started_at: Utc::now(),
            started: Instant::now(),
            dry_run,
            aborted: false,
            steps: Vec::new(),
        }
    }

    /// Record a finished step.
    pub fn record(&mut self, result: StepResult) {
        self.steps.push(result);
    }

    /// Mark the run aborted.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    /// Whether the run has been aborted.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Outcome recorded so far for `step`.
    pub fn outcome_of(&self, step: &str) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|s| s.name == step)
            .map(|s| &s.outcome)
    }

    /// Finish the report.
    pub fn finish(self) -> RunReport {
        let outcome = if self.aborted {
            RunOutcome::Aborted
        } else if self.steps.iter().any(|s| s.outcome.is_failed()) {
            RunOutcome::PartialFailure
        } else {
            RunOutcome::Success
        };

        RunReport {
            name: self.name,
            started_at: self.started_at,
            duration: self.started.elapsed(),
            dry_run: self.dry_run,
            steps: self.steps,
            outcome,
        }
    }
}

/// Serialize a `Duration` as whole milliseconds.
pub mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    /// Serialize `duration` as a millisecond count.
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }
}
