//! Step execution engine.
//!
//! Runs a step's sub-actions in order under a per-attempt timeout budget,
//! classifies failures, and retries transient ones with bounded exponential
//! backoff. A retry resumes at the sub-action that failed; sub-actions that
//! already completed are not repeated.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::Result;
use crate::runner::RunContext;
use crate::shell::{execute, CommandResult};
use crate::steps::classify::{classify, classify_spawn_failure, Classification, FailureClass};
use crate::steps::Step;

/// Runs a single command on behalf of a step.
pub trait ActionRunner {
    /// Run `command` for `step` with at most `timeout` of wall-clock time.
    ///
    /// An `Err` means the command could not be started.
    fn run(
        &self,
        step: &Step,
        command: &str,
        ctx: &RunContext,
        timeout: Option<Duration>,
    ) -> Result<CommandResult>;
}

/// Production runner: executes through the configured shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellActionRunner;

impl ActionRunner for ShellActionRunner {
    fn run(
        &self,
        step: &Step,
        command: &str,
        ctx: &RunContext,
        timeout: Option<Duration>,
    ) -> Result<CommandResult> {
        execute(command, &ctx.command_options(&step.env, timeout))
    }
}

/// Captured result of one sub-action invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRecord {
    /// The command that ran.
    pub command: String,
    /// Exit code (None if killed, timed out or never started).
    pub exit_code: Option<i32>,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr (or the spawn error).
    pub stderr: String,
    /// How long it ran.
    #[serde(with = "crate::runner::report::duration_ms")]
    pub duration: Duration,
    /// Whether it was cancelled by the timeout.
    pub timed_out: bool,
}

impl ActionRecord {
    fn from_result(command: &str, result: &CommandResult) -> Self {
        Self {
            command: command.to_string(),
            exit_code: result.exit_code,
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
            duration: result.duration,
            timed_out: result.timed_out,
        }
    }

    fn spawn_failed(command: &str, message: String) -> Self {
        Self {
            command: command.to_string(),
            exit_code: None,
            stdout: String::new(),
            stderr: message,
            duration: Duration::ZERO,
            timed_out: false,
        }
    }
}

/// One attempt at a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Sub-actions invoked during this attempt.
    pub actions: Vec<ActionRecord>,
    /// Wall-clock time of the attempt.
    #[serde(with = "crate::runner::report::duration_ms")]
    pub duration: Duration,
    /// Why the attempt failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Classification>,
}

impl AttemptRecord {
    /// Whether this attempt completed every remaining sub-action.
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Final failure of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    /// Always `Permanent` once the executor gives up.
    pub class: FailureClass,
    /// Reason of the last failed attempt.
    pub reason: String,
    /// Whether the last failure was transient and retries ran out.
    pub retries_exhausted: bool,
}

/// Result of executing a step.
#[derive(Debug, Clone)]
pub struct Execution {
    /// Number of attempts made (at least 1).
    pub attempts: u32,
    /// Total time including backoff.
    pub duration: Duration,
    /// Every attempt, successful or not.
    pub attempt_log: Vec<AttemptRecord>,
    /// Set when the step failed.
    pub failure: Option<StepFailure>,
}

impl Execution {
    /// Whether the step's action completed.
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Notification that a transient failure is about to be retried.
#[derive(Debug, Clone)]
pub struct RetryNotice {
    /// The attempt that just failed (1-based).
    pub attempt: u32,
    /// Why it failed.
    pub classification: Classification,
    /// Delay before the next attempt.
    pub delay: Duration,
}

/// Runs steps through an [`ActionRunner`] with retry handling.
pub struct Executor<'a> {
    runner: &'a dyn ActionRunner,
    sleep: fn(Duration),
}

impl<'a> Executor<'a> {
    /// Create an executor that sleeps for real between retries.
    pub fn new(runner: &'a dyn ActionRunner) -> Self {
        Self {
            runner,
            sleep: std::thread::sleep,
        }
    }

    /// Replace the backoff sleep (tests pass a no-op).
    pub fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    /// Execute a step.
    pub fn execute(&self, step: &Step, ctx: &RunContext) -> Execution {
        self.execute_with(step, ctx, &mut |_| {})
    }

    /// Execute a step, calling `on_retry` before each backoff delay.
    pub fn execute_with(
        &self,
        step: &Step,
        ctx: &RunContext,
        on_retry: &mut dyn FnMut(&RetryNotice),
    ) -> Execution {
        let start = Instant::now();
        let policy = &step.retry;
        let mut attempt_log = Vec::new();
        let mut next_action = 0;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            tracing::debug!(
                "Step '{}' attempt {} starting at action {}/{}",
                step.name,
                attempt,
                next_action + 1,
                step.actions.len()
            );

            let record = self.run_attempt(step, ctx, attempt, &mut next_action);
            let failure = record.failure.clone();
            attempt_log.push(record);

            let Some(classification) = failure else {
                return Execution {
                    attempts: attempt,
                    duration: start.elapsed(),
                    attempt_log,
                    failure: None,
                };
            };

            tracing::debug!(
                "Step '{}' attempt {} failed: {} ({})",
                step.name,
                attempt,
                classification.class,
                classification.reason
            );

            if classification.class == FailureClass::Permanent {
                return failed(start, attempt, attempt_log, classification.reason, false);
            }

            if attempt > policy.max_retries {
                let reason = format!(
                    "{} (gave up after {} attempt{})",
                    classification.reason,
                    attempt,
                    if attempt == 1 { "" } else { "s" }
                );
                return failed(start, attempt, attempt_log, reason, true);
            }

            let delay = policy.delay_for(attempt - 1);
            tracing::warn!(
                "Step '{}' failed transiently ({}), retrying in {:?}",
                step.name,
                classification.reason,
                delay
            );
            on_retry(&RetryNotice {
                attempt,
                classification,
                delay,
            });
            if !delay.is_zero() {
                (self.sleep)(delay);
            }
        }
    }

    /// Run the remaining sub-actions once, advancing `next_action` past each
    /// one that succeeds.
    fn run_attempt(
        &self,
        step: &Step,
        ctx: &RunContext,
        attempt: u32,
        next_action: &mut usize,
    ) -> AttemptRecord {
        let started = Instant::now();
        let deadline = step.timeout.and_then(|t| started.checked_add(t));
        let mut actions = Vec::new();
        let mut failure = None;

        while let Some(command) = step.actions.get(*next_action) {
            let remaining = match deadline {
                Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                    Some(left) if !left.is_zero() => Some(left),
                    _ => {
                        failure = Some(Classification::timed_out());
                        break;
                    }
                },
                None => None,
            };

            match self.runner.run(step, command, ctx, remaining) {
                Ok(result) if result.success => {
                    actions.push(ActionRecord::from_result(command, &result));
                    *next_action += 1;
                }
                Ok(result) => {
                    actions.push(ActionRecord::from_result(command, &result));
                    failure = Some(classify(&result, &step.retry));
                    break;
                }
                Err(e) => {
                    let message = e.to_string();
                    failure = Some(classify_spawn_failure(&message));
                    actions.push(ActionRecord::spawn_failed(command, message));
                    break;
                }
            }
        }

        AttemptRecord {
            attempt,
            actions,
            duration: started.elapsed(),
            failure,
        }
    }
}

fn failed(
    start: Instant,
    attempts: u32,
    attempt_log: Vec<AttemptRecord>,
    reason: String,
    retries_exhausted: bool,
) -> Execution {
    Execution {
        attempts,
        duration: start.elapsed(),
        attempt_log,
        failure: Some(StepFailure {
            class: FailureClass::Permanent,
            reason,
            retries_exhausted,
        }),
    }
}
