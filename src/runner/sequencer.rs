//! Run sequencing: probe, execute and record each step in order.
//!
//! The sequencer walks the registry's topological order exactly once. For
//! every step it decides, in this order:
//!
//! 1. skip if a dependency failed or was itself blocked
//! 2. skip if a required step already aborted the run
//! 3. skip if the probe says the effect already holds (unless forced)
//! 4. skip if this is a dry run
//! 5. otherwise execute, with retries
//!
//! A required step that fails aborts the run; a best-effort failure is
//! recorded and the run continues.

use std::time::{Duration, Instant};

use crate::runner::report::{
    RunReport, RunReportBuilder, SkipReason, StepOutcome, StepResult, StepState,
};
use crate::runner::{RunContext, StepRegistry};
use crate::steps::{
    ActionRunner, Executor, ProbeOutcome, ProbeResult, Prober, RetryNotice, Step,
};

/// Progress events emitted during a run.
#[derive(Debug)]
pub enum RunEvent<'a> {
    /// A step is about to be considered.
    StepStarting {
        step: &'a Step,
        index: usize,
        total: usize,
    },
    /// The probe could not determine state; the step will run anyway.
    ProbeDegraded { step: &'a Step, reason: &'a str },
    /// The step's action is executing.
    Executing { step: &'a Step },
    /// A transient failure will be retried.
    Retrying {
        step: &'a Step,
        notice: &'a RetryNotice,
    },
    /// A step reached its final state.
    StepFinished {
        step: &'a Step,
        result: &'a StepResult,
    },
}

impl RunEvent<'_> {
    /// The step state this event moves to, if any.
    pub fn state(&self) -> Option<StepState> {
        match self {
            RunEvent::StepStarting { .. } => Some(StepState::Pending),
            RunEvent::ProbeDegraded { .. } => None,
            RunEvent::Executing { .. } => Some(StepState::Running),
            RunEvent::Retrying { .. } => Some(StepState::Retrying),
            RunEvent::StepFinished { result, .. } => Some(result.state()),
        }
    }
}

/// Drives a run over a [`StepRegistry`].
pub struct Sequencer<'a> {
    prober: &'a dyn Prober,
    runner: &'a dyn ActionRunner,
    sleep: fn(Duration),
}

impl<'a> Sequencer<'a> {
    /// Create a sequencer over a prober and an action runner.
    pub fn new(prober: &'a dyn Prober, runner: &'a dyn ActionRunner) -> Self {
        Self {
            prober,
            runner,
            sleep: std::thread::sleep,
        }
    }

    /// Replace the retry backoff sleep.
    pub fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    /// Run every step.
    pub fn run(&self, registry: &StepRegistry, ctx: &RunContext) -> RunReport {
        self.run_with_progress(registry, ctx, |_| {})
    }

    /// Run every step, reporting progress through a callback.
    pub fn run_with_progress(
        &self,
        registry: &StepRegistry,
        ctx: &RunContext,
        mut on_progress: impl FnMut(RunEvent<'_>),
    ) -> RunReport {
        let order = registry.topological_order();
        let total = order.len();
        let mut report =
            RunReportBuilder::new(registry.name().map(str::to_string), ctx.options.dry_run);

        tracing::debug!(
            "Starting run of {} steps (dry_run={})",
            total,
            ctx.options.dry_run
        );

        for (index, step) in order.into_iter().enumerate() {
            on_progress(RunEvent::StepStarting { step, index, total });
            let start = Instant::now();

            let result = self
                .run_step(step, ctx, &report, &mut on_progress)
                .with_duration(start.elapsed());

            tracing::debug!("Step '{}' -> {} ({})", step.name, result.state(), result.message);

            if result.outcome.is_failed() {
                if step.is_required() {
                    tracing::warn!("Required step '{}' failed, aborting run", step.name);
                    report.abort();
                } else {
                    let dependents = registry
                        .graph()
                        .dependents_of(&step.name)
                        .map_or(0, |d| d.len());
                    tracing::warn!(
                        "Best-effort step '{}' failed, continuing ({} direct dependent(s) blocked)",
                        step.name,
                        dependents
                    );
                }
            }

            on_progress(RunEvent::StepFinished {
                step,
                result: &result,
            });
            report.record(result);
        }

        let report = report.finish();
        tracing::info!(
            "Run finished: {} ({} succeeded, {} skipped, {} failed)",
            report.outcome(),
            report.succeeded_count(),
            report.skipped_count(),
            report.failed_count()
        );
        report
    }

    fn run_step(
        &self,
        step: &Step,
        ctx: &RunContext,
        report: &RunReportBuilder,
        on_progress: &mut impl FnMut(RunEvent<'_>),
    ) -> StepResult {
        let blocked_by = step.depends_on.iter().find(|dep| {
            report
                .outcome_of(dep)
                .is_some_and(|outcome| !outcome.unblocks_dependents())
        });
        if let Some(dep) = blocked_by {
            return StepResult::skipped(
                &step.name,
                step.criticality,
                SkipReason::BlockedByDependency(dep.clone()),
                None,
            );
        }

        if report.is_aborted() {
            return StepResult::skipped(
                &step.name,
                step.criticality,
                SkipReason::BlockedByAbort,
                None,
            );
        }

        let probe = if ctx.is_forced(&step.name) {
            tracing::debug!("Step '{}' forced, probe bypassed", step.name);
            None
        } else {
            Some(self.prober.probe(step, ctx))
        };

        if probe.as_ref().is_some_and(ProbeOutcome::is_satisfied) {
            return StepResult::skipped(
                &step.name,
                step.criticality,
                SkipReason::AlreadySatisfied,
                probe,
            );
        }

        let mut probe_degraded = false;
        if let Some(ProbeResult::Unknown(reason)) = probe.as_ref().map(|p| &p.result) {
            tracing::warn!(
                "Could not determine whether '{}' is satisfied ({}), running it",
                step.name,
                reason
            );
            probe_degraded = true;
            on_progress(RunEvent::ProbeDegraded { step, reason });
        }

        if ctx.options.dry_run {
            let mut result =
                StepResult::skipped(&step.name, step.criticality, SkipReason::DryRun, probe);
            result.probe_degraded = probe_degraded;
            return result;
        }

        self.execute(step, ctx, probe, probe_degraded, on_progress)
    }

    fn execute(
        &self,
        step: &Step,
        ctx: &RunContext,
        probe: Option<ProbeOutcome>,
        probe_degraded: bool,
        on_progress: &mut impl FnMut(RunEvent<'_>),
    ) -> StepResult {
        on_progress(RunEvent::Executing { step });

        let execution = Executor::new(self.runner)
            .with_sleep(self.sleep)
            .execute_with(step, ctx, &mut |notice: &RetryNotice| {
                on_progress(RunEvent::Retrying { step, notice })
            });

        let (outcome, message) = match execution.failure {
            None if execution.attempts > 1 => (
                StepOutcome::Succeeded,
                format!("succeeded after {} attempts", execution.attempts),
            ),
            None => (StepOutcome::Succeeded, "succeeded".to_string()),
            Some(failure) => {
                let message = failure.reason.clone();
                (StepOutcome::Failed(failure), message)
            }
        };

        StepResult {
            name: step.name.clone(),
            criticality: step.criticality,
            outcome,
            attempts: execution.attempts,
            duration: execution.duration,
            message,
            probe,
            probe_degraded,
            attempt_log: execution.attempt_log,
        }
    }
}
