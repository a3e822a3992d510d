//! Human-readable run summary.

use std::fmt::Write;

use crate::config::Criticality;
use crate::runner::{RunOutcome, RunReport, StepOutcome, StepResult, StepState};
use crate::steps::ProbeResult;
use crate::ui::{format_duration, ProvisorTheme};

/// Renders a [`RunReport`] as a boxed terminal summary.
#[derive(Debug, Clone)]
pub struct HumanReporter {
    theme: ProvisorTheme,
    verbose: bool,
}

impl HumanReporter {
    /// Create a reporter. `colors` selects the styled theme; `verbose`
    /// includes captured output of every step, not just failed ones.
    pub fn new(colors: bool, verbose: bool) -> Self {
        Self {
            theme: ProvisorTheme::for_colors(colors),
            verbose,
        }
    }

    /// Render the full summary.
    pub fn render(&self, report: &RunReport) -> String {
        let mut out = String::new();
        let b = &self.theme.border;

        let title = match report.name() {
            Some(name) if report.dry_run() => format!("Summary: {} (dry run) ", name),
            Some(name) => format!("Summary: {} ", name),
            None if report.dry_run() => "Summary (dry run) ".to_string(),
            None => "Summary ".to_string(),
        };
        writeln!(out).ok();
        writeln!(
            out,
            "  {} {}",
            b.apply_to("┌─"),
            b.apply_to(format!("{:─<34}", title))
        )
        .ok();

        for step in report.steps() {
            self.render_step(&mut out, step);
        }

        writeln!(out, "  {}", b.apply_to("├────────────────────────────────────")).ok();
        writeln!(
            out,
            "  {} Total: {} {} {} run {} {} skipped {} {} failed",
            b.apply_to("│"),
            self.theme.duration.apply_to(format_duration(report.duration())),
            self.theme.dim.apply_to("·"),
            report.succeeded_count(),
            self.theme.dim.apply_to("·"),
            report.skipped_count(),
            self.theme.dim.apply_to("·"),
            report.failed_count(),
        )
        .ok();
        writeln!(out, "  {}", b.apply_to("└────────────────────────────────────")).ok();

        self.render_output(&mut out, report);

        writeln!(out).ok();
        writeln!(out, "{}", self.verdict(report)).ok();
        out
    }

    fn render_step(&self, out: &mut String, step: &StepResult) {
        let b = &self.theme.border;
        let state = step.state();
        let icon = self.styled_icon(state);

        let right_side = match &step.outcome {
            StepOutcome::Succeeded => {
                let mut s = self
                    .theme
                    .duration
                    .apply_to(format_duration(step.duration))
                    .to_string();
                if step.attempts > 1 {
                    s.push_str(&format!(" ({} attempts)", step.attempts));
                }
                s
            }
            StepOutcome::Skipped(_) => self.theme.dim.apply_to(&step.message).to_string(),
            StepOutcome::Failed(failure) => {
                let mut detail = format!("{} failure: {}", failure.class, failure.reason);
                if failure.retries_exhausted {
                    detail.push_str(&format!(" (retries exhausted after {} attempts)", step.attempts));
                }
                if step.criticality == Criticality::BestEffort {
                    detail.push_str(" [best effort]");
                }
                self.theme.error.apply_to(detail).to_string()
            }
        };

        writeln!(
            out,
            "  {} {} {:<20} {:<9} {}",
            b.apply_to("│"),
            icon,
            step.name,
            state.to_string(),
            right_side
        )
        .ok();

        if step.probe_degraded {
            let reason = match step.probe.as_ref().map(|p| &p.result) {
                Some(ProbeResult::Unknown(reason)) => format!(": {}", reason),
                _ => String::new(),
            };
            writeln!(
                out,
                "  {}   {}",
                b.apply_to("│"),
                self.theme
                    .warning
                    .apply_to(format!("⚠ probe inconclusive, ran anyway{}", reason))
            )
            .ok();
        }
    }

    fn render_output(&self, out: &mut String, report: &RunReport) {
        for step in report.steps() {
            let show = step.outcome.is_failed() || (self.verbose && !step.attempt_log.is_empty());
            if !show {
                continue;
            }
            let captured = step.captured_output();
            if captured.is_empty() {
                continue;
            }
            writeln!(out).ok();
            writeln!(out, "{}", self.theme.format_header(&format!("Output of {}", step.name))).ok();
            for line in captured.lines() {
                writeln!(out, "    {}", self.theme.command.apply_to(line)).ok();
            }
        }
    }

    fn verdict(&self, report: &RunReport) -> String {
        let code = report.outcome().exit_code();
        match report.outcome() {
            RunOutcome::Success => self
                .theme
                .format_success(&format!("Run succeeded (exit {})", code)),
            RunOutcome::PartialFailure => self.theme.format_warning(&format!(
                "Run finished with {} failed best-effort step(s) (exit {})",
                report.failed_count(),
                code
            )),
            RunOutcome::Aborted => self
                .theme
                .format_error(&format!("Run aborted by a required step failure (exit {})", code)),
        }
    }

    fn styled_icon(&self, state: StepState) -> String {
        let icon = state.display_char();
        match state {
            StepState::Succeeded => self.theme.success.apply_to(icon).to_string(),
            StepState::Failed => self.theme.error.apply_to(icon).to_string(),
            StepState::Running | StepState::Retrying => self.theme.info.apply_to(icon).to_string(),
            StepState::Pending | StepState::Skipped => self.theme.dim.apply_to(icon).to_string(),
        }
    }
}
