//! Run command implementation.
//!
//! The `provisor run` command probes and executes every step in
//! dependency order, then prints the run report.

use std::fs;

use crate::cli::args::RunArgs;
use crate::error::{ProvisorError, Result};
use crate::report::{exit_code, HumanReporter, JsonReporter};
use crate::runner::{RunEvent, RunOptions, RunReport, Sequencer, StepOutcome};
use crate::steps::{ShellActionRunner, ShellProber};
use crate::ui::{format_duration, OutputMode, SpinnerHandle, UserInterface};

use super::dispatcher::{Command, CommandResult};
use super::project::{LoadedProject, ProjectLocation};

/// The run command implementation.
pub struct RunCommand {
    location: ProjectLocation,
    args: RunArgs,
    colors: bool,
}

impl RunCommand {
    /// Create a new run command.
    pub fn new(location: ProjectLocation, args: RunArgs, colors: bool) -> Self {
        Self {
            location,
            args,
            colors,
        }
    }

    /// Get the command arguments.
    pub fn args(&self) -> &RunArgs {
        &self.args
    }

    fn build_options(&self) -> RunOptions {
        RunOptions {
            dry_run: self.args.dry_run,
            force: self.args.force.iter().cloned().collect(),
        }
    }

    fn check_forced_steps(&self, project: &LoadedProject) -> Result<()> {
        match self
            .args
            .force
            .iter()
            .find(|name| project.registry.get(name).is_none())
        {
            Some(name) => Err(ProvisorError::ManifestValidationError {
                message: format!("--force names unknown step '{}'", name),
            }),
            None => Ok(()),
        }
    }

    fn needs_confirmation(&self, ui: &dyn UserInterface) -> bool {
        !self.args.dry_run
            && !self.args.yes
            && !self.args.ci
            && !self.args.non_interactive
            && ui.is_interactive()
    }

    fn write_json_report(&self, report: &RunReport) -> Result<()> {
        let Some(path) = &self.args.report_json else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, JsonReporter.render(report)?)?;
        tracing::debug!("Wrote JSON report to {}", path.display());
        Ok(())
    }
}

impl Command for RunCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let project = self.location.load(&self.args.vars, self.build_options())?;
        self.check_forced_steps(&project)?;

        let name = project.display_name();
        if self.args.dry_run {
            ui.show_header(&format!("Provisioning {} (dry run)", name));
            ui.message("Dry run: steps are probed but nothing is executed");
        } else {
            ui.show_header(&format!("Provisioning {}", name));
        }
        if ui.output_mode() == OutputMode::Verbose {
            ui.message(&format!("Manifest: {}", project.loaded.path.display()));
        }

        if project.registry.is_empty() {
            ui.warning("Manifest defines no steps");
        }

        if self.needs_confirmation(ui) {
            let question = format!(
                "Apply {} step(s) in {}?",
                project.registry.len(),
                project.ctx.working_dir.display()
            );
            if !ui.confirm(&question, true)? {
                ui.warning("Run cancelled");
                return Ok(CommandResult::failure(1));
            }
        }

        let prober = ShellProber;
        let runner = ShellActionRunner;
        let sequencer = Sequencer::new(&prober, &runner);

        let interactive = ui.is_interactive();
        let mut spinner: Option<Box<dyn SpinnerHandle>> = None;

        let report = sequencer.run_with_progress(&project.registry, &project.ctx, |event| {
            match event {
                RunEvent::StepStarting { index, total, .. } => {
                    ui.show_progress(index + 1, total);
                }
                RunEvent::ProbeDegraded { step, reason } => {
                    ui.warning(&format!(
                        "{}: probe inconclusive ({}), running anyway",
                        step.name, reason
                    ));
                }
                RunEvent::Executing { step } => {
                    spinner = Some(ui.start_spinner(&format!("{}...", step.title)));
                }
                RunEvent::Retrying { step, notice } => {
                    let msg = format!(
                        "{}: attempt {} failed ({}), retrying in {}",
                        step.title,
                        notice.attempt,
                        notice.classification.reason,
                        format_duration(notice.delay)
                    );
                    match spinner.as_mut() {
                        Some(s) => s.set_message(&msg),
                        None => ui.warning(&msg),
                    }
                }
                RunEvent::StepFinished { step, result } => {
                    let duration = format_duration(result.duration);
                    let line = match &result.outcome {
                        StepOutcome::Succeeded => format!("{} ({})", step.title, duration),
                        StepOutcome::Skipped(_) => format!("{}: {}", step.title, result.message),
                        StepOutcome::Failed(_) => {
                            format!("{} failed: {} ({})", step.title, result.message, duration)
                        }
                    };

                    if let Some(mut s) = spinner.take() {
                        match &result.outcome {
                            StepOutcome::Succeeded => s.finish_success(&line),
                            StepOutcome::Skipped(_) => s.finish_skipped(&line),
                            StepOutcome::Failed(_) => s.finish_error(&line),
                        }
                        if interactive {
                            return;
                        }
                    }

                    match &result.outcome {
                        StepOutcome::Succeeded => ui.success(&line),
                        StepOutcome::Skipped(_) => ui.message(&format!("  {}", line)),
                        StepOutcome::Failed(_) => ui.error(&line),
                    }
                }
            }
        });

        let reporter = HumanReporter::new(self.colors, ui.output_mode().shows_command_output());
        ui.message(&reporter.render(&report));

        self.write_json_report(&report)?;

        Ok(CommandResult::from_exit_code(exit_code(&report)))
    }
}
