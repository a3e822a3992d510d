//! Status command implementation.
//!
//! The `provisor status` command runs every probe (read-only) and shows
//! which steps are already satisfied and which would run.

use serde::Serialize;

use crate::cli::args::StatusArgs;
use crate::error::{ProvisorError, Result};
use crate::runner::RunOptions;
use crate::steps::{ProbeOutcome, ProbeResult, Prober, ShellProber, Step};
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandResult};
use super::project::ProjectLocation;

#[derive(Debug, Serialize)]
struct StepStatus<'a> {
    name: &'a str,
    #[serde(flatten)]
    probe: ProbeOutcome,
    has_check: bool,
}

/// The status command implementation.
pub struct StatusCommand {
    location: ProjectLocation,
    args: StatusArgs,
}

impl StatusCommand {
    /// Create a new status command.
    pub fn new(location: ProjectLocation, args: StatusArgs) -> Self {
        Self { location, args }
    }

    /// Get the command arguments.
    pub fn args(&self) -> &StatusArgs {
        &self.args
    }

    fn selected<'a>(&self, order: Vec<&'a Step>) -> Result<Vec<&'a Step>> {
        match &self.args.step {
            None => Ok(order),
            Some(name) => {
                let step = order.into_iter().find(|s| &s.name == name).ok_or_else(|| {
                    ProvisorError::ManifestValidationError {
                        message: format!("Unknown step '{}'", name),
                    }
                })?;
                Ok(vec![step])
            }
        }
    }
}

impl Command for StatusCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let project = self.location.load(&self.args.vars, RunOptions::default())?;
        let steps = self.selected(project.registry.topological_order())?;

        let prober = ShellProber;
        let statuses: Vec<StepStatus<'_>> = steps
            .iter()
            .map(|step| StepStatus {
                name: &step.name,
                probe: prober.probe(step, &project.ctx),
                has_check: step.probe.is_some(),
            })
            .collect();

        if self.args.json {
            let json = serde_json::to_string_pretty(&statuses).map_err(anyhow::Error::from)?;
            println!("{}", json);
            return Ok(CommandResult::success());
        }

        ui.show_header(&format!("Status of {}", project.display_name()));

        let mut pending = 0;
        for status in &statuses {
            match &status.probe.result {
                ProbeResult::Satisfied => {
                    ui.success(&format!("{}: satisfied ({})", status.name, status.probe.description));
                }
                ProbeResult::Unsatisfied => {
                    pending += 1;
                    ui.message(&format!(
                        "○ {}: would run ({})",
                        status.name, status.probe.description
                    ));
                }
                ProbeResult::Unknown(reason) => {
                    pending += 1;
                    ui.warning(&format!(
                        "{}: unknown, would run anyway ({})",
                        status.name, reason
                    ));
                }
            }
        }

        ui.message("");
        if pending == 0 {
            ui.success("Everything is provisioned");
        } else {
            ui.message(&format!("{} of {} step(s) would run", pending, statuses.len()));
        }

        Ok(CommandResult::success())
    }
}
