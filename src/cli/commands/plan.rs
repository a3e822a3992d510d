//! Plan command implementation.
//!
//! The `provisor plan` command shows the execution order without probing
//! or running anything.

use serde::Serialize;

use crate::cli::args::PlanArgs;
use crate::config::{Criticality, ProbeConfig};
use crate::error::Result;
use crate::runner::RunOptions;
use crate::steps::Step;
use crate::ui::{format_duration, UserInterface};

use super::dispatcher::{Command, CommandResult};
use super::project::ProjectLocation;

/// One step in the plan.
#[derive(Debug, Serialize)]
struct PlanEntry<'a> {
    position: usize,
    name: &'a str,
    title: &'a str,
    depends_on: &'a [String],
    criticality: Criticality,
    #[serde(skip_serializing_if = "Option::is_none")]
    check: Option<&'a ProbeConfig>,
    actions: &'a [String],
    max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_secs: Option<u64>,
}

impl<'a> PlanEntry<'a> {
    fn new(position: usize, step: &'a Step) -> Self {
        Self {
            position,
            name: &step.name,
            title: &step.title,
            depends_on: &step.depends_on,
            criticality: step.criticality,
            check: step.probe.as_ref(),
            actions: &step.actions,
            max_retries: step.retry.max_retries,
            timeout_secs: step.timeout.map(|t| t.as_secs()),
        }
    }
}

/// The plan command implementation.
pub struct PlanCommand {
    location: ProjectLocation,
    args: PlanArgs,
}

impl PlanCommand {
    /// Create a new plan command.
    pub fn new(location: ProjectLocation, args: PlanArgs) -> Self {
        Self { location, args }
    }
}

impl Command for PlanCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let project = self.location.load(&self.args.vars, RunOptions::default())?;
        let order = project.registry.topological_order();

        let entries: Vec<PlanEntry<'_>> = order
            .iter()
            .enumerate()
            .map(|(i, step)| PlanEntry::new(i + 1, step))
            .collect();

        if self.args.json {
            let json = serde_json::to_string_pretty(&entries).map_err(anyhow::Error::from)?;
            println!("{}", json);
            return Ok(CommandResult::success());
        }

        ui.show_header(&format!("Plan for {}", project.display_name()));

        for (entry, step) in entries.iter().zip(&order) {
            ui.message(&format!("{}. {} ({})", entry.position, entry.name, entry.criticality));

            if step.title != step.name {
                ui.message(&format!("     title:      {}", step.title));
            }
            if !step.depends_on.is_empty() {
                ui.message(&format!("     after:      {}", step.depends_on.join(", ")));
            }
            match &step.probe {
                Some(probe) => ui.message(&format!("     check:      {}", probe)),
                None => ui.message("     check:      none (always runs)"),
            }
            for action in &step.actions {
                ui.message(&format!("     run:        {}", action));
            }
            if step.retry.max_retries > 0 {
                ui.message(&format!(
                    "     retries:    {} (backoff {}, max {})",
                    step.retry.max_retries,
                    format_duration(step.retry.backoff),
                    format_duration(step.retry.max_backoff)
                ));
            }
            if let Some(timeout) = step.timeout {
                ui.message(&format!("     timeout:    {}", format_duration(timeout)));
            }
        }

        Ok(CommandResult::success())
    }
}
