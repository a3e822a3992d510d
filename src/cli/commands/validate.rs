//! Validate command implementation.
//!
//! The `provisor validate` command checks the manifest without probing or
//! running anything: structure, variables, dependencies and cycles.

use crate::cli::args::ValidateArgs;
use crate::config::{load_project_manifest, parse_var_overrides, validate_manifest};
use crate::error::Result;
use crate::runner::{RunContext, RunOptions, StepRegistry};
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandResult};
use super::project::ProjectLocation;

/// The validate command implementation.
pub struct ValidateCommand {
    location: ProjectLocation,
    args: ValidateArgs,
}

impl ValidateCommand {
    /// Create a new validate command.
    pub fn new(location: ProjectLocation, args: ValidateArgs) -> Self {
        Self { location, args }
    }
}

impl Command for ValidateCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let loaded =
            load_project_manifest(&self.location.root, self.location.manifest.as_deref())?;
        ui.message(&format!("Validating {}", loaded.path.display()));

        let problems = validate_manifest(&loaded.manifest);
        if !problems.is_empty() {
            for problem in &problems {
                match &problem.step {
                    Some(step) => ui.error(&format!("[{}] {}: {}", problem.rule, step, problem.message)),
                    None => ui.error(&format!("[{}] {}", problem.rule, problem.message)),
                }
            }
            ui.error(&format!("{} problem(s) found", problems.len()));
            return Ok(CommandResult::failure(1));
        }

        let overrides = parse_var_overrides(&self.args.vars)?;
        let resolved = RunContext::for_manifest(&loaded, overrides, RunOptions::default())
            .and_then(|ctx| StepRegistry::load(&loaded.manifest, &ctx));

        match resolved {
            Ok(registry) => {
                ui.success(&format!("Manifest is valid ({} steps)", registry.len()));
                Ok(CommandResult::success())
            }
            Err(e) => {
                ui.error(&e.to_string());
                Ok(CommandResult::failure(1))
            }
        }
    }
}
