//! Schema command implementation.
//!
//! The `provisor schema` command prints the manifest JSON Schema, for
//! editor integration and CI validation.

use crate::config::Manifest;
use crate::error::Result;
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandResult};

/// The schema command implementation.
pub struct SchemaCommand;

impl SchemaCommand {
    /// Render the manifest JSON Schema.
    pub fn render() -> Result<String> {
        let schema = schemars::schema_for!(Manifest);
        Ok(serde_json::to_string_pretty(&schema).map_err(anyhow::Error::from)?)
    }
}

impl Command for SchemaCommand {
    fn execute(&self, _ui: &mut dyn UserInterface) -> Result<CommandResult> {
        println!("{}", Self::render()?);
        Ok(CommandResult::success())
    }
}
