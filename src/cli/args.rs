//! CLI argument definitions.
//!
//! This module defines all CLI arguments using clap's derive macros.
//! The main entry point is the [`Cli`] struct.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Provisor - idempotent provisioning sequencer.
#[derive(Debug, Parser)]
#[command(name = "provisor")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the manifest (overrides provision.yml discovery)
    #[arg(short, long, global = true, env = "PROVISOR_MANIFEST")]
    pub manifest: Option<PathBuf>,

    /// Path to project root (overrides current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Provision the project (default if no command specified)
    Run(RunArgs),

    /// Show the execution order without probing or running anything
    Plan(PlanArgs),

    /// Probe every step and show which ones would run
    Status(StatusArgs),

    /// Validate the manifest
    Validate(ValidateArgs),

    /// Print the manifest JSON Schema
    Schema,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the `run` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RunArgs {
    /// Probe every step but execute nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Run these steps even if their probe is satisfied (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub force: Vec<String>,

    /// Set a variable for interpolation (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// Apply changes without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Never prompt; use defaults
    #[arg(long)]
    pub non_interactive: bool,

    /// CI mode (implies --non-interactive and --yes)
    #[arg(long)]
    pub ci: bool,

    /// Write the run report as JSON to this path
    #[arg(long, value_name = "PATH")]
    pub report_json: Option<PathBuf>,
}

/// Arguments for the `plan` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct PlanArgs {
    /// Set a variable for interpolation (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `status` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct StatusArgs {
    /// Set a variable for interpolation (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// Show status for a single step
    #[arg(long)]
    pub step: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `validate` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ValidateArgs {
    /// Set a variable for interpolation (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,
}

/// Arguments for the `completions` command.
#[derive(Debug, Clone, clap::Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
