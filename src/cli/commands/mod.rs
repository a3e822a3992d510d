//! CLI command implementations.
//!
//! Each command implements the [`Command`] trait, which provides a uniform
//! interface for executing commands and reporting results.
//!
//! # Architecture
//!
//! Commands are dispatched via [`CommandDispatcher`], which routes CLI
//! subcommands to their implementations. Manifest loading shared by
//! `run`, `plan` and `status` lives in [`project`].

pub mod completions;
pub mod dispatcher;
pub mod plan;
pub mod project;
pub mod run;
pub mod schema;
pub mod status;
pub mod validate;

pub use dispatcher::{Command, CommandDispatcher, CommandResult};
pub use project::{LoadedProject, ProjectLocation};
