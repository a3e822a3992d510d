//! Shell command execution and platform helpers.

pub mod command;
pub mod platform;

pub use command::{execute, CommandOptions, CommandResult};
pub use platform::{find_executable_in, is_ci};
