//! Error types for provisor operations.
//!
//! This module defines [`ProvisorError`], the primary error type used
//! throughout the crate, and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Manifest problems (missing file, bad YAML, unknown dependency, cycle)
//!   are errors: they are fatal and the run never starts
//! - Step action failures are *not* errors; they are recorded as data in the
//!   run report (see [`crate::runner::report`])
//! - Use `anyhow::Error` (via `ProvisorError::Other`) for unexpected errors

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for provisor operations.
#[derive(Debug, Error)]
pub enum ProvisorError {
    /// No manifest file at any of the expected locations.
    #[error("Manifest not found: {path}")]
    ManifestNotFound { path: PathBuf },

    /// Failed to parse the manifest file.
    #[error("Failed to parse manifest at {path}: {message}")]
    ManifestParseError { path: PathBuf, message: String },

    /// Invalid manifest structure or values.
    #[error("Invalid manifest: {message}")]
    ManifestValidationError { message: String },

    /// A step lists a dependency that is not declared in the manifest.
    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    /// Step dependency cycle detected.
    #[error("Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    /// A `${variable}` reference could not be resolved from the run context.
    #[error("Undefined variable '{name}' in {location}")]
    UndefinedVariable { name: String, location: String },

    /// A command could not be started at all.
    #[error("Failed to start command '{command}': {message}")]
    CommandSpawn { command: String, message: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for provisor operations.
pub type Result<T> = std::result::Result<T, ProvisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_not_found_displays_path() {
        let err = ProvisorError::ManifestNotFound {
            path: PathBuf::from("/srv/provision.yml"),
        };
        assert!(err.to_string().contains("/srv/provision.yml"));
    }

    #[test]
    fn manifest_parse_error_displays_path_and_message() {
        let err = ProvisorError::ManifestParseError {
            path: PathBuf::from("/provision.yml"),
            message: "invalid syntax".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/provision.yml"));
        assert!(msg.contains("invalid syntax"));
    }

    #[test]
    fn unknown_dependency_names_both_steps() {
        let err = ProvisorError::UnknownDependency {
            step: "issue-cert".into(),
            dependency: "nginx".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("issue-cert"));
        assert!(msg.contains("nginx"));
    }

    #[test]
    fn circular_dependency_displays_cycle() {
        let err = ProvisorError::CircularDependency {
            cycle: "a -> b -> a".into(),
        };
        assert!(err.to_string().contains("a -> b -> a"));
    }

    #[test]
    fn undefined_variable_displays_name_and_location() {
        let err = ProvisorError::UndefinedVariable {
            name: "domain".into(),
            location: "step 'nginx' command".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("domain"));
        assert!(msg.contains("step 'nginx' command"));
    }

    #[test]
    fn io_error_converts_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: ProvisorError = io_err.into();
        assert!(matches!(err, ProvisorError::Io(_)));
    }
}
