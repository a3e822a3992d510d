//! Manifest validation rules.
//!
//! Structural checks that do not need the dependency graph:
//! - Step names are present, well-formed and unique
//! - Each step has exactly one of `command` / `commands`, none empty
//! - A step does not list itself in `depends_on`
//! - Retry backoff bounds are consistent
//!
//! Unknown dependencies and cycles are detected when the step registry is
//! built, where they surface as their own error kinds.

use std::collections::HashSet;

use crate::config::schema::{Manifest, ProbeConfig, RetryConfig, StepConfig};
use crate::error::{ProvisorError, Result};

/// A single validation problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Rule identifier
    pub rule: &'static str,
    /// Human-readable message
    pub message: String,
    /// Step the problem belongs to, if any
    pub step: Option<String>,
}

impl ValidationError {
    fn step(rule: &'static str, step: &str, message: String) -> Self {
        Self {
            rule,
            message,
            step: Some(step.to_string()),
        }
    }
}

/// Validate a manifest and return every problem found.
pub fn validate_manifest(manifest: &Manifest) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    errors.extend(validate_retry("settings", &manifest.settings.retry));

    for (index, step) in manifest.steps.iter().enumerate() {
        if step.name.trim().is_empty() {
            errors.push(ValidationError {
                rule: "missing-name",
                message: format!("Step #{} has no name", index + 1),
                step: None,
            });
            continue;
        }

        if !is_valid_name(&step.name) {
            errors.push(ValidationError::step(
                "invalid-name",
                &step.name,
                format!(
                    "Step name '{}' may only contain letters, digits, '-', '_' and '.'",
                    step.name
                ),
            ));
        }

        if !seen.insert(step.name.as_str()) {
            errors.push(ValidationError::step(
                "duplicate-step",
                &step.name,
                format!("Step '{}' is declared more than once", step.name),
            ));
        }

        errors.extend(validate_action(step));

        if step.depends_on.iter().any(|dep| dep == &step.name) {
            errors.push(ValidationError::step(
                "self-dependency",
                &step.name,
                format!("Step '{}' depends on itself", step.name),
            ));
        }

        if let Some(retry) = &step.retry {
            errors.extend(validate_retry(&format!("step '{}'", step.name), retry));
        }

        if let Some(check) = &step.check {
            if let Some(message) = validate_probe(check) {
                errors.push(ValidationError::step(
                    "invalid-check",
                    &step.name,
                    format!("Step '{}' check: {}", step.name, message),
                ));
            }
        }
    }

    errors
}

/// Validate a manifest, folding all problems into one error.
pub fn validate(manifest: &Manifest) -> Result<()> {
    let errors = validate_manifest(manifest);
    if errors.is_empty() {
        return Ok(());
    }

    let message = errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    Err(ProvisorError::ManifestValidationError { message })
}

fn is_valid_name(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn validate_action(step: &StepConfig) -> Option<ValidationError> {
    let message = match (&step.command, step.commands.is_empty()) {
        (Some(_), false) => "has both 'command' and 'commands'",
        (None, true) => "has no 'command' or 'commands'",
        (Some(command), true) if command.trim().is_empty() => "has an empty command",
        (None, false) if step.commands.iter().any(|c| c.trim().is_empty()) => {
            "has an empty entry in 'commands'"
        }
        _ => return None,
    };
    Some(ValidationError::step(
        "invalid-action",
        &step.name,
        format!("Step '{}' {}", step.name, message),
    ))
}

fn validate_retry(owner: &str, retry: &RetryConfig) -> Option<ValidationError> {
    if retry.backoff_ms > retry.max_backoff_ms {
        return Some(ValidationError {
            rule: "invalid-retry",
            message: format!(
                "Retry policy for {}: backoff_ms ({}) exceeds max_backoff_ms ({})",
                owner, retry.backoff_ms, retry.max_backoff_ms
            ),
            step: None,
        });
    }
    retry.transient_patterns.iter().find_map(|pattern| {
        regex::Regex::new(pattern).err().map(|e| ValidationError {
            rule: "invalid-retry",
            message: format!("Retry policy for {}: bad pattern '{}': {}", owner, pattern, e),
            step: None,
        })
    })
}

fn validate_probe(probe: &ProbeConfig) -> Option<String> {
    match probe {
        ProbeConfig::FileExists { path } | ProbeConfig::FileContains { path, .. }
            if path.trim().is_empty() =>
        {
            Some("empty path".to_string())
        }
        ProbeConfig::CommandSucceeds { command } if command.trim().is_empty() => {
            Some("empty command".to_string())
        }
        ProbeConfig::CommandExists { name } if name.trim().is_empty() => {
            Some("empty executable name".to_string())
        }
        ProbeConfig::All { checks } | ProbeConfig::Any { checks } => {
            if checks.is_empty() {
                Some("'all'/'any' needs at least one check".to_string())
            } else {
                checks.iter().find_map(validate_probe)
            }
        }
        _ => None,
    }
}
