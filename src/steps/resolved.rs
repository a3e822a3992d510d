//! Resolved step ready for execution.
//!
//! A [`Step`] is a [`StepConfig`] with defaults applied and every `${var}`
//! interpolated. Steps are built once per run and never change afterwards.

use std::collections::HashMap;
use std::time::Duration;

use regex::Regex;

use crate::config::{Criticality, ProbeConfig, RetryConfig, Settings, StepConfig, Variables};
use crate::error::{ProvisorError, Result};

/// A fully resolved, read-only provisioning step.
#[derive(Debug, Clone)]
pub struct Step {
    /// Unique step name.
    pub name: String,

    /// Display title (defaults to the name).
    pub title: String,

    /// Description.
    pub description: Option<String>,

    /// Names of steps that must finish successfully first, without duplicates.
    pub depends_on: Vec<String>,

    /// Whether failure aborts the run.
    pub criticality: Criticality,

    /// Idempotency probe, interpolated.
    pub probe: Option<ProbeConfig>,

    /// Ordered sub-actions, interpolated.
    pub actions: Vec<String>,

    /// Wall-clock budget for one attempt (None = unbounded).
    pub timeout: Option<Duration>,

    /// Retry policy for transient failures.
    pub retry: RetryPolicy,

    /// Step-specific environment variables, interpolated.
    pub env: HashMap<String, String>,
}

impl Step {
    /// Resolve a step definition against the manifest settings and the run's
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns `UndefinedVariable` if any interpolated field references an
    /// unknown variable, or `ManifestValidationError` for a bad retry regex.
    pub fn resolve(config: &StepConfig, settings: &Settings, vars: &Variables) -> Result<Self> {
        let name = config.name.clone();
        let at = |what: &str| format!("step '{}' {}", name, what);

        let actions = config
            .actions()
            .iter()
            .map(|action| vars.interpolate(action, &at("command")))
            .collect::<Result<Vec<_>>>()?;

        let probe = config
            .check
            .as_ref()
            .map(|probe| interpolate_probe(probe, vars, &at("check")))
            .transpose()?;

        let env = config
            .env
            .iter()
            .map(|(key, value)| Ok((key.clone(), vars.interpolate(value, &at("env"))?)))
            .collect::<Result<HashMap<_, _>>>()?;

        let mut depends_on: Vec<String> = Vec::with_capacity(config.depends_on.len());
        for dep in &config.depends_on {
            if !depends_on.contains(dep) {
                depends_on.push(dep.clone());
            }
        }

        let timeout_secs = config.timeout_secs.unwrap_or(settings.default_timeout_secs);
        let retry = RetryPolicy::from_config(config.retry.as_ref().unwrap_or(&settings.retry))?;

        Ok(Self {
            title: config.title.clone().unwrap_or_else(|| name.clone()),
            description: config.description.clone(),
            depends_on,
            criticality: config.criticality,
            probe,
            actions,
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            retry,
            env,
            name,
        })
    }

    /// Whether a failure of this step aborts the run.
    pub fn is_required(&self) -> bool {
        self.criticality == Criticality::Required
    }
}

fn interpolate_probe(probe: &ProbeConfig, vars: &Variables, at: &str) -> Result<ProbeConfig> {
    Ok(match probe {
        ProbeConfig::FileExists { path } => ProbeConfig::FileExists {
            path: vars.interpolate(path, at)?,
        },
        ProbeConfig::FileContains { path, content } => ProbeConfig::FileContains {
            path: vars.interpolate(path, at)?,
            content: vars.interpolate(content, at)?,
        },
        ProbeConfig::CommandSucceeds { command } => ProbeConfig::CommandSucceeds {
            command: vars.interpolate(command, at)?,
        },
        ProbeConfig::CommandExists { name } => ProbeConfig::CommandExists {
            name: vars.interpolate(name, at)?,
        },
        ProbeConfig::All { checks } => ProbeConfig::All {
            checks: checks
                .iter()
                .map(|c| interpolate_probe(c, vars, at))
                .collect::<Result<_>>()?,
        },
        ProbeConfig::Any { checks } => ProbeConfig::Any {
            checks: checks
                .iter()
                .map(|c| interpolate_probe(c, vars, at))
                .collect::<Result<_>>()?,
        },
    })
}

/// Bounded exponential-backoff retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub backoff: Duration,

    /// Upper bound for any single delay.
    pub max_backoff: Duration,

    /// Exit codes treated as transient.
    pub transient_exit_codes: Vec<i32>,

    /// Output patterns treated as transient, in addition to the built-ins.
    pub transient_patterns: Vec<Regex>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            transient_exit_codes: Vec::new(),
            transient_patterns: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Build a policy from its manifest form.
    pub fn from_config(config: &RetryConfig) -> Result<Self> {
        let transient_patterns = config
            .transient_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ProvisorError::ManifestValidationError {
                    message: format!("bad transient pattern '{}': {}", p, e),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            transient_exit_codes: config.transient_exit_codes.clone(),
            transient_patterns,
        })
    }

    /// Policy with `max_retries` retries and no delay between them.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (0-based): `backoff * 2^retry`,
    /// capped at `max_backoff`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.backoff
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_backoff)
    }
}
