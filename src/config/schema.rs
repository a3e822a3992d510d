//! Manifest schema definitions.
//!
//! This module contains all the struct definitions that map to the YAML
//! manifest format. Steps are a list so that declaration order survives
//! deserialization; it is the tie-break for dependency ordering.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root structure of a provisioning manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct Manifest {
    /// Display name for the environment being provisioned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Global settings
    pub settings: Settings,

    /// Run-context variables available as `${name}`
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub vars: HashMap<String, String>,

    /// Ordered step definitions
    pub steps: Vec<StepConfig>,
}

/// Settings that apply to every step.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Shell used to run actions and command probes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,

    /// Per-attempt action timeout in seconds (0 disables the timeout)
    pub default_timeout_secs: u64,

    /// Timeout for command probes in seconds
    pub probe_timeout_secs: u64,

    /// Seconds between a cooperative cancel and a forced kill
    pub cancel_grace_secs: u64,

    /// Environment variables for every action and probe
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Working directory for actions and relative probe paths
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Default retry policy for steps that do not declare one
    pub retry: RetryConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            shell: None,
            default_timeout_secs: default_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            cancel_grace_secs: default_cancel_grace_secs(),
            env: HashMap::new(),
            working_dir: None,
            retry: RetryConfig::default(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_probe_timeout_secs() -> u64 {
    30
}

fn default_cancel_grace_secs() -> u64 {
    5
}

/// Whether a step's failure stops the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    /// Failure aborts the run.
    #[default]
    Required,
    /// Failure is recorded and the run continues.
    BestEffort,
}

impl std::fmt::Display for Criticality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Criticality::Required => write!(f, "required"),
            Criticality::BestEffort => write!(f, "best effort"),
        }
    }
}

/// Bounded retry policy for transient failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Base delay before the first retry, in milliseconds
    pub backoff_ms: u64,

    /// Upper bound for the exponential delay, in milliseconds
    pub max_backoff_ms: u64,

    /// Exit codes that indicate a transient failure
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transient_exit_codes: Vec<i32>,

    /// Regexes matched against output that indicate a transient failure
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transient_patterns: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            transient_exit_codes: Vec::new(),
            transient_patterns: Vec::new(),
        }
    }
}

/// One provisioning step.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct StepConfig {
    /// Unique step name
    pub name: String,

    /// Step title (for display)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Step description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Steps that must succeed (or already be satisfied) first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Whether failure aborts the run
    pub criticality: Criticality,

    /// Read-only check for whether the step's effect already holds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<ProbeConfig>,

    /// Shell command to execute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Ordered sub-actions (alternative to `command`)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,

    /// Per-attempt timeout in seconds, overriding the default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Retry policy, overriding the default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    /// Step-specific environment variables
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

impl StepConfig {
    /// The step's sub-actions in order, whichever form was used.
    pub fn actions(&self) -> Vec<String> {
        match &self.command {
            Some(command) => vec![command.clone()],
            None => self.commands.clone(),
        }
    }
}

/// Idempotency probe definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeConfig {
    /// A file or directory exists
    FileExists {
        /// Path to check (relative to the working directory)
        path: String,
    },

    /// A file exists and contains the given text
    FileContains {
        /// Path to read
        path: String,
        /// Text that must appear in the file
        content: String,
    },

    /// A command exits with status 0
    CommandSucceeds {
        /// Command to run
        command: String,
    },

    /// An executable is available on `PATH`
    CommandExists {
        /// Executable name
        name: String,
    },

    /// All checks must pass
    All {
        /// Checks that must all pass
        checks: Vec<ProbeConfig>,
    },

    /// Any check passing is sufficient
    Any {
        /// Checks where at least one must pass
        checks: Vec<ProbeConfig>,
    },
}

impl std::fmt::Display for ProbeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let join = |checks: &[ProbeConfig], sep: &str| {
            checks
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(sep)
        };
        match self {
            ProbeConfig::FileExists { path } => write!(f, "file exists: {}", path),
            ProbeConfig::FileContains { path, content } => {
                write!(f, "{} contains '{}'", path, content)
            }
            ProbeConfig::CommandSucceeds { command } => write!(f, "command: {}", command),
            ProbeConfig::CommandExists { name } => write!(f, "{} on PATH", name),
            ProbeConfig::All { checks } => write!(f, "({})", join(checks, " and ")),
            ProbeConfig::Any { checks } => write!(f, "({})", join(checks, " or ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_manifest() {
        let yaml = r#"
steps:
  - name: hello
    command: echo hello
"#;
        let manifest: Manifest = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(manifest.steps.len(), 1);
        assert_eq!(manifest.steps[0].name, "hello");
        assert_eq!(manifest.steps[0].criticality, Criticality::Required);
        assert_eq!(manifest.settings.default_timeout_secs, 600);
    }

    #[test]
    fn parses_full_step() {
        let yaml = r#"
name: ide
settings:
  shell: /bin/bash
  retry:
    max_retries: 1
vars:
  domain: example.com
steps:
  - name: base
    command: apt-get install -y nginx
  - name: cert
    depends_on: [base]
    criticality: best_effort
    check:
      type: file_contains
      path: /etc/nginx/conf.d/ide.conf
      content: ${domain}
    commands:
      - certbot certonly -d ${domain}
      - systemctl reload nginx
    timeout_secs: 120
    retry:
      max_retries: 2
      backoff_ms: 10
      transient_exit_codes: [6, 7]
"#;
        let manifest: Manifest = serde_yaml::from_str(yaml).unwrap();
        let cert = &manifest.steps[1];
        assert_eq!(cert.criticality, Criticality::BestEffort);
        assert_eq!(cert.depends_on, vec!["base"]);
        assert_eq!(cert.actions().len(), 2);
        assert_eq!(cert.retry.as_ref().unwrap().transient_exit_codes, vec![6, 7]);
        assert!(matches!(cert.check, Some(ProbeConfig::FileContains { .. })));
        assert_eq!(manifest.settings.retry.max_retries, 1);
    }

    #[test]
    fn parses_nested_probes() {
        let yaml = r#"
type: all
checks:
  - type: command_exists
    name: code-server
  - type: any
    checks:
      - type: file_exists
        path: /etc/a
      - type: command_succeeds
        command: systemctl is-enabled code-server
"#;
        let probe: ProbeConfig = serde_yaml::from_str(yaml).unwrap();
        match probe {
            ProbeConfig::All { checks } => assert_eq!(checks.len(), 2),
            other => panic!("unexpected probe: {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_step_fields() {
        let yaml = r#"
steps:
  - name: a
    command: "true"
    retries: 3
"#;
        assert!(serde_yaml::from_str::<Manifest>(yaml).is_err());
    }

    #[test]
    fn single_command_takes_precedence_in_actions() {
        let step = StepConfig {
            command: Some("echo one".to_string()),
            ..Default::default()
        };
        assert_eq!(step.actions(), vec!["echo one"]);
    }

    #[test]
    fn probe_display_nests() {
        let probe = ProbeConfig::Any {
            checks: vec![
                ProbeConfig::CommandExists {
                    name: "nginx".to_string(),
                },
                ProbeConfig::FileExists {
                    path: "/usr/sbin/nginx".to_string(),
                },
            ],
        };
        assert_eq!(probe.to_string(), "(nginx on PATH or file exists: /usr/sbin/nginx)");
    }

    #[test]
    fn criticality_display() {
        assert_eq!(Criticality::Required.to_string(), "required");
        assert_eq!(Criticality::BestEffort.to_string(), "best effort");
    }
}
