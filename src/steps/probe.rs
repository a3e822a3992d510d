//! Idempotency probes.
//!
//! A probe answers "does this step's effect already hold?" without changing
//! anything on the host. Probes run on every invocation; nothing is cached.
//!
//! The description on a [`ProbeOutcome`] is user-visible: it appears in skip
//! messages ("already satisfied (file exists: /etc/nginx/ide.conf)") and in
//! the status table.

use std::io::ErrorKind;

use serde::Serialize;

use crate::config::ProbeConfig;
use crate::runner::RunContext;
use crate::shell::{execute, find_executable_in};
use crate::steps::Step;

/// Exit code a shell reports when a command exists but cannot be executed.
const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Tri-state answer of a probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ProbeResult {
    /// The step's effect already holds.
    Satisfied,
    /// The step's effect does not hold.
    Unsatisfied,
    /// The state could not be determined.
    Unknown(String),
}

impl ProbeResult {
    /// Short label for tables.
    pub fn label(&self) -> &'static str {
        match self {
            ProbeResult::Satisfied => "satisfied",
            ProbeResult::Unsatisfied => "unsatisfied",
            ProbeResult::Unknown(_) => "unknown",
        }
    }
}

/// A probe result with a description of what was checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    /// The answer.
    pub result: ProbeResult,

    /// What was checked.
    pub description: String,
}

impl ProbeOutcome {
    /// Create a satisfied outcome.
    pub fn satisfied(description: impl Into<String>) -> Self {
        Self {
            result: ProbeResult::Satisfied,
            description: description.into(),
        }
    }

    /// Create an unsatisfied outcome.
    pub fn unsatisfied(description: impl Into<String>) -> Self {
        Self {
            result: ProbeResult::Unsatisfied,
            description: description.into(),
        }
    }

    /// Create an unknown outcome.
    pub fn unknown(description: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            result: ProbeResult::Unknown(reason.into()),
            description: description.into(),
        }
    }

    /// Whether the step can be skipped.
    pub fn is_satisfied(&self) -> bool {
        self.result == ProbeResult::Satisfied
    }
}

/// Determines whether a step's effect already holds.
pub trait Prober {
    /// Probe `step`. Must not mutate host state.
    fn probe(&self, step: &Step, ctx: &RunContext) -> ProbeOutcome;
}

/// Production prober: inspects the filesystem and runs probe commands
/// through the configured shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellProber;

impl Prober for ShellProber {
    fn probe(&self, step: &Step, ctx: &RunContext) -> ProbeOutcome {
        match &step.probe {
            Some(check) => run_probe(check, step, ctx),
            None => ProbeOutcome::unsatisfied("no check defined"),
        }
    }
}

/// Evaluate a probe definition.
pub fn run_probe(check: &ProbeConfig, step: &Step, ctx: &RunContext) -> ProbeOutcome {
    match check {
        ProbeConfig::FileExists { path } => probe_file_exists(path, ctx),
        ProbeConfig::FileContains { path, content } => probe_file_contains(path, content, ctx),
        ProbeConfig::CommandSucceeds { command } => probe_command_succeeds(command, step, ctx),
        ProbeConfig::CommandExists { name } => probe_command_exists(name, step, ctx),
        ProbeConfig::All { checks } => probe_all(checks, step, ctx),
        ProbeConfig::Any { checks } => probe_any(checks, step, ctx),
    }
}

fn probe_file_exists(path: &str, ctx: &RunContext) -> ProbeOutcome {
    let full = ctx.resolve_path(path);
    match full.symlink_metadata() {
        Ok(_) => ProbeOutcome::satisfied(format!("file exists: {}", path)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            ProbeOutcome::unsatisfied(format!("file missing: {}", path))
        }
        Err(e) => ProbeOutcome::unknown(format!("file exists: {}", path), e.to_string()),
    }
}

fn probe_file_contains(path: &str, content: &str, ctx: &RunContext) -> ProbeOutcome {
    let full = ctx.resolve_path(path);
    let description = format!("{} contains '{}'", path, truncate(content, 40));
    match std::fs::read(&full) {
        Ok(bytes) => {
            if String::from_utf8_lossy(&bytes).contains(content) {
                ProbeOutcome::satisfied(description)
            } else {
                ProbeOutcome::unsatisfied(description)
            }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => ProbeOutcome::unsatisfied(description),
        Err(e) => ProbeOutcome::unknown(description, e.to_string()),
    }
}

fn probe_command_succeeds(command: &str, step: &Step, ctx: &RunContext) -> ProbeOutcome {
    let description = format!("command: {}", truncate(command, 50));
    let options = ctx.command_options(&step.env, ctx.probe_timeout);

    let result = match execute(command, &options) {
        Ok(result) => result,
        Err(e) => return ProbeOutcome::unknown(description, e.to_string()),
    };

    if result.timed_out {
        return ProbeOutcome::unknown(
            description,
            format!("probe timed out after {:?}", options.timeout.unwrap_or_default()),
        );
    }

    match result.exit_code {
        Some(0) => ProbeOutcome::satisfied(description),
        Some(EXIT_NOT_EXECUTABLE) => {
            ProbeOutcome::unknown(description, "probe command is not executable (exit 126)")
        }
        Some(_) => ProbeOutcome::unsatisfied(description),
        None => ProbeOutcome::unknown(description, "probe command was killed by a signal"),
    }
}

fn probe_command_exists(name: &str, step: &Step, ctx: &RunContext) -> ProbeOutcome {
    let path_var = step
        .env
        .get("PATH")
        .or_else(|| ctx.env.get("PATH"))
        .map(std::ffi::OsString::from)
        .or_else(|| std::env::var_os("PATH"));

    match find_executable_in(name, path_var.as_deref()) {
        Some(found) => ProbeOutcome::satisfied(format!("{} found at {}", name, found.display())),
        None => ProbeOutcome::unsatisfied(format!("{} not on PATH", name)),
    }
}

/// Unsatisfied wins over Unknown; Unknown wins over Satisfied.
fn probe_all(checks: &[ProbeConfig], step: &Step, ctx: &RunContext) -> ProbeOutcome {
    let outcomes: Vec<_> = checks.iter().map(|c| run_probe(c, step, ctx)).collect();

    if let Some(failed) = outcomes
        .iter()
        .find(|o| o.result == ProbeResult::Unsatisfied)
    {
        return ProbeOutcome::unsatisfied(failed.description.clone());
    }
    if let Some(unknown) = outcomes.iter().find_map(|o| match &o.result {
        ProbeResult::Unknown(reason) => Some((o, reason)),
        _ => None,
    }) {
        return ProbeOutcome::unknown(unknown.0.description.clone(), unknown.1.clone());
    }
    ProbeOutcome::satisfied(format!("all {} checks passed", checks.len()))
}

/// Satisfied wins over Unknown; Unknown wins over Unsatisfied.
fn probe_any(checks: &[ProbeConfig], step: &Step, ctx: &RunContext) -> ProbeOutcome {
    let outcomes: Vec<_> = checks.iter().map(|c| run_probe(c, step, ctx)).collect();

    if let Some(passed) = outcomes.iter().find(|o| o.is_satisfied()) {
        return ProbeOutcome::satisfied(passed.description.clone());
    }
    if let Some(unknown) = outcomes.iter().find_map(|o| match &o.result {
        ProbeResult::Unknown(reason) => Some((o, reason)),
        _ => None,
    }) {
        return ProbeOutcome::unknown(unknown.0.description.clone(), unknown.1.clone());
    }
    ProbeOutcome::unsatisfied(format!("none of {} checks passed", checks.len()))
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Settings, StepConfig, Variables};
    use std::fs;
    use tempfile::TempDir;

    fn step_with(check: Option<ProbeConfig>) -> Step {
        let config = StepConfig {
            name: "s".to_string(),
            command: Some("true".to_string()),
            check,
            ..Default::default()
        };
        Step::resolve(&config, &Settings::default(), &Variables::new()).unwrap()
    }

    fn probe(check: ProbeConfig, dir: &TempDir) -> ProbeOutcome {
        ShellProber.probe(&step_with(Some(check)), &RunContext::new(dir.path()))
    }

    fn file_exists(path: &str) -> ProbeConfig {
        ProbeConfig::FileExists {
            path: path.to_string(),
        }
    }

    fn command(cmd: &str) -> ProbeConfig {
        ProbeConfig::CommandSucceeds {
            command: cmd.to_string(),
        }
    }

    #[test]
    fn no_check_is_unsatisfied() {
        let temp = TempDir::new().unwrap();
        let outcome = ShellProber.probe(&step_with(None), &RunContext::new(temp.path()));
        assert_eq!(outcome.result, ProbeResult::Unsatisfied);
    }

    #[test]
    fn file_exists_relative_to_working_dir() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("done"), "").unwrap();

        assert!(probe(file_exists("done"), &temp).is_satisfied());
        assert_eq!(probe(file_exists("missing"), &temp).result, ProbeResult::Unsatisfied);
    }

    #[test]
    fn file_exists_handles_absolute_paths() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("abs.txt");
        fs::write(&path, "x").unwrap();

        let other = TempDir::new().unwrap();
        assert!(probe(file_exists(&path.to_string_lossy()), &other).is_satisfied());
    }

    #[test]
    fn file_contains_checks_content() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("site.conf"), "server_name ide.example.com;\n").unwrap();

        let hit = ProbeConfig::FileContains {
            path: "site.conf".to_string(),
            content: "ide.example.com".to_string(),
        };
        let miss = ProbeConfig::FileContains {
            path: "site.conf".to_string(),
            content: "other.example.com".to_string(),
        };
        let absent = ProbeConfig::FileContains {
            path: "nope.conf".to_string(),
            content: "x".to_string(),
        };

        assert!(probe(hit, &temp).is_satisfied());
        assert_eq!(probe(miss, &temp).result, ProbeResult::Unsatisfied);
        let absent = probe(absent, &temp);
        assert_eq!(absent.result, ProbeResult::Unsatisfied);
        assert_eq!(absent.description, "nope.conf contains 'x'");
    }

    #[test]
    fn file_contains_on_directory_is_unknown() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("dir")).unwrap();

        let check = ProbeConfig::FileContains {
            path: "dir".to_string(),
            content: "x".to_string(),
        };
        let outcome = probe(check, &temp);
        assert!(matches!(outcome.result, ProbeResult::Unknown(_)));
        assert_eq!(outcome.description, "dir contains 'x'");
    }

    #[test]
    fn command_probe_exit_codes() {
        let temp = TempDir::new().unwrap();

        assert!(probe(command("exit 0"), &temp).is_satisfied());
        assert_eq!(probe(command("exit 1"), &temp).result, ProbeResult::Unsatisfied);
        assert!(matches!(
            probe(command("exit 126"), &temp).result,
            ProbeResult::Unknown(_)
        ));
    }

    #[test]
    #[cfg(unix)]
    fn command_probe_timeout_is_unknown() {
        let temp = TempDir::new().unwrap();
        let mut ctx = RunContext::new(temp.path());
        ctx.probe_timeout = Some(std::time::Duration::from_millis(100));
        ctx.cancel_grace = std::time::Duration::from_millis(100);

        let outcome = ShellProber.probe(&step_with(Some(command("sleep 30"))), &ctx);
        assert!(matches!(outcome.result, ProbeResult::Unknown(_)));
    }

    #[test]
    #[cfg(unix)]
    fn command_probe_without_timeout_is_answered() {
        let temp = TempDir::new().unwrap();
        let mut ctx = RunContext::new(temp.path());
        ctx.probe_timeout = None;

        let outcome = ShellProber.probe(&step_with(Some(command("true"))), &ctx);
        assert!(outcome.is_satisfied());
    }

    #[test]
    fn command_probe_spawn_failure_is_unknown() {
        let temp = TempDir::new().unwrap();
        let mut ctx = RunContext::new(temp.path());
        ctx.shell = Some("/nonexistent/shell".to_string());

        let outcome = ShellProber.probe(&step_with(Some(command("true"))), &ctx);
        assert!(matches!(outcome.result, ProbeResult::Unknown(_)));
    }

    #[test]
    #[cfg(unix)]
    fn command_exists_uses_path() {
        let temp = TempDir::new().unwrap();
        let found = ProbeConfig::CommandExists {
            name: "sh".to_string(),
        };
        let missing = ProbeConfig::CommandExists {
            name: "definitely-not-a-real-tool-xyz".to_string(),
        };

        assert!(probe(found, &temp).is_satisfied());
        assert_eq!(probe(missing, &temp).result, ProbeResult::Unsatisfied);
    }

    #[test]
    fn all_combinator() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a"), "").unwrap();

        let pass = ProbeConfig::All {
            checks: vec![file_exists("a"), command("exit 0")],
        };
        let fail = ProbeConfig::All {
            checks: vec![file_exists("a"), file_exists("b")],
        };
        let unknown = ProbeConfig::All {
            checks: vec![file_exists("a"), command("exit 126")],
        };
        let unsatisfied_beats_unknown = ProbeConfig::All {
            checks: vec![command("exit 126"), file_exists("b")],
        };

        assert!(probe(pass, &temp).is_satisfied());
        assert_eq!(probe(fail, &temp).result, ProbeResult::Unsatisfied);
        assert!(matches!(probe(unknown, &temp).result, ProbeResult::Unknown(_)));
        assert_eq!(
            probe(unsatisfied_beats_unknown, &temp).result,
            ProbeResult::Unsatisfied
        );
    }

    #[test]
    fn any_combinator() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a"), "").unwrap();

        let pass = ProbeConfig::Any {
            checks: vec![file_exists("b"), file_exists("a")],
        };
        let fail = ProbeConfig::Any {
            checks: vec![file_exists("b"), command("exit 1")],
        };
        let unknown = ProbeConfig::Any {
            checks: vec![file_exists("b"), command("exit 126")],
        };

        assert!(probe(pass, &temp).is_satisfied());
        assert_eq!(probe(fail, &temp).result, ProbeResult::Unsatisfied);
        assert!(matches!(probe(unknown, &temp).result, ProbeResult::Unknown(_)));
    }

    #[test]
    fn probe_does_not_create_files() {
        let temp = TempDir::new().unwrap();
        probe(file_exists("ghost"), &temp);
        assert!(!temp.path().join("ghost").exists());
    }

    #[test]
    fn truncate_long_text() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
    }
}
