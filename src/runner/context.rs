//! Per-run context shared by every probe and action.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{LoadedManifest, Variables};
use crate::error::Result;
use crate::shell::CommandOptions;

/// Operator choices for a single run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Probe every step but execute nothing.
    pub dry_run: bool,

    /// Steps whose probe is bypassed so they always execute.
    pub force: HashSet<String>,
}

/// Immutable context created once per run.
///
/// Holds everything a probe or action needs from outside its own step:
/// variables, the shared environment, the working directory and the shell.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Variables available for interpolation.
    pub vars: Variables,

    /// Environment applied to every action and probe command.
    pub env: HashMap<String, String>,

    /// Directory actions run in; relative probe paths resolve against it.
    pub working_dir: PathBuf,

    /// Shell override (defaults to `/bin/sh`).
    pub shell: Option<String>,

    /// Timeout for command probes (None = wait indefinitely).
    pub probe_timeout: Option<Duration>,

    /// Time between cooperative cancel and forced kill.
    pub cancel_grace: Duration,

    /// Operator options.
    pub options: RunOptions,
}

impl RunContext {
    /// A context rooted at `working_dir` with default settings and only the
    /// built-in variables.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        Self {
            vars: Variables::new().with_manifest_dir(&working_dir),
            env: HashMap::new(),
            working_dir,
            shell: None,
            probe_timeout: Some(Duration::from_secs(30)),
            cancel_grace: Duration::from_secs(5),
            options: RunOptions::default(),
        }
    }

    /// Build the context for a loaded manifest.
    ///
    /// Variables resolve from `overrides`, then the manifest's `vars`, then
    /// the process environment. Settings `env` values are interpolated here.
    pub fn for_manifest(
        loaded: &LoadedManifest,
        overrides: HashMap<String, String>,
        options: RunOptions,
    ) -> Result<Self> {
        let settings = &loaded.manifest.settings;
        let manifest_dir = loaded.dir();

        let vars = Variables::new()
            .with_manifest_dir(manifest_dir)
            .with_manifest_vars(loaded.manifest.vars.clone())
            .with_env(std::env::vars().collect())
            .with_overrides(overrides);

        let env = settings
            .env
            .iter()
            .map(|(key, value)| Ok((key.clone(), vars.interpolate(value, "settings env")?)))
            .collect::<Result<HashMap<_, _>>>()?;

        let working_dir = match &settings.working_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => manifest_dir.join(dir),
            None => manifest_dir.to_path_buf(),
        };

        Ok(Self {
            vars,
            env,
            working_dir,
            shell: settings.shell.clone(),
            probe_timeout: match settings.probe_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            cancel_grace: Duration::from_secs(settings.cancel_grace_secs),
            options,
        })
    }

    /// Resolve a probe path against the working directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    /// Command options for a step: shared env overlaid with `step_env`.
    pub fn command_options(
        &self,
        step_env: &HashMap<String, String>,
        timeout: Option<Duration>,
    ) -> CommandOptions {
        let mut env = self.env.clone();
        env.extend(step_env.iter().map(|(k, v)| (k.clone(), v.clone())));
        CommandOptions {
            cwd: Some(self.working_dir.clone()),
            env,
            shell: self.shell.clone(),
            timeout,
            grace: self.cancel_grace,
        }
    }

    /// Whether the operator forced `step` to run.
    pub fn is_forced(&self, step: &str) -> bool {
        self.options.force.contains(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Manifest;

    fn loaded(dir: &Path, manifest: Manifest) -> LoadedManifest {
        LoadedManifest {
            manifest,
            path: dir.join("provision.yml"),
            overlay: None,
        }
    }

    #[test]
    fn for_manifest_defaults_working_dir_to_manifest_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let ctx = RunContext::for_manifest(
            &loaded(temp.path(), Manifest::default()),
            HashMap::new(),
            RunOptions::default(),
        )
        .unwrap();

        assert_eq!(ctx.working_dir, temp.path());
        assert_eq!(ctx.probe_timeout, Some(Duration::from_secs(30)));
        assert_eq!(ctx.cancel_grace, Duration::from_secs(5));
    }

    #[test]
    fn zero_probe_timeout_means_no_limit() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut manifest = Manifest::default();
        manifest.settings.probe_timeout_secs = 0;

        let ctx = RunContext::for_manifest(
            &loaded(temp.path(), manifest),
            HashMap::new(),
            RunOptions::default(),
        )
        .unwrap();

        assert_eq!(ctx.probe_timeout, None);
    }

    #[test]
    fn relative_working_dir_is_joined_to_manifest_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut manifest = Manifest::default();
        manifest.settings.working_dir = Some(PathBuf::from("work"));

        let ctx =
            RunContext::for_manifest(&loaded(temp.path(), manifest), HashMap::new(), RunOptions::default())
                .unwrap();
        assert_eq!(ctx.working_dir, temp.path().join("work"));
    }

    #[test]
    fn settings_env_is_interpolated() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut manifest = Manifest::default();
        manifest.vars.insert("domain".into(), "a.example".into());
        manifest
            .settings
            .env
            .insert("DOMAIN".into(), "${domain}".into());

        let overrides = HashMap::from([("domain".to_string(), "b.example".to_string())]);
        let ctx =
            RunContext::for_manifest(&loaded(temp.path(), manifest), overrides, RunOptions::default())
                .unwrap();
        assert_eq!(ctx.env["DOMAIN"], "b.example");
    }

    #[test]
    fn step_env_overrides_shared_env() {
        let mut ctx = RunContext::new("/tmp");
        ctx.env.insert("A".into(), "shared".into());
        ctx.env.insert("B".into(), "shared".into());

        let step_env = HashMap::from([("B".to_string(), "step".to_string())]);
        let options = ctx.command_options(&step_env, Some(Duration::from_secs(1)));

        assert_eq!(options.env["A"], "shared");
        assert_eq!(options.env["B"], "step");
        assert_eq!(options.cwd, Some(PathBuf::from("/tmp")));
        assert_eq!(options.timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn resolve_path_keeps_absolute_paths() {
        let ctx = RunContext::new("/srv");
        assert_eq!(ctx.resolve_path("/etc/hosts"), PathBuf::from("/etc/hosts"));
        assert_eq!(ctx.resolve_path("app/.env"), PathBuf::from("/srv/app/.env"));
    }

    #[test]
    fn forced_steps() {
        let mut ctx = RunContext::new("/srv");
        ctx.options.force.insert("nginx".into());
        assert!(ctx.is_forced("nginx"));
        assert!(!ctx.is_forced("cert"));
    }
}
