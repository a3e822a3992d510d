//! Shared manifest loading for commands.

use std::path::{Path, PathBuf};

use crate::config::{load_project_manifest, parse_var_overrides, validate, LoadedManifest};
use crate::error::Result;
use crate::runner::{RunContext, RunOptions, StepRegistry};

/// Where a command finds its manifest.
#[derive(Debug, Clone)]
pub struct ProjectLocation {
    /// Project root directory.
    pub root: PathBuf,
    /// Explicit manifest path from `--manifest`.
    pub manifest: Option<PathBuf>,
}

impl ProjectLocation {
    pub fn new(root: impl Into<PathBuf>, manifest: Option<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifest,
        }
    }

    /// Load, validate and resolve the manifest into a ready-to-run project.
    ///
    /// Fails before anything is probed or executed: missing or unparsable
    /// manifests, validation errors, undefined variables, unknown
    /// dependencies and cycles all surface here.
    pub fn load(&self, vars: &[String], options: RunOptions) -> Result<LoadedProject> {
        let loaded = load_project_manifest(&self.root, self.manifest.as_deref())?;
        validate(&loaded.manifest)?;

        let overrides = parse_var_overrides(vars)?;
        let ctx = RunContext::for_manifest(&loaded, overrides, options)?;
        let registry = StepRegistry::load(&loaded.manifest, &ctx)?;

        tracing::debug!(
            "Loaded {} from {}",
            registry.name().unwrap_or("manifest"),
            loaded.path.display()
        );

        Ok(LoadedProject {
            loaded,
            ctx,
            registry,
        })
    }
}

/// A manifest resolved into its run context and step registry.
#[derive(Debug)]
pub struct LoadedProject {
    pub loaded: LoadedManifest,
    pub ctx: RunContext,
    pub registry: StepRegistry,
}

impl LoadedProject {
    /// Display name: the manifest `name`, else the project directory name.
    pub fn display_name(&self) -> String {
        self.registry
            .name()
            .map(str::to_string)
            .or_else(|| dir_name(self.loaded.dir()))
            .unwrap_or_else(|| "project".to_string())
    }
}

fn dir_name(dir: &Path) -> Option<String> {
    dir.file_name().map(|n| n.to_string_lossy().into_owned())
}
