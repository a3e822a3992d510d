//! Manifest discovery and loading.
//!
//! A manifest is found in this order:
//! 1. An explicit path (`--manifest`)
//! 2. `provision.yml` in the project directory
//! 3. `.provisor/manifest.yml` in the project directory
//!
//! If a sibling overlay named `<stem>.local.<ext>` exists (for example
//! `provision.local.yml`), it is deep-merged over the manifest.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::merger::merge_layers;
use crate::config::schema::Manifest;
use crate::error::{ProvisorError, Result};

/// Default manifest file name in the project directory.
pub const MANIFEST_FILE: &str = "provision.yml";

/// Alternate manifest location inside a dot directory.
pub const MANIFEST_DIR_FILE: &str = ".provisor/manifest.yml";

/// A manifest together with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    /// The merged manifest.
    pub manifest: Manifest,
    /// Path of the main manifest file.
    pub path: PathBuf,
    /// Path of the local overlay, if one was merged.
    pub overlay: Option<PathBuf>,
}

impl LoadedManifest {
    /// Directory containing the main manifest.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Locate the manifest for a project.
///
/// # Errors
///
/// Returns `ManifestNotFound` naming the first candidate path when nothing
/// exists.
pub fn find_manifest(project_root: &Path, explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            project_root.join(path)
        };
        return if path.is_file() {
            Ok(path)
        } else {
            Err(ProvisorError::ManifestNotFound { path })
        };
    }

    [MANIFEST_FILE, MANIFEST_DIR_FILE]
        .iter()
        .map(|candidate| project_root.join(candidate))
        .find(|path| path.is_file())
        .ok_or_else(|| ProvisorError::ManifestNotFound {
            path: project_root.join(MANIFEST_FILE),
        })
}

/// Path of the local overlay for a manifest (whether or not it exists).
pub fn overlay_path(manifest: &Path) -> PathBuf {
    let stem = manifest
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("provision");
    let name = match manifest.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}.local.{}", stem, ext),
        None => format!("{}.local", stem),
    };
    manifest.with_file_name(name)
}

/// Read a YAML file as a raw value, for merging.
pub fn load_manifest_value(path: &Path) -> Result<serde_yaml::Value> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProvisorError::ManifestNotFound {
                path: path.to_path_buf(),
            }
        } else {
            ProvisorError::Io(e)
        }
    })?;

    let value: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|e| ProvisorError::ManifestParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    // An empty file parses as null; treat it as an empty manifest.
    Ok(if value.is_null() {
        serde_yaml::Value::Mapping(Default::default())
    } else {
        value
    })
}

/// Parse YAML text into a manifest.
///
/// `source_path` is only used for error messages.
pub fn parse_manifest(content: &str, source_path: &Path) -> Result<Manifest> {
    serde_yaml::from_str(content).map_err(|e| ProvisorError::ManifestParseError {
        path: source_path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load a manifest file and its local overlay, if any.
pub fn load_manifest(path: &Path) -> Result<LoadedManifest> {
    let mut layers = vec![load_manifest_value(path)?];

    let overlay = overlay_path(path);
    let overlay = if overlay.is_file() {
        tracing::debug!("Merging local overlay {}", overlay.display());
        layers.push(load_manifest_value(&overlay)?);
        Some(overlay)
    } else {
        None
    };

    let merged = merge_layers(&layers);
    let manifest: Manifest =
        serde_yaml::from_value(merged).map_err(|e| ProvisorError::ManifestParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    Ok(LoadedManifest {
        manifest,
        path: path.to_path_buf(),
        overlay,
    })
}

/// Discover and load the manifest for a project.
pub fn load_project_manifest(project_root: &Path, explicit: Option<&Path>) -> Result<LoadedManifest> {
    let path = find_manifest(project_root, explicit)?;
    load_manifest(&path)
}
