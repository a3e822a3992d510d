//! Manifest loading, parsing, and validation.
//!
//! - Schema definitions in [`schema`]
//! - File discovery and overlay loading in [`loader`]
//! - Deep merging in [`merger`]
//! - Structural validation in [`validator`]
//! - `${var}` interpolation in [`interpolation`]
//!
//! # Example
//!
//! ```
//! use provisor::config::{load_project_manifest, validate};
//! use tempfile::TempDir;
//! use std::fs;
//!
//! let temp = TempDir::new().unwrap();
//! fs::write(
//!     temp.path().join("provision.yml"),
//!     "name: ide\nsteps:\n  - name: hello\n    command: echo hello\n",
//! )
//! .unwrap();
//!
//! let loaded = load_project_manifest(temp.path(), None).unwrap();
//! validate(&loaded.manifest).unwrap();
//! assert_eq!(loaded.manifest.name, Some("ide".to_string()));
//! ```

pub mod interpolation;
pub mod loader;
pub mod merger;
pub mod schema;
pub mod validator;

pub use schema::{Criticality, Manifest, ProbeConfig, RetryConfig, Settings, StepConfig};

pub use loader::{
    find_manifest, load_manifest, load_manifest_value, load_project_manifest, overlay_path,
    parse_manifest, LoadedManifest, MANIFEST_DIR_FILE, MANIFEST_FILE,
};

pub use merger::{deep_merge, merge_layers};

pub use validator::{validate, validate_manifest, ValidationError};

pub use interpolation::{
    extract_variables, parse_interpolation, parse_var_overrides, Segment, Variables,
};
