//! Platform detection helpers.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Check if running in a CI environment.
pub fn is_ci() -> bool {
    ["CI", "GITHUB_ACTIONS", "GITLAB_CI", "CIRCLECI", "TRAVIS", "JENKINS_URL"]
        .iter()
        .any(|var| std::env::var_os(var).is_some())
}

/// Find an executable by name on the given `PATH` value.
///
/// Names containing a path separator are checked directly.
pub fn find_executable_in(name: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    if name.contains('/') || name.contains('\\') {
        let candidate = PathBuf::from(name);
        return is_executable(&candidate).then_some(candidate);
    }

    let path_var = path_var?;
    std::env::split_paths(path_var).find_map(|dir| {
        executable_names(name)
            .into_iter()
            .map(|file| dir.join(file))
            .find(|candidate| is_executable(candidate))
    })
}

fn executable_names(name: &str) -> Vec<String> {
    if cfg!(target_os = "windows") {
        vec![name.to_string(), format!("{}.exe", name), format!("{}.cmd", name)]
    } else {
        vec![name.to_string()]
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
