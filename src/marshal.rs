//! Conversions between Rust values and what the native source accepts.
//!
//! Path resolution is portable. The CoreFoundation string/array handles
//! live in [`cf`] and only exist on macOS.

#[cfg(target_os = "macos")]
pub mod cf;

use std::env;
use std::path::{Component, Path, PathBuf};

use crate::error::{FsEventsError, PathFailure};

/// Outcome of resolving a configured path set.
///
/// Resolution is partial: entries that resolve are kept in input order
/// even when others fail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub paths: Vec<String>,
    pub failures: Vec<PathFailure>,
}

impl ResolvedPaths {
    /// Aggregated error describing every entry that failed, if any did.
    pub fn error(&self) -> Option<FsEventsError> {
        if self.failures.is_empty() {
            None
        } else {
            Some(FsEventsError::PathResolution {
                failures: self.failures.clone(),
            })
        }
    }
}

/// Resolves every entry to an absolute path against the current directory.
pub fn resolve_paths<S: AsRef<str>>(paths: &[S]) -> ResolvedPaths {
    // Only needed for relative entries, and at most once.
    let mut cwd: Option<Result<PathBuf, String>> = None;
    let mut resolved = ResolvedPaths::default();

    for raw in paths {
        let raw = raw.as_ref();
        let outcome = if Path::new(raw).is_absolute() {
            check_path(raw).map(|()| normalize(Path::new(raw)))
        } else {
            let base = cwd.get_or_insert_with(|| {
                env::current_dir().map_err(|error| format!("cannot read current directory: {error}"))
            });
            match base {
                Ok(base) => resolve_against(raw, base),
                Err(reason) => Err(reason.clone()),
            }
        };

        match outcome {
            Ok(path) => resolved.paths.push(path.to_string_lossy().into_owned()),
            Err(reason) => resolved.failures.push(PathFailure {
                path: raw.to_string(),
                reason,
            }),
        }
    }

    resolved
}

fn resolve_against(raw: &str, base: &Path) -> Result<PathBuf, String> {
    check_path(raw)?;
    Ok(normalize(&base.join(raw)))
}

fn check_path(raw: &str) -> Result<(), String> {
    if raw.is_empty() {
        return Err("empty path".to_string());
    }
    if raw.contains('\0') {
        return Err("contains a NUL byte".to_string());
    }
    Ok(())
}

/// Lexically removes `.` and `..` components. Symlinks are not followed.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(name) => out.push(name),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(Component::RootDir.as_os_str());
    }
    out
}
