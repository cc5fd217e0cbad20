//! Scratch destinations.
//!
//! A [`TempTarget`] is a file path inside a private temporary directory, so
//! tests can inspect both the destination and anything left next to it.

use safewrite_core::{Config, Session};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A destination path in a temporary directory with automatic cleanup.
pub struct TempTarget {
    path: PathBuf,
    /// The temporary directory (kept alive to prevent cleanup).
    dir: TempDir,
}

impl TempTarget {
    /// Creates a target named `name` that does not exist yet.
    pub fn new(name: &str) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = dir.path().join(name);
        Self { path, dir }
    }

    /// Creates a target named `name` holding `content`.
    pub fn with_content(name: &str, content: &[u8]) -> Self {
        let target = Self::new(name);
        if let Some(parent) = target.path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&target.path, content).expect("Failed to write initial content");
        target
    }

    /// Returns the destination path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the temporary directory.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Returns true if the destination exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads the destination, or `None` if it does not exist.
    pub fn read(&self) -> Option<Vec<u8>> {
        fs::read(&self.path).ok()
    }

    /// Opens a session on the destination.
    pub fn session(&self, config: Config) -> Session<'static> {
        config.open(&self.path).expect("Failed to open session")
    }

    /// Lists every file under the temporary directory except the
    /// destination itself, such as leftover staging files.
    pub fn stray_files(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        collect_files(self.dir.path(), &mut found);
        found.retain(|p| p != &self.path);
        found.sort();
        found
    }
}

fn collect_files(dir: &Path, found: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, found);
        } else {
            found.push(path);
        }
    }
}

/// Runs a test with a fresh destination named `name`.
///
/// # Example
///
/// ```rust,ignore
/// use safewrite_testkit::with_target;
///
/// #[test]
/// fn my_test() {
///     with_target("out.txt", |target| {
///         // ... write to target.path()
///     });
/// }
/// ```
pub fn with_target<F, R>(name: &str, f: F) -> R
where
    F: FnOnce(&TempTarget) -> R,
{
    let target = TempTarget::new(name);
    f(&target)
}
