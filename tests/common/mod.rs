//! Shared helpers for integration tests.
//!
//! Integration tests under `tests/` compile as independent crates. This
//! module is included via `mod common;` to share the working-directory
//! sandbox used by tests that exercise cwd-relative behaviour (the binary
//! cache and clean), which must run serially. Not every binary uses every
//! helper.
#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

/// Guard that switches the process into a fresh temporary directory and
/// restores the original working directory on drop.
///
/// Tests using this must be marked `#[serial]`: the working directory is
/// process-global state.
pub struct TempCwd {
    original: PathBuf,
    dir: TempDir,
}

impl TempCwd {
    /// Create a sandbox directory and enter it.
    #[must_use]
    pub fn enter() -> Self {
        let original = env::current_dir().expect("current directory");
        let dir = tempfile::tempdir().expect("temp dir");
        env::set_current_dir(dir.path()).expect("enter temp dir");
        Self { original, dir }
    }

    /// Absolute path of the sandbox.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        Utf8Path::from_path(self.dir.path()).expect("utf-8 temp dir")
    }
}

impl Drop for TempCwd {
    fn drop(&mut self) {
        let _ = env::set_current_dir(&self.original);
    }
}

/// Convert a tempdir path into a UTF-8 path, panicking on exotic systems.
#[must_use]
pub fn utf8_path(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).expect("utf-8 path")
}
