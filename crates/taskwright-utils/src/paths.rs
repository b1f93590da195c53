//! Small filesystem helpers shared by every crate that touches a project
//! directory tree.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;

/// `fs::create_dir_all` with a file-path-aware error message.
pub fn ensure_dir_all(path: &Utf8Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("failed to create directory: {path}"))
}
