//! Atomic file operations with cross-platform support
//!
//! Every artifact the engine writes (taskset JSON, result files, reports,
//! project logs) goes through [`write_file_atomic`] so that a crash never
//! leaves a reader looking at a half-written file: content lands in a temp
//! file in the same directory, gets `fsync`'d, and is only then renamed over
//! the target.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

#[cfg(target_os = "windows")]
use std::{thread, time::Duration};

/// Result of an atomic write, surfaced so callers can fold warnings into
/// their own audit trail (e.g. a result file's history).
#[derive(Debug, Clone, Default)]
pub struct AtomicWriteResult {
    /// Number of rename retries that occurred (Windows only).
    pub rename_retry_count: u32,
    /// Whether cross-filesystem fallback was used.
    pub used_cross_filesystem_fallback: bool,
    /// Any warnings generated during the operation.
    pub warnings: Vec<String>,
}

/// Atomically write `content` to `path` using temp file + fsync + rename.
///
/// Creates parent directories (mode left to the OS default) if missing.
pub fn write_file_atomic(path: &Utf8Path, content: &[u8]) -> Result<AtomicWriteResult> {
    let mut result = AtomicWriteResult::default();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent directory: {parent}"))?;
    }

    let temp_dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut temp_file = NamedTempFile::new_in(temp_dir)
        .with_context(|| format!("failed to create temporary file in: {temp_dir}"))?;

    temp_file
        .write_all(content)
        .with_context(|| "failed to write content to temporary file")?;
    temp_file
        .as_file()
        .sync_all()
        .with_context(|| "failed to fsync temporary file")?;

    let temp_path = temp_file.path().to_path_buf();
    match atomic_rename(temp_file, path.as_std_path()) {
        Ok(retry_count) => {
            result.rename_retry_count = retry_count;
            if retry_count > 0 {
                result.warnings.push(format!(
                    "rename required {retry_count} retries due to transient filesystem locks"
                ));
            }
        }
        Err(e) if is_cross_filesystem_error(&e) => {
            result.used_cross_filesystem_fallback = true;
            result
                .warnings
                .push("used cross-filesystem fallback (copy->fsync->replace)".to_string());
            cross_filesystem_copy_from_path(&temp_path, path)?;
        }
        Err(e) => return Err(e).with_context(|| format!("failed to atomically write: {path}")),
    }

    Ok(result)
}

/// Convenience wrapper for UTF-8 text content.
pub fn write_text_atomic(path: &Utf8Path, content: &str) -> Result<AtomicWriteResult> {
    write_file_atomic(path, content.as_bytes())
}

#[cfg(target_os = "windows")]
fn atomic_rename(mut temp_file: NamedTempFile, target: &Path) -> Result<u32> {
    use std::io::ErrorKind;

    const MAX_RETRIES: u32 = 5;
    const INITIAL_DELAY_MS: u64 = 10;
    const MAX_TOTAL_DELAY_MS: u64 = 250;

    let mut retry_count = 0;
    let mut total_delay_ms = 0;

    loop {
        match temp_file.persist(target) {
            Ok(_) => return Ok(retry_count),
            Err(persist_error) => {
                if retry_count >= MAX_RETRIES {
                    return Err(anyhow::anyhow!(persist_error.error));
                }
                let is_retryable = matches!(
                    persist_error.error.kind(),
                    ErrorKind::PermissionDenied | ErrorKind::Other
                );
                if !is_retryable {
                    return Err(anyhow::anyhow!(persist_error.error));
                }

                let delay_ms = INITIAL_DELAY_MS * 2_u64.pow(retry_count);
                if total_delay_ms + delay_ms > MAX_TOTAL_DELAY_MS {
                    let remaining = MAX_TOTAL_DELAY_MS.saturating_sub(total_delay_ms);
                    if remaining > 0 {
                        thread::sleep(Duration::from_millis(remaining));
                    }
                    return persist_error
                        .file
                        .persist(target)
                        .map(|_| retry_count + 1)
                        .map_err(|e| anyhow::anyhow!(e.error));
                }

                thread::sleep(Duration::from_millis(delay_ms));
                total_delay_ms += delay_ms;
                retry_count += 1;
                temp_file = persist_error.file;
            }
        }
    }
}

#[cfg(not(target_os = "windows"))]
fn atomic_rename(temp_file: NamedTempFile, target: &Path) -> Result<u32> {
    temp_file
        .persist(target)
        .map(|_| 0)
        .map_err(|e| anyhow::anyhow!(e.error))
}

#[cfg(unix)]
fn is_cross_filesystem_error(err: &anyhow::Error) -> bool {
    use std::io::ErrorKind;
    if let Some(io_error) = err.downcast_ref::<std::io::Error>() {
        if io_error.kind() != ErrorKind::Other {
            return false;
        }
        matches!(io_error.raw_os_error(), Some(18)) // EXDEV
    } else {
        false
    }
}

#[cfg(windows)]
fn is_cross_filesystem_error(_err: &anyhow::Error) -> bool {
    false
}

fn cross_filesystem_copy_from_path(temp_path: &Path, target: &Utf8Path) -> Result<()> {
    let content =
        fs::read(temp_path).with_context(|| "failed to read temp file for cross-fs copy")?;

    let target_dir = target.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut target_temp = NamedTempFile::new_in(target_dir)
        .with_context(|| format!("failed to create temp file in: {target_dir}"))?;
    target_temp
        .write_all(&content)
        .with_context(|| "failed to write content during cross-fs copy")?;
    target_temp
        .as_file()
        .sync_all()
        .with_context(|| "failed to fsync during cross-fs copy")?;
    target_temp
        .persist(target.as_std_path())
        .map_err(|e| anyhow::anyhow!(e.error))
        .with_context(|| "failed to persist during cross-fs copy")?;

    let _ = fs::remove_file(temp_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_roundtrips() {
        let dir = tempfile::TempDir::new().unwrap();
        let path_buf = dir.path().join("a.json");
        let path = Utf8Path::from_path(&path_buf).unwrap();

        write_text_atomic(path, "{\"a\":1}").unwrap();
        assert_eq!(fs::read_to_string(&path_buf).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let path_buf = dir.path().join("nested").join("deep").join("f.txt");
        let path = Utf8Path::from_path(&path_buf).unwrap();

        write_text_atomic(path, "x").unwrap();
        assert!(path_buf.exists());
    }

    #[test]
    fn overwrites_existing_content() {
        let dir = tempfile::TempDir::new().unwrap();
        let path_buf = dir.path().join("f.txt");
        let path = Utf8Path::from_path(&path_buf).unwrap();

        write_text_atomic(path, "first").unwrap();
        write_text_atomic(path, "second").unwrap();
        assert_eq!(fs::read_to_string(&path_buf).unwrap(), "second");
    }

    #[test]
    fn never_leaves_a_tmp_file_next_to_the_target_on_success() {
        let dir = tempfile::TempDir::new().unwrap();
        let path_buf = dir.path().join("f.json");
        let path = Utf8Path::from_path(&path_buf).unwrap();

        write_text_atomic(path, "{}").unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("f.json")]);
    }
}
