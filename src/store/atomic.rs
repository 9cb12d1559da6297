//! Temp-file-plus-rename replacement shared by data file rewrites and
//! index saves.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{IoContext, Result};

/// `<path>.tmp`
pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Replace `path` with `bytes` so that readers see either the old or the
/// new content, never a mix.
pub(crate) fn replace_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);

    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .io_context("create temp file", &tmp)?;
        file.write_all(bytes).io_context("write temp file", &tmp)?;
        file.sync_all().io_context("sync temp file", &tmp)?;
    }

    fs::rename(&tmp, path).io_context("rename temp file", path)?;
    sync_parent_dir(path);
    Ok(())
}

/// Remove a temp file left behind by an interrupted replace.
///
/// Returns true when a stale file was found.
pub(crate) fn remove_stale_tmp(path: &Path) -> Result<bool> {
    let tmp = tmp_path(path);
    if !tmp.exists() {
        return Ok(false);
    }
    fs::remove_file(&tmp).io_context("remove stale temp file", &tmp)?;
    tracing::warn!("Removed stale temp file {}", tmp.display());
    Ok(true)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    // Best effort: the rename is already visible to this process.
    if let Some(dir) = path.parent() {
        if let Ok(handle) = fs::File::open(dir) {
            let _ = handle.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}
