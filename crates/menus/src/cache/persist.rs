//! Atomic file replacement.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{MenuError, Result};

/// Writes `bytes` to a `<file>.tmp-XXXXXX` sibling of `path` and renames it
/// over `path`. On failure the temp file is removed and `path` is untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| MenuError::InvalidInput(format!("no parent directory: {}", path.display())))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| MenuError::InvalidInput(format!("no file name: {}", path.display())))?;
    fs::create_dir_all(dir).map_err(|error| MenuError::io(dir, error))?;

    let mut temp = tempfile::Builder::new()
        .prefix(&format!("{}.tmp-", file_name.to_string_lossy()))
        .rand_bytes(6)
        .tempfile_in(dir)
        .map_err(|error| MenuError::io(dir, error))?;
    temp.write_all(bytes)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|error| MenuError::io(temp.path(), error))?;
    temp.persist(path)
        .map_err(|error| MenuError::io(path, error.error))?;

    log::debug!("wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}
