// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Owner-only JSON persistence with atomic writes.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;

/// Read a JSON record. A missing file is `Ok(None)`.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let corrupt = |reason: String| StorageError::Corrupt { path: path.to_path_buf(), reason };

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(corrupt(e.to_string())),
    };
    serde_json::from_str(&contents).map(Some).map_err(|e| corrupt(e.to_string()))
}

/// Write a JSON record atomically (temp file in the same directory + rename).
///
/// The parent directory is created with mode 0700 and the record with mode
/// 0600 before it becomes visible under its final name, so readers never see
/// a partial record or a world-readable one.
pub fn save<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let unwritable = |source: io::Error| StorageError::Unwritable { path: path.to_path_buf(), source };

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    create_private_dir(dir).map_err(unwritable)?;

    let json = serde_json::to_vec_pretty(value).map_err(|e| unwritable(io::Error::other(e)))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(unwritable)?;
    tmp.write_all(&json).map_err(unwritable)?;
    tmp.write_all(b"\n").map_err(unwritable)?;
    restrict_to_owner(tmp.path()).map_err(unwritable)?;
    tmp.as_file().sync_all().map_err(unwritable)?;
    tmp.persist(path).map_err(|e| unwritable(e.error))?;
    Ok(())
}

/// Delete a record. Returns whether a file was removed.
pub fn remove(path: &Path) -> Result<bool, StorageError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(StorageError::Unwritable { path: path.to_path_buf(), source }),
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> io::Result<()> {
    Ok(())
}
