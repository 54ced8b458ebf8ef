// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The persisted bearer credential.
//!
//! One record per config directory, at `<config-dir>/credentials.json`.
//! Login overwrites it and logout deletes it. Nothing is cached in memory:
//! each command loads the record on first use.

pub mod persist;

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StorageError;

pub const CREDENTIALS_FILE: &str = "credentials.json";

/// A bearer token and the API it was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    /// API base URL the token was issued by.
    pub issued_for: String,
    /// Epoch seconds.
    #[serde(default)]
    pub obtained_at: u64,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, issued_for: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            issued_for: issued_for.into(),
            obtained_at: epoch_secs(),
        }
    }
}

/// Resolve the config directory: explicit override, then
/// `$XDG_CONFIG_HOME/neptune`, then `$HOME/.config/neptune`.
pub fn resolve_config_dir(
    explicit: Option<&Path>,
    xdg_config_home: Option<&str>,
    home: Option<&str>,
) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Some(xdg) = xdg_config_home.filter(|s| !s.is_empty()) {
        return PathBuf::from(xdg).join("neptune");
    }
    if let Some(home) = home.filter(|s| !s.is_empty()) {
        return PathBuf::from(home).join(".config").join("neptune");
    }
    PathBuf::from(".config").join("neptune")
}

/// [`resolve_config_dir`] against the process environment.
pub fn config_dir(explicit: Option<&Path>) -> PathBuf {
    let xdg = std::env::var("XDG_CONFIG_HOME").ok();
    let home = std::env::var("HOME").ok();
    resolve_config_dir(explicit, xdg.as_deref(), home.as_deref())
}

/// File-backed store for the single [`Credential`].
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self { path: config_dir.as_ref().join(CREDENTIALS_FILE) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record. Absent or empty-token records are `Ok(None)`.
    pub fn load(&self) -> Result<Option<Credential>, StorageError> {
        let credential: Option<Credential> = persist::load(&self.path)?;
        Ok(credential.filter(|c| !c.access_token.is_empty()))
    }

    /// Replace the record.
    pub fn save(&self, credential: &Credential) -> Result<(), StorageError> {
        persist::save(&self.path, credential)?;
        debug!(path = %self.path.display(), issued_for = %credential.issued_for, "credential saved");
        Ok(())
    }

    /// Delete the record. Returns whether one existed.
    pub fn clear(&self) -> Result<bool, StorageError> {
        let removed = persist::remove(&self.path)?;
        debug!(path = %self.path.display(), removed, "credential cleared");
        Ok(removed)
    }
}

pub fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;
