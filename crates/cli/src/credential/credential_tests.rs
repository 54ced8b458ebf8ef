// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::{Path, PathBuf};

use super::*;
use crate::assert_err_contains;

fn store_in(dir: &tempfile::TempDir) -> CredentialStore {
    CredentialStore::new(dir.path().join("neptune"))
}

#[test]
fn load_without_record_is_none() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    assert_eq!(store_in(&dir).load()?, None);
    Ok(())
}

#[test]
fn save_then_load_from_fresh_store() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let saved = Credential {
        access_token: "tok-abc".to_owned(),
        issued_for: "https://neptune.shuttle.dev/v1".to_owned(),
        obtained_at: 1_760_000_000,
    };
    store_in(&dir).save(&saved)?;

    let loaded = store_in(&dir).load()?;
    assert_eq!(loaded, Some(saved));
    Ok(())
}

#[test]
fn save_overwrites_previous_record() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = store_in(&dir);
    store.save(&Credential::new("first", "http://a"))?;
    store.save(&Credential::new("second", "http://b"))?;

    let loaded = store.load()?.map(|c| c.access_token);
    assert_eq!(loaded.as_deref(), Some("second"));

    let leftovers = std::fs::read_dir(dir.path().join("neptune"))?.count();
    assert_eq!(leftovers, 1, "temp files must not remain next to the record");
    Ok(())
}

#[test]
fn clear_then_load_is_none() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = store_in(&dir);
    store.save(&Credential::new("tok", "http://a"))?;

    assert!(store.clear()?);
    assert_eq!(store.load()?, None);
    assert!(!store.path().exists());
    Ok(())
}

#[test]
fn clear_without_record_is_ok() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    assert!(!store_in(&dir).clear()?);
    Ok(())
}

#[test]
fn undecodable_record_is_corrupt() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = store_in(&dir);
    std::fs::create_dir_all(dir.path().join("neptune"))?;
    std::fs::write(store.path(), "{not json")?;

    let err = store.load().err().map(|e| e.as_str());
    assert_eq!(err, Some("CORRUPT"));
    Ok(())
}

#[test]
fn empty_token_counts_as_absent() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = store_in(&dir);
    std::fs::create_dir_all(dir.path().join("neptune"))?;
    std::fs::write(store.path(), r#"{"access_token":"","issued_for":"http://a"}"#)?;

    assert_eq!(store.load()?, None);
    Ok(())
}

#[test]
fn save_under_a_file_is_unwritable() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "")?;
    let store = CredentialStore::new(blocker.join("neptune"));

    assert_err_contains!(store.save(&Credential::new("tok", "http://a")), "cannot write");
    Ok(())
}

#[cfg(unix)]
#[test]
fn record_and_directory_are_owner_only() -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir()?;
    let store = store_in(&dir);
    store.save(&Credential::new("tok", "http://a"))?;

    let file_mode = std::fs::metadata(store.path())?.permissions().mode() & 0o777;
    assert_eq!(file_mode, 0o600);
    let dir_mode = std::fs::metadata(dir.path().join("neptune"))?.permissions().mode() & 0o777;
    assert_eq!(dir_mode, 0o700);
    Ok(())
}

#[yare::parameterized(
    explicit_wins = { Some("/custom"), Some("/xdg"), Some("/home/u"), "/custom" },
    xdg = { None, Some("/xdg"), Some("/home/u"), "/xdg/neptune" },
    empty_xdg_falls_through = { None, Some(""), Some("/home/u"), "/home/u/.config/neptune" },
    home = { None, None, Some("/home/u"), "/home/u/.config/neptune" },
    nothing = { None, None, None, ".config/neptune" },
)]
fn config_dir_precedence(
    explicit: Option<&str>,
    xdg: Option<&str>,
    home: Option<&str>,
    expected: &str,
) {
    let resolved = resolve_config_dir(explicit.map(Path::new), xdg, home);
    assert_eq!(resolved, PathBuf::from(expected));
}
