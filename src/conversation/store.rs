//! Durable per-contact flags: the escalation blocklist and the set of contacts
//! that have already received a reply.
//!
//! Both collections live as pretty-printed JSON arrays in the state directory
//! and are rewritten whole on every mutation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;

pub const BLOCKLIST_FILE: &str = "blocklist.json";
pub const USERS_FILE: &str = "users.json";

/// Read a JSON snapshot without creating anything. `None` when the file is absent.
pub fn load_existing<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| StoreError::Malformed {
            path: path.to_path_buf(),
            source,
        })
}

/// Read a JSON snapshot. A missing file is created holding `T::default()`.
pub(crate) fn load_or_init<T>(path: &Path) -> Result<T, StoreError>
where
    T: DeserializeOwned + Serialize + Default,
{
    if let Some(value) = load_existing(path)? {
        return Ok(value);
    }
    let empty = T::default();
    write_snapshot(path, &empty)?;
    Ok(empty)
}

/// Replace the file with `value`: write a sibling temp file, then rename over.
pub(crate) fn write_snapshot<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let encoded = serde_json::to_string_pretty(value).map_err(|source| StoreError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, encoded).map_err(write_err)?;
    fs::rename(&tmp, path).map_err(write_err)
}

/// Blocklist (escalated contacts) and known-contacts list.
#[derive(Debug)]
pub struct Store {
    blocklist_path: PathBuf,
    users_path: PathBuf,
    blocked: Vec<String>,
    known: Vec<String>,
}

impl Store {
    /// Load both collections from `state_dir`, creating empty files if absent.
    pub fn open(state_dir: &Path) -> Result<Self, StoreError> {
        let blocklist_path = state_dir.join(BLOCKLIST_FILE);
        let users_path = state_dir.join(USERS_FILE);
        let blocked = load_or_init(&blocklist_path)?;
        let known = load_or_init(&users_path)?;
        Ok(Self {
            blocklist_path,
            users_path,
            blocked,
            known,
        })
    }

    pub fn is_blocked(&self, id: &str) -> bool {
        self.blocked.iter().any(|b| b == id)
    }

    /// Permanently hand `id` over to humans. Idempotent.
    pub fn mark_blocked(&mut self, id: &str) -> Result<(), StoreError> {
        if self.is_blocked(id) {
            return Ok(());
        }
        self.blocked.push(id.to_string());
        write_snapshot(&self.blocklist_path, &self.blocked)
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.known.iter().any(|k| k == id)
    }

    pub fn mark_known(&mut self, id: &str) -> Result<(), StoreError> {
        if self.is_known(id) {
            return Ok(());
        }
        self.known.push(id.to_string());
        write_snapshot(&self.users_path, &self.known)
    }

    pub fn blocked(&self) -> &[String] {
        &self.blocked
    }

    pub fn known(&self) -> &[String] {
        &self.known
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_list(path: &Path) -> Vec<String> {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn open_initializes_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        assert!(store.blocked().is_empty());
        assert!(store.known().is_empty());
        assert_eq!(fs::read_to_string(dir.path().join(BLOCKLIST_FILE)).unwrap(), "[]");
        assert_eq!(fs::read_to_string(dir.path().join(USERS_FILE)).unwrap(), "[]");
    }

    #[test]
    fn mark_blocked_persists_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();

        store.mark_blocked("5511999@s.whatsapp.net").unwrap();
        store.mark_blocked("5511999@s.whatsapp.net").unwrap();

        assert!(store.is_blocked("5511999@s.whatsapp.net"));
        assert_eq!(
            read_list(&dir.path().join(BLOCKLIST_FILE)),
            vec!["5511999@s.whatsapp.net".to_string()]
        );

        let reopened = Store::open(dir.path()).unwrap();
        assert!(reopened.is_blocked("5511999@s.whatsapp.net"));
        assert!(!reopened.is_known("5511999@s.whatsapp.net"));
    }

    #[test]
    fn mark_known_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        assert!(!store.is_known("a@s.whatsapp.net"));
        store.mark_known("a@s.whatsapp.net").unwrap();

        let reopened = Store::open(dir.path()).unwrap();
        assert!(reopened.is_known("a@s.whatsapp.net"));
        assert!(!reopened.is_blocked("a@s.whatsapp.net"));
    }

    #[test]
    fn malformed_blocklist_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(BLOCKLIST_FILE), "{\"oops\": true").unwrap();

        let err = Store::open(dir.path()).unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }

    #[test]
    fn snapshot_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        store.mark_known("b@s.whatsapp.net").unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
