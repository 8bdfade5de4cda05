//! Directory-backed store.
//!
//! Each key lives in its own file named `<hex(key)>.rec`, so arbitrary keys
//! map to safe file names. Writes go to a sibling `.tmp` file first and are
//! renamed into place, which makes every `set` all-or-nothing.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{RecordStore, StoreError};

const RECORD_EXT: &str = "rec";
const TEMP_EXT: &str = "tmp";

/// Persistent store rooted at a directory.
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "opened record store");
        Ok(Self { root })
    }

    /// Returns the store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str, ext: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey("empty key".into()));
        }
        Ok(self.root.join(format!("{}.{ext}", hex::encode(key))))
    }
}

impl RecordStore for DirStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key, RECORD_EXT)?;
        match std::fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key, RECORD_EXT)?;
        let tmp = self.path_for(key, TEMP_EXT)?;
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key, RECORD_EXT)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.root)?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match hex::decode(stem).ok().and_then(|b| String::from_utf8(b).ok()) {
                Some(key) => keys.push(key),
                None => warn!(path = %path.display(), "ignoring foreign file in record store"),
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, DirStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirStore::open(tmp.path().join("records")).unwrap();
        (tmp, store)
    }

    #[test]
    fn open_creates_directory() {
        let (_tmp, store) = test_store();
        assert!(store.root().is_dir());
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn set_and_get() {
        let (_tmp, store) = test_store();
        store.set("1", b"payload").unwrap();
        assert_eq!(store.get("1").unwrap().as_deref(), Some(&b"payload"[..]));
        assert!(store.get("2").unwrap().is_none());
    }

    #[test]
    fn survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let store = DirStore::open(tmp.path()).unwrap();
            store.set("7", b"persisted").unwrap();
        }

        let store = DirStore::open(tmp.path()).unwrap();
        assert_eq!(store.get("7").unwrap().as_deref(), Some(&b"persisted"[..]));
        assert_eq!(store.keys().unwrap(), vec!["7"]);
    }

    #[test]
    fn remove_deletes_file() {
        let (_tmp, store) = test_store();
        store.set("1", b"x").unwrap();
        store.remove("1").unwrap();
        assert!(store.get("1").unwrap().is_none());
        assert!(store.keys().unwrap().is_empty());

        // Removing again is fine.
        store.remove("1").unwrap();
    }

    #[test]
    fn keys_with_path_characters_are_safe() {
        let (_tmp, store) = test_store();
        store.set("../escape", b"x").unwrap();
        store.set("a/b", b"y").unwrap();

        let mut keys = store.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["../escape", "a/b"]);
        assert!(!store.root().parent().unwrap().join("escape").exists());
    }

    #[test]
    fn leftover_temp_files_are_ignored() {
        let (_tmp, store) = test_store();
        store.set("1", b"x").unwrap();
        std::fs::write(store.root().join(format!("{}.tmp", hex::encode("2"))), b"half").unwrap();
        std::fs::write(store.root().join("README"), b"not a record").unwrap();

        assert_eq!(store.keys().unwrap(), vec!["1"]);
    }

    #[test]
    fn empty_key_rejected() {
        let (_tmp, store) = test_store();
        assert!(matches!(
            store.set("", b"x"),
            Err(StoreError::InvalidKey(_))
        ));
    }
}
