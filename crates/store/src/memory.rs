use std::collections::HashMap;
use std::sync::RwLock;

use crate::{RecordStore, StoreError};

/// Process-local store. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.read().unwrap().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_store_empty() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert!(store.get("1").unwrap().is_none());
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn set_get_overwrite() {
        let store = MemoryStore::new();
        store.set("1", b"first").unwrap();
        store.set("1", b"second").unwrap();
        assert_eq!(store.get("1").unwrap().as_deref(), Some(&b"second"[..]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_missing_is_ok() {
        let store = MemoryStore::new();
        store.remove("nope").unwrap();

        store.set("a", b"x").unwrap();
        store.remove("a").unwrap();
        assert!(store.get("a").unwrap().is_none());
    }

    #[test]
    fn keys_lists_everything() {
        let store = MemoryStore::new();
        store.set("1", b"x").unwrap();
        store.set("2", b"y").unwrap();
        store.set("settings", b"z").unwrap();

        let mut keys = store.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["1", "2", "settings"]);
    }
}
