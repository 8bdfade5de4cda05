//! Queue ordering over record keys.
//!
//! Upload records share the store with anything else the application keeps
//! there, so only canonical positive-integer keys count as queue entries.

use std::collections::BTreeSet;

use tracing::debug;
use upqueue_store::RecordStore;

use crate::record::RecordKey;
use crate::TransferError;

/// Parses a store key as a record key.
///
/// Accepts canonical positive integers only: `"7"` but not `"07"`, `"+7"`,
/// `"0"` or `"7.5"`.
pub fn parse_key(key: &str) -> Option<RecordKey> {
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) || key.starts_with('0') {
        return None;
    }
    key.parse().ok()
}

/// Smallest record key among `keys`, or `None` if there is none.
pub fn min_key<I, S>(keys: I) -> Option<RecordKey>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keys.into_iter().filter_map(|k| parse_key(k.as_ref())).min()
}

/// Largest record key among `keys` plus one; 1 when there is none.
pub fn next_key<I, S>(keys: I) -> RecordKey
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keys.into_iter()
        .filter_map(|k| parse_key(k.as_ref()))
        .max()
        .map_or(1, |max| max + 1)
}

/// Ordered index of pending record keys.
///
/// Built once from a store scan and then kept current on enqueue and
/// delete, so polling never has to list the store. Keys handed out by
/// [`reserve`](Self::reserve) are never handed out again by the same index,
/// even after the record is removed.
#[derive(Debug, Default, Clone)]
pub struct QueueIndex {
    pending: BTreeSet<RecordKey>,
    high_water: RecordKey,
}

impl QueueIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from raw store keys, ignoring non-record keys.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pending: BTreeSet<RecordKey> = keys
            .into_iter()
            .filter_map(|k| parse_key(k.as_ref()))
            .collect();
        let high_water = pending.last().copied().unwrap_or(0);
        Self {
            pending,
            high_water,
        }
    }

    /// Builds an index from the keys currently in `store`.
    pub fn scan(store: &dyn RecordStore) -> Result<Self, TransferError> {
        let index = Self::from_keys(store.keys()?);
        debug!(pending = index.len(), "scanned record store");
        Ok(index)
    }

    /// The active record: the smallest pending key.
    pub fn min_key(&self) -> Option<RecordKey> {
        self.pending.first().copied()
    }

    /// The key the next enqueue will receive.
    pub fn next_key(&self) -> RecordKey {
        self.high_water + 1
    }

    /// Allocates the next key and marks it pending.
    pub fn reserve(&mut self) -> RecordKey {
        let key = self.next_key();
        self.high_water = key;
        self.pending.insert(key);
        key
    }

    /// Drops `key` from the index. Returns `true` if it was pending.
    pub fn remove(&mut self, key: RecordKey) -> bool {
        self.pending.remove(&key)
    }

    pub fn contains(&self, key: RecordKey) -> bool {
        self.pending.contains(&key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending keys in queue order.
    pub fn keys(&self) -> impl Iterator<Item = RecordKey> + '_ {
        self.pending.iter().copied()
    }

    /// Empties the index, returning the keys that were pending.
    ///
    /// The reservation high-water mark is kept.
    pub fn drain(&mut self) -> Vec<RecordKey> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upqueue_store::MemoryStore;

    #[test]
    fn parse_key_accepts_positive_integers() {
        assert_eq!(parse_key("1"), Some(1));
        assert_eq!(parse_key("4294967296"), Some(4_294_967_296));
    }

    #[test]
    fn parse_key_rejects_other_keys() {
        for key in ["", "0", "07", "-1", "+1", "1.5", "abc", "1a", " 1"] {
            assert_eq!(parse_key(key), None, "{key:?} should not parse");
        }
    }

    #[test]
    fn min_key_none_without_integer_keys() {
        assert_eq!(min_key(Vec::<String>::new()), None);
        assert_eq!(min_key(["settings", "theme"]), None);
    }

    #[test]
    fn min_and_next_key() {
        let keys = ["3", "settings", "1", "2"];
        assert_eq!(min_key(keys), Some(1));
        assert_eq!(next_key(keys), 4);
        assert_eq!(next_key(["settings"]), 1);
    }

    #[test]
    fn reserve_is_strictly_increasing() {
        let mut index = QueueIndex::new();
        let keys: Vec<_> = (0..5).map(|_| index.reserve()).collect();
        assert_eq!(keys, vec![1, 2, 3, 4, 5]);
        assert_eq!(index.min_key(), Some(1));
    }

    #[test]
    fn keys_not_reused_after_removal() {
        let mut index = QueueIndex::new();
        let a = index.reserve();
        let b = index.reserve();
        assert!(index.remove(b));
        assert!(index.remove(a));
        assert!(index.is_empty());

        assert_eq!(index.reserve(), 3);
    }

    #[test]
    fn remove_skips_key() {
        let mut index = QueueIndex::from_keys(["1", "2", "3"]);
        assert!(index.remove(1));
        assert!(!index.remove(1));
        assert_eq!(index.min_key(), Some(2));
        assert!(!index.contains(1));
    }

    #[test]
    fn scan_store() {
        let store = MemoryStore::new();
        store.set("5", b"{}").unwrap();
        store.set("2", b"{}").unwrap();
        store.set("prefs", b"{}").unwrap();

        let index = QueueIndex::scan(&store).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.min_key(), Some(2));
        assert_eq!(index.next_key(), 6);
        assert_eq!(index.keys().collect::<Vec<_>>(), vec![2, 5]);
    }

    #[test]
    fn drain_keeps_high_water() {
        let mut index = QueueIndex::from_keys(["1", "2"]);
        assert_eq!(index.drain(), vec![1, 2]);
        assert!(index.min_key().is_none());
        assert_eq!(index.reserve(), 3);
    }
}
