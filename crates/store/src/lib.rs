//! Durable key-value stores for upload records.
//!
//! The upload engine never touches storage directly; it goes through the
//! [`RecordStore`] trait so any platform store can back the queue. Values
//! are opaque blobs and are always written whole.

mod dir;
mod memory;

pub use dir::DirStore;
pub use memory::MemoryStore;

/// Errors produced by record stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// A durable key to blob mapping.
///
/// Implementations must persist each `set` as a single all-or-nothing write
/// and, for durable stores, survive process restarts.
pub trait RecordStore: Send + Sync {
    /// Returns the blob stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Returns every key currently present, in no particular order.
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}
