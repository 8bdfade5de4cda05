use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use upqueue_store::RecordStore;

use crate::chunked::{ChunkRange, checksum_bytes};
use crate::TransferError;

/// Store key of an upload record. Positive, assigned in enqueue order.
pub type RecordKey = u64;

/// Mime type used when a file does not declare one.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Upload progress for one queued file.
///
/// Setters only change the in-memory value; call [`save`](Self::save) to
/// persist. The whole record is written in one store operation.
///
/// Every load and save encodes, decodes and checksums the full payload, so
/// advancing through a file of `L` bytes in chunks of `C` costs
/// `O(L² / C)` in total. Keep payloads to sizes where that is acceptable,
/// or raise the chunk size for large files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    key: RecordKey,
    filename: Option<String>,
    mime_type: String,
    position: u64,
    /// `None` until the file has been read and filtered.
    data: Option<Vec<u8>>,
}

/// On-disk form of a record.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    #[serde(default)]
    filename: Option<String>,
    #[serde(default = "default_mime_type")]
    mime_type: String,
    #[serde(default)]
    position: u64,
    /// Base64 of the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    /// SHA-256 hex of the decoded payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
}

fn default_mime_type() -> String {
    DEFAULT_MIME_TYPE.to_string()
}

impl UploadRecord {
    /// Creates an empty record for `key`.
    pub fn new(key: RecordKey) -> Self {
        Self {
            key,
            filename: None,
            mime_type: default_mime_type(),
            position: 0,
            data: None,
        }
    }

    /// Loads the record stored under `key`, or an empty record if none exists.
    pub fn load(store: &dyn RecordStore, key: RecordKey) -> Result<Self, TransferError> {
        Ok(Self::find(store, key)?.unwrap_or_else(|| Self::new(key)))
    }

    /// Loads the record stored under `key`, returning `None` if it is absent.
    pub fn find(store: &dyn RecordStore, key: RecordKey) -> Result<Option<Self>, TransferError> {
        let Some(blob) = store.get(&key.to_string())? else {
            return Ok(None);
        };
        let stored: StoredRecord = serde_json::from_slice(&blob)?;

        let data = match stored.data {
            Some(encoded) => {
                let data = BASE64.decode(encoded)?;
                if let Some(expected) = &stored.checksum
                    && *expected != checksum_bytes(&data)
                {
                    return Err(TransferError::ChecksumMismatch(key));
                }
                Some(data)
            }
            None => None,
        };

        Ok(Some(Self {
            key,
            filename: stored.filename,
            mime_type: stored.mime_type,
            position: stored.position,
            data,
        }))
    }

    /// Persists every field under the record's key.
    pub fn save(&self, store: &dyn RecordStore) -> Result<(), TransferError> {
        let stored = StoredRecord {
            filename: self.filename.clone(),
            mime_type: self.mime_type.clone(),
            position: self.position,
            data: self.data.as_ref().map(|d| BASE64.encode(d)),
            checksum: self.data.as_deref().map(checksum_bytes),
        };
        let blob = serde_json::to_vec(&stored)?;
        store.set(&self.key.to_string(), &blob)?;
        Ok(())
    }

    /// Removes the record from the store.
    pub fn free(&self, store: &dyn RecordStore) -> Result<(), TransferError> {
        store.remove(&self.key.to_string())?;
        Ok(())
    }

    pub fn key(&self) -> RecordKey {
        self.key
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn set_filename(&mut self, filename: impl Into<String>) {
        self.filename = Some(filename.into());
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn set_mime_type(&mut self, mime_type: impl Into<String>) {
        self.mime_type = mime_type.into();
    }

    /// Bytes already acknowledged by the server.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn set_position(&mut self, position: u64) {
        self.position = position;
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = Some(data);
    }

    /// Returns `true` once the file bytes have been stored.
    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    /// Payload length in bytes; 0 while the data is absent.
    pub fn length(&self) -> u64 {
        self.data.as_ref().map_or(0, |d| d.len() as u64)
    }

    /// Next range to send, or `None` if the payload is fully acknowledged.
    pub fn next_range(&self, chunk_size: u64) -> Option<ChunkRange> {
        ChunkRange::next(self.position, chunk_size, self.length())
    }

    /// Borrows the bytes of `range`, if they are present.
    pub fn chunk(&self, range: &ChunkRange) -> Option<&[u8]> {
        let data = self.data.as_deref()?;
        data.get(range.start as usize..range.end as usize)
    }
}
