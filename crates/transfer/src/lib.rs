//! Resumable chunked upload primitives.
//!
//! Everything the upload engine needs that does not involve the network:
//! persisted [`UploadRecord`]s, byte-range math, the [`QueueIndex`] that
//! decides which record is active, and the [`BandwidthTracker`] that gates
//! re-entrancy and measures throughput.

mod chunked;
mod progress;
mod queue;
mod record;
mod validation;

pub use chunked::{ChunkRange, checksum_bytes, chunk_count};
pub use progress::{BandwidthTracker, InFlight};
pub use queue::{QueueIndex, min_key, next_key, parse_key};
pub use record::{DEFAULT_MIME_TYPE, RecordKey, UploadRecord};
pub use validation::validate_filename;

/// Default chunk size: 20 KiB.
///
/// Small enough that a dropped connection loses little progress on slow
/// links. Tune per deployment through the engine configuration.
pub const DEFAULT_CHUNK_SIZE: u64 = 20 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("store error: {0}")]
    Store(#[from] upqueue_store::StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid record data encoding: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("checksum mismatch for record {0}")]
    ChecksumMismatch(RecordKey),

    #[error("a transfer is already in flight")]
    AlreadyUploading,

    #[error("invalid filename: {0}")]
    InvalidFilename(String),
}

impl TransferError {
    /// Returns `true` if the stored bytes for a record cannot be trusted.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            Self::Json(_) | Self::Encoding(_) | Self::ChecksumMismatch(_)
        )
    }
}
