//! Resumable chunked upload engine.
//!
//! Files are queued into a persistent [`RecordStore`](upqueue_store::RecordStore)
//! and sent to an HTTP endpoint one bounded chunk at a time. Progress is
//! saved after every acknowledged chunk, so an interrupted upload resumes
//! from the last confirmed offset, including after a process restart.
//!
//! # Flow
//!
//! 1. **Enqueue**: reserve a key and persist an empty record
//! 2. **Load**: read the file, run the filter pipeline, store the bytes
//! 3. **Poll**: pick the smallest key and send its next chunk
//! 4. **Acknowledge**: advance and persist the offset, or back off on errors
//! 5. **Complete**: delete the record once every byte is confirmed

pub mod config;
pub mod engine;
pub mod error;
pub mod source;
pub mod transport;
pub mod types;

pub use config::{EngineConfig, UploadMethod};
pub use engine::UploadEngine;
pub use error::UploadError;
pub use source::{FileSource, LocalFile, MemoryFile, detect_mime_type};
pub use transport::{
    ChunkRequest, HttpTransport, ReqwestTransport, TransferOutcome, chunk_url, validate_endpoint,
};
pub use types::{RecordProgress, UploadEvent};
