//! File sources accepted by the engine.
//!
//! `FileSource` is the engine's view of "a file the caller picked": a name,
//! a mime type and a way to read the bytes asynchronously. The CLI uses
//! [`LocalFile`]; tests and embedders can use [`MemoryFile`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use upqueue_transfer::{DEFAULT_MIME_TYPE, TransferError};

/// A file that can be enqueued for upload.
pub trait FileSource: Send + Sync {
    /// Name the file is uploaded under.
    fn name(&self) -> &str;

    /// Mime type sent with every chunk.
    fn mime_type(&self) -> &str;

    /// Reads the whole file. May be called again after a failure.
    fn read(&self) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, std::io::Error>> + Send + '_>>;
}

// ---------------------------------------------------------------------------
// LocalFile
// ---------------------------------------------------------------------------

/// A file on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    name: String,
    mime_type: String,
}

impl LocalFile {
    /// Wraps `path`. The upload name is the final path component and the
    /// mime type is guessed from the extension.
    ///
    /// Does not touch the filesystem; a missing file fails on read.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, TransferError> {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                TransferError::InvalidFilename(format!("no file name in {}", path.display()))
            })?
            .to_string();
        let mime_type = detect_mime_type(&name).unwrap_or(DEFAULT_MIME_TYPE).to_string();

        Ok(Self {
            path,
            name,
            mime_type,
        })
    }

    /// Overrides the detected mime type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileSource for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn read(&self) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, std::io::Error>> + Send + '_>> {
        Box::pin(tokio::fs::read(&self.path))
    }
}

/// Guesses a mime type from a file extension.
pub fn detect_mime_type(name: &str) -> Option<&'static str> {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("png") => Some("image/png"),
        Some("jpg" | "jpeg") => Some("image/jpeg"),
        Some("webp") => Some("image/webp"),
        Some("gif") => Some("image/gif"),
        Some("ico") => Some("image/x-icon"),
        Some("txt" | "log") => Some("text/plain"),
        Some("html" | "htm") => Some("text/html"),
        Some("json") => Some("application/json"),
        Some("pdf") => Some("application/pdf"),
        Some("zip") => Some("application/zip"),
        Some("mp4") => Some("video/mp4"),
        Some("mp3") => Some("audio/mpeg"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// MemoryFile
// ---------------------------------------------------------------------------

/// An in-memory file.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    name: String,
    mime_type: String,
    data: Vec<u8>,
}

impl MemoryFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let mime_type = detect_mime_type(&name).unwrap_or(DEFAULT_MIME_TYPE).to_string();
        Self {
            name,
            mime_type,
            data: data.into(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }
}

impl FileSource for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn read(&self) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, std::io::Error>> + Send + '_>> {
        let data = self.data.clone();
        Box::pin(async move { Ok(data) })
    }
}
