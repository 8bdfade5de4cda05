//! Engine configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use upqueue_transfer::DEFAULT_CHUNK_SIZE;

/// HTTP method used for chunk requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadMethod {
    #[default]
    Put,
    Post,
}

impl UploadMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Put => "PUT",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for UploadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upload engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL; each file is sent to `<endpoint>/<filename>`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub method: UploadMethod,

    /// Bytes per request. 0 falls back to the default.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Poll period while the queue is healthy, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Poll period after a server error, in milliseconds.
    #[serde(default = "default_error_interval_ms")]
    pub error_interval_ms: u64,

    /// Upper bound on a single chunk request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Header carrying the filename on every request.
    #[serde(default = "default_filename_header")]
    pub filename_header: String,

    /// Extra attempts to read and filter a file before it is dropped.
    #[serde(default = "default_read_retries")]
    pub read_retries: u32,

    /// Stop polling once the queue is empty instead of waiting for enqueues.
    #[serde(default)]
    pub stop_when_empty: bool,
}

fn default_endpoint() -> String {
    "http://localhost:8080/uploads".into()
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_error_interval_ms() -> u64 {
    3000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_filename_header() -> String {
    "X-File-Name".into()
}

fn default_read_retries() -> u32 {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            method: UploadMethod::default(),
            chunk_size: default_chunk_size(),
            poll_interval_ms: default_poll_interval_ms(),
            error_interval_ms: default_error_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            filename_header: default_filename_header(),
            read_retries: default_read_retries(),
            stop_when_empty: false,
        }
    }
}

impl EngineConfig {
    /// Effective chunk size; never 0.
    pub fn chunk_size(&self) -> u64 {
        if self.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.chunk_size
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn error_interval(&self) -> Duration {
        Duration::from_millis(self.error_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
