//! Pre-upload filters.
//!
//! A filter receives the raw bytes of a queued file and returns the bytes
//! that will actually be uploaded. Filters are registered on a
//! [`FilterPipeline`] and run once per file, before the data is persisted.

mod pipeline;
mod resize;

use std::future::Future;
use std::pin::Pin;

pub use pipeline::{FilterPipeline, IdentityFilter};
pub use resize::ResizeFilter;

/// Errors produced while filtering file bytes.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("filter task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("{filter}: {reason}")]
    Rejected { filter: String, reason: String },
}

/// A transformation applied to file bytes before upload.
///
/// Implementations must be cheap to share: the pipeline holds them behind
/// `Arc` and the same instance may filter many files concurrently.
pub trait UploadFilter: Send + Sync {
    /// Short name used in log output.
    fn name(&self) -> &str;

    /// Transforms `data`, returning the bytes to upload.
    fn process(
        &self,
        data: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, FilterError>> + Send + '_>>;
}
