//! Upload engine error types.

/// Errors surfaced to callers of the upload engine.
///
/// Failures inside the poll loop never reach the caller; they are logged
/// and reported through [`UploadEvent`](crate::UploadEvent)s instead.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] upqueue_store::StoreError),

    #[error("transfer error: {0}")]
    Transfer(#[from] upqueue_transfer::TransferError),

    #[error("filter error: {0}")]
    Filter(#[from] upqueue_filters::FilterError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}
