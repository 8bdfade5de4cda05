//! HTTP transport for chunk requests.
//!
//! The engine builds one [`ChunkRequest`] per chunk and hands it to an
//! [`HttpTransport`]. Using a trait keeps the poll loop independent of the
//! HTTP client and testable with scripted mocks.

use std::future::Future;
use std::pin::Pin;

use percent_encoding::{AsciiSet, CONTROLS, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::debug;

use crate::config::UploadMethod;
use crate::error::UploadError;

/// Characters left as-is in the filename path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Builds the request URL for `filename` under `endpoint`.
pub fn chunk_url(endpoint: &str, filename: &str) -> String {
    format!(
        "{}/{}",
        endpoint.trim_end_matches('/'),
        utf8_percent_encode(filename, SEGMENT)
    )
}

/// Checks that `endpoint` is an absolute `http` or `https` URL that a
/// filename segment can be appended to.
pub fn validate_endpoint(endpoint: &str) -> Result<(), UploadError> {
    let url = reqwest::Url::parse(endpoint)
        .map_err(|e| UploadError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
        return Err(UploadError::InvalidEndpoint(format!(
            "{endpoint}: not an http(s) URL"
        )));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(UploadError::InvalidEndpoint(format!(
            "{endpoint}: query and fragment are not allowed"
        )));
    }
    Ok(())
}

/// Encodes `filename` for use as a header value.
///
/// ASCII names are sent unchanged; control characters and non-ASCII bytes
/// are percent-encoded since header values must be visible ASCII.
pub fn header_value(filename: &str) -> String {
    utf8_percent_encode(filename, CONTROLS).to_string()
}

/// One chunk upload request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRequest {
    pub method: UploadMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ChunkRequest {
    /// Returns the first header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// How a chunk request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The server answered with this status code.
    Status(u16),
    /// The request never produced a response.
    Failed(String),
    /// The request was cancelled or timed out.
    Aborted,
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Status(code) if (200..300).contains(code))
    }
}

/// Sends chunk requests.
pub trait HttpTransport: Send + Sync {
    fn send(
        &self,
        request: ChunkRequest,
    ) -> Pin<Box<dyn Future<Output = TransferOutcome> + Send + '_>>;
}

// ---------------------------------------------------------------------------
// ReqwestTransport
// ---------------------------------------------------------------------------

/// [`HttpTransport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("upqueue/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(
        &self,
        request: ChunkRequest,
    ) -> Pin<Box<dyn Future<Output = TransferOutcome> + Send + '_>> {
        Box::pin(async move {
            let method = match request.method {
                UploadMethod::Put => reqwest::Method::PUT,
                UploadMethod::Post => reqwest::Method::POST,
            };

            let mut builder = self.client.request(method, &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            match builder.body(request.body).send().await {
                Ok(resp) => TransferOutcome::Status(resp.status().as_u16()),
                Err(e) if e.is_timeout() => {
                    debug!(url = %request.url, "chunk request timed out");
                    TransferOutcome::Aborted
                }
                Err(e) => TransferOutcome::Failed(e.to_string()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_url_joins_segment() {
        assert_eq!(
            chunk_url("http://host/uploads", "photo.jpg"),
            "http://host/uploads/photo.jpg"
        );
        assert_eq!(
            chunk_url("http://host/uploads/", "photo.jpg"),
            "http://host/uploads/photo.jpg"
        );
    }

    #[test]
    fn chunk_url_encodes_filename() {
        assert_eq!(
            chunk_url("http://host", "my file#1?.txt"),
            "http://host/my%20file%231%3F.txt"
        );
        assert_eq!(chunk_url("http://host", "a~b_c-d"), "http://host/a~b_c-d");
    }

    #[test]
    fn validate_endpoint_accepts_http_urls() {
        assert!(validate_endpoint("http://localhost:8080/uploads").is_ok());
        assert!(validate_endpoint("https://files.example.com/dav/").is_ok());
    }

    #[test]
    fn validate_endpoint_rejects_bad_urls() {
        for endpoint in [
            "",
            "localhost/uploads",
            "ftp://host/uploads",
            "file:///tmp/uploads",
            "http://host/uploads?token=1",
            "http://host/uploads#part",
        ] {
            assert!(
                matches!(
                    validate_endpoint(endpoint),
                    Err(UploadError::InvalidEndpoint(_))
                ),
                "{endpoint} accepted"
            );
        }
    }

    #[test]
    fn header_value_keeps_ascii() {
        assert_eq!(header_value("my file (1).txt"), "my file (1).txt");
        assert_eq!(header_value("café.txt"), "caf%C3%A9.txt");
    }

    #[test]
    fn outcome_success_range() {
        assert!(TransferOutcome::Status(200).is_success());
        assert!(TransferOutcome::Status(204).is_success());
        assert!(!TransferOutcome::Status(308).is_success());
        assert!(!TransferOutcome::Status(500).is_success());
        assert!(!TransferOutcome::Failed("reset".into()).is_success());
        assert!(!TransferOutcome::Aborted.is_success());
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = ChunkRequest {
            method: UploadMethod::Put,
            url: "http://host/a".into(),
            headers: vec![("Content-Range".into(), "bytes 0-0/1".into())],
            body: vec![0],
        };
        assert_eq!(req.header("content-range"), Some("bytes 0-0/1"));
        assert_eq!(req.header("X-File-Name"), None);
    }

    #[test]
    fn reqwest_transport_builds() {
        assert!(ReqwestTransport::new().is_ok());
    }
}
