//! Terminal result of one batched request.

use std::collections::BTreeMap;

use bytes::Bytes;
use reqwest::header::HeaderMap;

/// Status code recorded when the request never produced an HTTP response.
pub const TRANSPORT_FAILURE_CODE: u16 = 0;

/// Case-insensitive response headers.
///
/// Repeated headers are folded into one entry joined with `", "`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    entries: BTreeMap<String, String>,
}

impl ResponseHeaders {
    /// Fold a header block into a case-insensitive map.
    ///
    /// Only the block handed in is kept, so when the client followed
    /// redirects the intermediate hops' headers never appear here.
    pub fn from_header_map(map: &HeaderMap) -> Self {
        let mut entries: BTreeMap<String, String> = BTreeMap::new();
        for name in map.keys() {
            let joined = map
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(", ");
            entries.insert(name.as_str().to_ascii_lowercase(), joined);
        }
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Result of one request in a batch.
///
/// Exactly one `Response` is produced per submitted request, at the same
/// index. The transport never interprets status codes: a 404 is returned
/// with `code = 404` just like a 200.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// HTTP status, or [`TRANSPORT_FAILURE_CODE`] if no response arrived.
    pub code: u16,
    pub reason: String,
    pub headers: ResponseHeaders,
    pub body: Bytes,
    /// Transport error text. Empty unless `code` is 0.
    pub error: String,
}

impl Response {
    /// A response for a request that failed below HTTP (DNS, connect,
    /// timeout, body read).
    pub fn transport_failure(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            code: TRANSPORT_FAILURE_CODE,
            reason: String::new(),
            headers: ResponseHeaders::default(),
            body: Bytes::new(),
            error: if error.is_empty() {
                "unknown transport error".to_string()
            } else {
                error
            },
        }
    }

    /// True for a 2xx status with no transport error.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code) && self.error.is_empty()
    }

    pub fn is_transport_failure(&self) -> bool {
        self.code == TRANSPORT_FAILURE_CODE
    }

    /// Short human readable summary for logs.
    pub fn status_line(&self) -> String {
        if self.is_transport_failure() {
            format!("transport error: {}", self.error)
        } else {
            format!("{} {}", self.code, self.reason)
        }
    }
}
