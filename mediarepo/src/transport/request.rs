//! Outgoing request description.
//!
//! A [`Request`] is assembled with [`RequestBuilder`] and is immutable once
//! built. Only `GET` is supported; the body is always empty.

use std::collections::BTreeMap;
use std::fmt;

/// HTTP method of a batched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// The only method this transport issues.
    Get,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
        }
    }
}

/// A single request submitted to a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    /// Header names are lowercased on insertion.
    headers: BTreeMap<String, String>,
}

impl Request {
    /// Start building a `GET` request for `url`.
    pub fn get(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            request: Request {
                method: Method::Get,
                url: url.into(),
                query: Vec::new(),
                headers: BTreeMap::new(),
            },
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Query parameters in insertion order.
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Look up a header by name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// All headers, keyed by lowercased name.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)?;
        for (i, (k, v)) in self.query.iter().enumerate() {
            let sep = if i == 0 && !self.url.contains('?') {
                '?'
            } else {
                '&'
            };
            write!(f, "{}{}={}", sep, k, v)?;
        }
        Ok(())
    }
}

/// Builder for [`Request`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Append a query parameter. Order is preserved.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.query.push((key.into(), value.into()));
        self
    }

    /// Set a header, replacing any previous value under the same
    /// case-insensitive name.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.request
            .headers
            .insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn build(self) -> Request {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_preserves_query_order() {
        let req = Request::get("https://example.org/w/api.php")
            .query("b", "2")
            .query("a", "1")
            .build();

        assert_eq!(
            req.query(),
            &[
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "1".to_string())
            ]
        );
        assert_eq!(req.method(), Method::Get);
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let req = Request::get("https://example.org")
            .header("User-Agent", "first")
            .header("user-agent", "second")
            .build();

        assert_eq!(req.headers().len(), 1);
        assert_eq!(req.header("USER-AGENT"), Some("second"));
    }

    #[test]
    fn test_display() {
        let req = Request::get("https://example.org/api")
            .query("action", "query")
            .query("format", "json")
            .build();
        assert_eq!(
            req.to_string(),
            "GET https://example.org/api?action=query&format=json"
        );
    }
}
