//! Proxy request handle.

use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Readable request body.
pub type BodyStream = Box<dyn AsyncRead + Send + Unpin>;

/// A request as handed to modifiers by the proxy.
///
/// Header names are stored lower-cased. The body is a stream that a
/// modifier may consume and replace.
pub struct ProxyRequest {
    /// HTTP method
    pub method: String,
    /// Request path (without query string)
    pub path: String,
    /// Raw query string (without leading ?)
    pub query_string: Option<String>,
    /// Request headers
    pub headers: HashMap<String, Vec<String>>,
    body: BodyStream,
}

impl ProxyRequest {
    /// Create a request with an empty body.
    ///
    /// `uri` may be a bare path or an absolute URL; everything after the
    /// first `?` becomes the query string.
    pub fn new(method: impl Into<String>, uri: &str) -> Self {
        let (path, query_string) = match uri.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (uri.to_string(), None),
        };

        Self {
            method: method.into(),
            path,
            query_string,
            headers: HashMap::new(),
            body: Box::new(tokio::io::empty()),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.to_lowercase())
            .or_default()
            .push(value.into());
        self
    }

    /// Set a fully buffered body and its `content-length`.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.replace_body(body.into());
        self
    }

    /// Set a streaming body. Headers are left as they are.
    pub fn with_body_stream(mut self, stream: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.set_body_stream(stream);
        self
    }

    /// Path and query string recombined.
    pub fn uri(&self) -> String {
        match &self.query_string {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    /// Get a single header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }

    /// Replace all values of a header.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_lowercase(), vec![value.into()]);
    }

    /// Take the body stream, leaving an empty one in its place.
    pub fn take_body(&mut self) -> BodyStream {
        std::mem::replace(&mut self.body, Box::new(tokio::io::empty()))
    }

    /// Swap in a new body stream without touching headers.
    pub fn set_body_stream(&mut self, stream: impl AsyncRead + Send + Unpin + 'static) {
        self.body = Box::new(stream);
    }

    /// Replace the body with new bytes and update `content-length`.
    pub fn replace_body(&mut self, body: Vec<u8>) {
        self.set_header("content-length", body.len().to_string());
        self.set_body_stream(Cursor::new(body));
    }

    /// Read the remaining body to the end.
    pub async fn read_body(&mut self) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.body.read_to_end(&mut buf).await?;
        Ok(buf)
    }
}

impl fmt::Debug for ProxyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query_string", &self.query_string)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
