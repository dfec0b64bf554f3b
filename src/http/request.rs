//! In-memory HTTP request model.
//!
//! The cache engine consumes requests already decoded by the hosting
//! framework; this type carries exactly what the engine needs: the method,
//! the target (path plus raw query string), the header multimap, and the
//! body bytes.

use bytes::Bytes;

use super::{Headers, Method};

/// A decoded HTTP request.
///
/// Built fluently; the hosting framework constructs one per incoming
/// request and hands it to the middleware pipeline.
///
/// # Examples
///
/// ```
/// use cachet::http::{Method, Request};
///
/// let request = Request::new(Method::Get, "/articles")
///     .query("page=2")
///     .header("Accept-Encoding", "gzip, br");
///
/// assert_eq!(request.path(), "/articles");
/// assert_eq!(request.query_string(), Some("page=2"));
/// assert_eq!(request.headers().get("accept-encoding"), Some("gzip, br"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Creates a request with the given method and path, no query string,
    /// no headers, and an empty body.
    ///
    /// A path containing `?` is split into path and query, so
    /// `Request::new(Method::Get, "/a?b=1")` equals
    /// `Request::new(Method::Get, "/a").query("b=1")`.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let raw = path.into();
        let (path, query) = match raw.find('?') {
            Some(pos) => (raw[..pos].to_owned(), Some(raw[pos + 1..].to_owned())),
            None => (raw, None),
        };
        Self {
            method,
            path,
            query,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Sets the raw query string (without the leading `?`).
    #[must_use]
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Appends a request header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the request body from raw bytes.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the request body bytes.
    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }
}
