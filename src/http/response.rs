//! In-memory HTTP response model.
//!
//! Provides a fluent builder API for constructing responses and in-place
//! header mutation for middleware pipelines that decorate a downstream
//! response before it is handed back to the host.

use bytes::Bytes;

use super::{Headers, StatusCode};

/// An HTTP response as seen by the middleware pipeline.
///
/// # Examples
///
/// ```
/// use cachet::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Cache-Control", "public, max-age=60")
///     .body("Hello, World!");
///
/// assert_eq!(response.status(), StatusCode::Ok);
/// assert_eq!(response.body_bytes().as_ref(), b"Hello, World!");
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a header in-place. Intended for middleware pipelines that receive
    /// a `Response` from downstream and need to decorate it without consuming it.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Sets a header in-place, replacing any existing values for that name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Sets the response body from a string.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Bytes::from(body.into());
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_raw(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the response body bytes.
    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_status_and_body() {
        let r = Response::new(StatusCode::Created).body("made");
        assert_eq!(r.status(), StatusCode::Created);
        assert_eq!(r.body_bytes().as_ref(), b"made");
    }

    #[test]
    fn add_header_is_additive() {
        let mut r = Response::new(StatusCode::Ok).header("Vary", "Accept-Encoding");
        r.add_header("Vary", "User-Agent");
        let vals: Vec<_> = r.headers().get_all("vary").collect();
        assert_eq!(vals, vec!["Accept-Encoding", "User-Agent"]);
    }

    #[test]
    fn set_header_replaces() {
        let mut r = Response::new(StatusCode::Ok).header("Age", "30");
        r.set_header("Age", "0");
        let vals: Vec<_> = r.headers().get_all("age").collect();
        assert_eq!(vals, vec!["0"]);
    }

    #[test]
    fn raw_body() {
        let r = Response::new(StatusCode::Ok).body_raw(vec![0u8, 159, 146, 150]);
        assert_eq!(r.body_bytes().len(), 4);
    }
}
