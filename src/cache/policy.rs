//! Cacheability and freshness policy.
//!
//! Decides whether a request/response pair may be stored, how long a
//! stored entry stays fresh, and derives the `Age` and `Expires` headers.
//! All time arithmetic uses whole unix seconds.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::http::{Method, Request, Response};

use super::directives::Directives;

/// Last unix second `httpdate::fmt_http_date` can format
/// (9999-12-31 23:59:59 UTC); later instants panic in the formatter.
const MAX_HTTP_DATE: u64 = 253_402_300_799;

/// Cacheability rules for one cache instance.
///
/// Defaults: only `GET` responses are cacheable, and a request carrying an
/// `Authorization` header is only cached when the response explicitly
/// declares `public`.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    cacheable_methods: Vec<Method>,
    credential_headers: Vec<String>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            cacheable_methods: vec![Method::Get],
            credential_headers: vec!["authorization".to_owned()],
        }
    }
}

impl CachePolicy {
    /// Creates a policy with the default method set and credential headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a request header name whose presence requires the response to
    /// declare `public` before it may be cached.
    pub fn add_credential_header(&mut self, name: impl Into<String>) {
        self.credential_headers
            .push(name.into().to_ascii_lowercase());
    }

    /// Replaces the set of methods whose responses may be cached.
    pub fn set_cacheable_methods(&mut self, methods: Vec<Method>) {
        self.cacheable_methods = methods;
    }

    /// Returns `true` when the request itself permits cache participation:
    /// the method is cacheable and the request does not say `no-store`.
    ///
    /// A `false` here means the cache skips lookup *and* store — the
    /// request is handled as a fully transparent passthrough.
    pub fn request_cacheable(&self, request: &Request) -> bool {
        if !self.cacheable_methods.contains(request.method()) {
            return false;
        }
        !Self::request_directives(request).contains("no-store")
    }

    /// Returns `true` when the buffered response may be stored for this request.
    ///
    /// A response is not cacheable when any of the following holds:
    /// the request is not cacheable (see [`request_cacheable`](Self::request_cacheable));
    /// the response carries no `Cache-Control` header at all;
    /// the response says `no-store` or `private`;
    /// a credential header is present on the request and the response does
    /// not declare `public`.
    pub fn cacheable(&self, request: &Request, response: &Response) -> bool {
        if !self.request_cacheable(request) {
            return false;
        }

        let Some(header) = response.headers().get("cache-control") else {
            return false;
        };
        let directives = Directives::parse(header);
        if directives.contains("no-store") || directives.contains("private") {
            return false;
        }

        let has_credentials = self
            .credential_headers
            .iter()
            .any(|name| request.headers().contains(name));
        if has_credentials && !directives.contains("public") {
            return false;
        }

        true
    }

    /// Computes the freshness lifetime in seconds from response directives:
    /// `s-maxage` if present, else `max-age`, else `0`. `s-maxage` wins
    /// regardless of relative magnitude.
    pub fn freshness_lifetime(directives: &Directives) -> u64 {
        directives
            .seconds("s-maxage")
            .or_else(|| directives.seconds("max-age"))
            .unwrap_or(0)
    }

    /// Returns `true` when an entry stored at `stored_at` with the given
    /// lifetime is still fresh at `now`, honoring a tighter `max-age` the
    /// request may impose.
    pub fn is_fresh(stored_at: u64, lifetime: u64, now: u64, request: &Request) -> bool {
        let age = now.saturating_sub(stored_at);
        let effective = match Self::request_directives(request).seconds("max-age") {
            Some(client_max_age) => lifetime.min(client_max_age),
            None => lifetime,
        };
        age < effective
    }

    /// The `Age` header value for a hit: seconds since store, never negative.
    pub fn age(stored_at: u64, now: u64) -> u64 {
        now.saturating_sub(stored_at)
    }

    /// The `Expires` header value: `stored_at + lifetime` as an IMF-fixdate.
    /// Saturates at the last second the formatter can represent, so an
    /// arbitrarily large `max-age` still yields a valid date.
    pub fn expires(stored_at: u64, lifetime: u64) -> String {
        let expires_at = stored_at.saturating_add(lifetime).min(MAX_HTTP_DATE);
        httpdate::fmt_http_date(UNIX_EPOCH + Duration::from_secs(expires_at))
    }

    /// Current unix time in whole seconds.
    pub fn now_unix() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    fn request_directives(request: &Request) -> Directives {
        Directives::parse(request.headers().get("cache-control").unwrap_or(""))
    }
}
