//! Two-level cache key scheme and stored records.
//!
//! Every resource has one *variant index* record keyed by its primary
//! identity (method + path + query) holding the header names it varies on,
//! and one *cache entry* record per variant. Lookup resolves the index
//! first, derives the variant key from the current request, then fetches
//! the entry. Stale and dangling records are simply misses — nothing is
//! ever deleted; the next store overwrites both records.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::http::{Request, Response};

use super::backend::StorageBackend;
use super::policy::CachePolicy;
use super::vary::VaryNegotiator;

/// Headers written by the engine itself, excluded from stored entries so a
/// replay never carries a stale copy of them.
const ENGINE_HEADERS: &[&str] = &["x-cache", "x-cache-id", "age", "expires"];

/// Per-resource record of the header names the resource varies on.
/// Overwritten on every store; an empty list is still written so that a
/// store always performs exactly two backend writes.
#[derive(Debug, Serialize, Deserialize)]
struct VariantIndex {
    vary: Vec<String>,
}

/// One stored response snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Response status code.
    pub status: u16,
    /// Response headers minus the engine-managed names.
    pub headers: Vec<(String, String)>,
    /// Response body bytes.
    pub body: Vec<u8>,
    /// Unix seconds at store time.
    pub stored_at: u64,
    /// Freshness lifetime in seconds, fixed at store time.
    pub freshness_lifetime: u64,
    /// Opaque token regenerated on every store, stable across hits.
    pub cache_id: String,
}

/// Orchestrates the primary/variant key scheme over a [`StorageBackend`].
#[derive(Clone)]
pub struct CacheKeyIndex {
    backend: Arc<dyn StorageBackend>,
    negotiator: VaryNegotiator,
}

impl CacheKeyIndex {
    /// Creates an index over the given backend and negotiator.
    pub fn new(backend: Arc<dyn StorageBackend>, negotiator: VaryNegotiator) -> Self {
        Self {
            backend,
            negotiator,
        }
    }

    /// Registers a normalizer on the underlying negotiator.
    pub fn register_normalizer(&mut self, header: impl Into<String>, normalizer: super::vary::Normalizer) {
        self.negotiator.register(header, normalizer);
    }

    /// The primary identity of a request: method, path, and raw query
    /// string — independent of any variant headers.
    pub fn primary_key(request: &Request) -> String {
        match request.query_string() {
            Some(query) => format!("{} {}?{}", request.method(), request.path(), query),
            None => format!("{} {}", request.method(), request.path()),
        }
    }

    fn index_key(primary: &str) -> String {
        format!("cachet:v:{primary}")
    }

    fn entry_key(primary: &str, secondary: &str) -> String {
        // The newline separator cannot occur inside a primary key.
        format!("cachet:e:{primary}\n{secondary}")
    }

    /// Looks up a fresh entry for the request, or `None` on any kind of
    /// miss: no variant index, no entry for this variant, a stale entry, or
    /// a backend/decoding failure (the cache fails open).
    pub async fn lookup(&self, request: &Request, now: u64) -> Option<CacheEntry> {
        let primary = Self::primary_key(request);

        let index_blob = self.read(&Self::index_key(&primary)).await?;
        let index: VariantIndex = match serde_json::from_slice(&index_blob) {
            Ok(index) => index,
            Err(error) => {
                warn!(key = %primary, %error, "undecodable variant index — treating as miss");
                return None;
            }
        };

        let secondary = self.negotiator.variant_key(&index.vary, request.headers());
        let entry_blob = self.read(&Self::entry_key(&primary, &secondary)).await?;
        let entry: CacheEntry = match serde_json::from_slice(&entry_blob) {
            Ok(entry) => entry,
            Err(error) => {
                warn!(key = %primary, %error, "undecodable cache entry — treating as miss");
                return None;
            }
        };

        if CachePolicy::is_fresh(entry.stored_at, entry.freshness_lifetime, now, request) {
            Some(entry)
        } else {
            debug!(key = %primary, age = now.saturating_sub(entry.stored_at), "stale entry — miss");
            None
        }
    }

    /// Stores a response snapshot for the request with a freshly generated
    /// cache id, overwriting the variant index and the entry for this
    /// variant (exactly two backend writes).
    ///
    /// Returns the stored entry, or `None` when a backend write failed —
    /// the failure is logged and swallowed so response delivery never
    /// depends on cache-store success.
    pub async fn store(
        &self,
        request: &Request,
        response: &Response,
        now: u64,
        freshness_lifetime: u64,
    ) -> Option<CacheEntry> {
        let primary = Self::primary_key(request);

        // Multiple Vary headers are additive, per RFC 9110 §5.3.
        let vary_header = response
            .headers()
            .get_all("vary")
            .collect::<Vec<_>>()
            .join(",");
        let vary = VaryNegotiator::parse_vary(&vary_header);
        let secondary = self.negotiator.variant_key(&vary, request.headers());

        let entry = CacheEntry {
            status: response.status().as_u16(),
            headers: response
                .headers()
                .iter()
                .filter(|(name, _)| !ENGINE_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)))
                .map(|(name, value)| (name.to_owned(), value.to_owned()))
                .collect(),
            body: response.body_bytes().to_vec(),
            stored_at: now,
            freshness_lifetime,
            cache_id: Uuid::new_v4().to_string(),
        };

        let index_blob = match serde_json::to_vec(&VariantIndex { vary }) {
            Ok(blob) => blob,
            Err(error) => {
                warn!(key = %primary, %error, "failed to encode variant index");
                return None;
            }
        };
        let entry_blob = match serde_json::to_vec(&entry) {
            Ok(blob) => blob,
            Err(error) => {
                warn!(key = %primary, %error, "failed to encode cache entry");
                return None;
            }
        };

        self.write(&Self::index_key(&primary), Bytes::from(index_blob))
            .await?;
        self.write(
            &Self::entry_key(&primary, &secondary),
            Bytes::from(entry_blob),
        )
        .await?;

        debug!(key = %primary, cache_id = %entry.cache_id, "stored cache entry");
        Some(entry)
    }

    async fn read(&self, key: &str) -> Option<Bytes> {
        match self.backend.get(key).await {
            Ok(found) => found,
            Err(error) => {
                warn!(%error, "backend read failed — treating as miss");
                None
            }
        }
    }

    async fn write(&self, key: &str, blob: Bytes) -> Option<()> {
        match self.backend.set(key, blob).await {
            Ok(()) => Some(()),
            Err(error) => {
                warn!(%error, "backend write failed — response will not be cached");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cache::backend::{BackendError, BoxFuture, MemoryBackend};
    use crate::cache::vary;
    use crate::http::{Method, StatusCode};

    /// Wraps a backend, counting writes and optionally failing them.
    struct Instrumented {
        inner: MemoryBackend,
        writes: Arc<AtomicUsize>,
        fail_writes: bool,
    }

    impl StorageBackend for Instrumented {
        fn get(&self, key: &str) -> BoxFuture<Result<Option<Bytes>, BackendError>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: Bytes) -> BoxFuture<Result<(), BackendError>> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes {
                return Box::pin(async { Err(BackendError::message("write refused")) });
            }
            self.inner.set(key, value)
        }
    }

    /// Backend whose reads always fail; writes succeed but go nowhere.
    struct FailingReads;

    impl StorageBackend for FailingReads {
        fn get(&self, _key: &str) -> BoxFuture<Result<Option<Bytes>, BackendError>> {
            Box::pin(async { Err(BackendError::message("connection reset")) })
        }

        fn set(&self, _key: &str, _value: Bytes) -> BoxFuture<Result<(), BackendError>> {
            Box::pin(async { Ok(()) })
        }
    }

    /// Collects formatted log output for assertion.
    #[derive(Clone, Default)]
    struct CaptureWriter(Arc<std::sync::Mutex<Vec<u8>>>);

    impl CaptureWriter {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CaptureWriter {
        type Writer = CaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn index_over(backend: Arc<dyn StorageBackend>) -> CacheKeyIndex {
        CacheKeyIndex::new(backend, VaryNegotiator::new())
    }

    fn cacheable_response() -> Response {
        Response::new(StatusCode::Ok)
            .header("Cache-Control", "public, max-age=60")
            .body("payload")
    }

    #[test]
    fn primary_key_includes_query() {
        let req = Request::new(Method::Get, "/things").query("page=2");
        assert_eq!(CacheKeyIndex::primary_key(&req), "GET /things?page=2");
        let req = Request::new(Method::Get, "/things");
        assert_eq!(CacheKeyIndex::primary_key(&req), "GET /things");
    }

    #[test]
    fn primary_key_ignores_variant_headers() {
        let a = Request::new(Method::Get, "/r").header("Accept-Encoding", "gzip");
        let b = Request::new(Method::Get, "/r").header("Accept-Encoding", "br");
        assert_eq!(CacheKeyIndex::primary_key(&a), CacheKeyIndex::primary_key(&b));
    }

    #[tokio::test]
    async fn store_performs_exactly_two_writes() {
        let writes = Arc::new(AtomicUsize::new(0));
        let backend = Arc::new(Instrumented {
            inner: MemoryBackend::new(),
            writes: Arc::clone(&writes),
            fail_writes: false,
        });
        let index = index_over(backend);

        let req = Request::new(Method::Get, "/");
        index
            .store(&req, &cacheable_response(), 1000, 60)
            .await
            .unwrap();
        assert_eq!(writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn lookup_roundtrip() {
        let index = index_over(Arc::new(MemoryBackend::new()));
        let req = Request::new(Method::Get, "/");

        assert!(index.lookup(&req, 1000).await.is_none());

        let stored = index
            .store(&req, &cacheable_response(), 1000, 60)
            .await
            .unwrap();
        let found = index.lookup(&req, 1030).await.unwrap();
        assert_eq!(found.cache_id, stored.cache_id);
        assert_eq!(found.status, 200);
        assert_eq!(found.body, b"payload");
        assert_eq!(found.stored_at, 1000);
        assert_eq!(found.freshness_lifetime, 60);
    }

    #[tokio::test]
    async fn stale_entry_is_a_miss_not_a_delete() {
        let backend = Arc::new(MemoryBackend::new());
        let index = index_over(backend.clone());
        let req = Request::new(Method::Get, "/");

        index
            .store(&req, &cacheable_response(), 1000, 60)
            .await
            .unwrap();
        assert!(index.lookup(&req, 1060).await.is_none());
        // both records are still present in the backend
        assert_eq!(backend.len().await, 2);
    }

    #[tokio::test]
    async fn vary_partitions_entries() {
        let mut negotiator = VaryNegotiator::new();
        negotiator.register("accept-encoding", vary::exact(&["gzip"]));
        let backend = Arc::new(MemoryBackend::new());
        let index = CacheKeyIndex::new(backend, negotiator);

        let gzip = Request::new(Method::Get, "/data").header("Accept-Encoding", "gzip");
        let resp = cacheable_response().header("Vary", "Accept-Encoding");
        let stored = index.store(&gzip, &resp, 1000, 60).await.unwrap();

        // gzip, br normalizes to gzip — same variant
        let gzip_br = Request::new(Method::Get, "/data").header("Accept-Encoding", "gzip, br");
        let found = index.lookup(&gzip_br, 1000).await.unwrap();
        assert_eq!(found.cache_id, stored.cache_id);

        // br, zstd normalizes to no-match — independent variant, miss
        let other = Request::new(Method::Get, "/data").header("Accept-Encoding", "br, zstd");
        assert!(index.lookup(&other, 1000).await.is_none());
    }

    #[tokio::test]
    async fn store_regenerates_cache_id() {
        let index = index_over(Arc::new(MemoryBackend::new()));
        let req = Request::new(Method::Get, "/");
        let resp = cacheable_response();

        let first = index.store(&req, &resp, 1000, 60).await.unwrap();
        let second = index.store(&req, &resp, 1061, 60).await.unwrap();
        assert_ne!(first.cache_id, second.cache_id);
    }

    #[tokio::test]
    async fn engine_headers_are_not_stored() {
        let index = index_over(Arc::new(MemoryBackend::new()));
        let req = Request::new(Method::Get, "/");
        let resp = cacheable_response()
            .header("X-Cache", "miss")
            .header("Expires", "whenever")
            .header("Content-Type", "text/plain");

        let stored = index.store(&req, &resp, 1000, 60).await.unwrap();
        let names: Vec<&str> = stored.headers.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"Content-Type"));
        assert!(names.contains(&"Cache-Control"));
        assert!(!names.iter().any(|n| n.eq_ignore_ascii_case("x-cache")));
        assert!(!names.iter().any(|n| n.eq_ignore_ascii_case("expires")));
    }

    #[tokio::test]
    async fn dangling_index_self_heals_as_miss() {
        let backend = Arc::new(MemoryBackend::new());
        let index = index_over(backend.clone());

        // Index record present, entry record missing.
        backend
            .set("cachet:v:GET /", Bytes::from(r#"{"vary":[]}"#))
            .await
            .unwrap();
        let req = Request::new(Method::Get, "/");
        assert!(index.lookup(&req, 1000).await.is_none());
    }

    #[tokio::test]
    async fn corrupt_records_are_misses() {
        let backend = Arc::new(MemoryBackend::new());
        let index = index_over(backend.clone());
        let req = Request::new(Method::Get, "/");

        backend
            .set("cachet:v:GET /", Bytes::from_static(b"not json"))
            .await
            .unwrap();
        assert!(index.lookup(&req, 1000).await.is_none());
    }

    #[tokio::test]
    async fn failed_reads_warn_and_miss() {
        use tracing::instrument::WithSubscriber;

        let writer = CaptureWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer.clone())
            .with_ansi(false)
            .finish();

        let index = index_over(Arc::new(FailingReads));
        let req = Request::new(Method::Get, "/");
        let found = index.lookup(&req, 1000).with_subscriber(subscriber).await;

        assert!(found.is_none());
        let logs = writer.contents();
        assert!(logs.contains("WARN"), "no warning emitted: {logs}");
        assert!(logs.contains("backend read failed"), "unexpected log: {logs}");
        assert!(logs.contains("connection reset"), "unexpected log: {logs}");
    }

    #[tokio::test]
    async fn failed_writes_are_swallowed() {
        let backend = Arc::new(Instrumented {
            inner: MemoryBackend::new(),
            writes: Arc::new(AtomicUsize::new(0)),
            fail_writes: true,
        });
        let index = index_over(backend);
        let req = Request::new(Method::Get, "/");
        assert!(index
            .store(&req, &cacheable_response(), 1000, 60)
            .await
            .is_none());
    }
}
