//! Response capture/replay middleware.
//!
//! [`CacheMiddleware`] wraps the downstream producer for each request:
//! a fresh stored entry short-circuits the chain and is replayed with
//! `X-Cache: hit`; otherwise the produced response is buffered, evaluated
//! for cacheability, stored when eligible, and decorated with
//! `X-Cache: miss`. Responses that never participate in caching pass
//! through untouched — no engine headers at all.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::http::{Request, Response, StatusCode};
use crate::middleware::{Middleware, Next};

use super::backend::StorageBackend;
use super::directives::Directives;
use super::index::{CacheEntry, CacheKeyIndex};
use super::policy::CachePolicy;
use super::vary::{Normalizer, VaryNegotiator};

/// Injectable time source returning whole unix seconds. Production uses the
/// system clock; tests substitute a controlled one.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Bodies above this size are delivered uncached (passthrough).
const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Caching middleware over a pluggable [`StorageBackend`].
///
/// Configured fluently, one independently configured instance per cache:
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use cachet::cache::{CacheMiddleware, MemoryBackend, vary};
///
/// let cache = CacheMiddleware::new(Arc::new(MemoryBackend::new()))
///     .normalizer("accept-encoding", vary::exact(&["gzip"]))
///     .credential_header("X-Api-Key");
/// ```
pub struct CacheMiddleware {
    index: CacheKeyIndex,
    policy: CachePolicy,
    clock: Clock,
    max_body_bytes: usize,
    // One in-flight lock per primary key, shared across requests.
    inflight: Arc<StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl CacheMiddleware {
    /// Creates a cache over the given backend with default policy:
    /// GET-only, `Authorization` as the credential header, no normalizers,
    /// 8 MiB body cap, system clock.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            index: CacheKeyIndex::new(backend, VaryNegotiator::new()),
            policy: CachePolicy::new(),
            clock: Arc::new(CachePolicy::now_unix),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            inflight: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Registers a normalizer for a `Vary` header name.
    #[must_use]
    pub fn normalizer(mut self, header: impl Into<String>, normalizer: Normalizer) -> Self {
        self.index.register_normalizer(header, normalizer);
        self
    }

    /// Adds a credential header name (on top of the `Authorization` default)
    /// whose presence requires an explicit `public` directive.
    #[must_use]
    pub fn credential_header(mut self, name: impl Into<String>) -> Self {
        self.policy.add_credential_header(name);
        self
    }

    /// Replaces the set of request methods eligible for caching.
    #[must_use]
    pub fn cacheable_methods(mut self, methods: Vec<crate::http::Method>) -> Self {
        self.policy.set_cacheable_methods(methods);
        self
    }

    /// Sets the maximum body size stored; larger responses pass through uncached.
    #[must_use]
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Replaces the time source. Intended for tests.
    #[must_use]
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn acquire(&self, primary: &str) -> InflightSlot {
        let lock = self
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(primary.to_owned())
            .or_default()
            .clone();
        InflightSlot {
            registry: Arc::clone(&self.inflight),
            key: primary.to_owned(),
            lock,
        }
    }
}

/// One request's handle on the per-primary-key single-flight lock.
///
/// Dropping the slot (on success, producer failure, or cancellation)
/// removes the registry entry once no other request is in flight on the
/// same key.
struct InflightSlot {
    registry: Arc<StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
    key: String,
    lock: Arc<AsyncMutex<()>>,
}

impl InflightSlot {
    fn mutex(&self) -> &AsyncMutex<()> {
        &self.lock
    }
}

impl Drop for InflightSlot {
    fn drop(&mut self) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = registry.get(&self.key) {
            // Held by the registry and this slot only: last one out.
            if Arc::strong_count(lock) <= 2 {
                registry.remove(&self.key);
            }
        }
    }
}

/// Synthesizes the outgoing response for a hit from a stored entry.
/// Returns `None` when the entry's status code cannot be modeled, in which
/// case the caller falls back to the producer.
fn replay(entry: CacheEntry, now: u64) -> Option<Response> {
    let Some(status) = StatusCode::from_u16(entry.status) else {
        warn!(status = entry.status, "stored entry has unknown status code — treating as miss");
        return None;
    };

    let mut response = Response::new(status).body_raw(entry.body);
    for (name, value) in entry.headers {
        response.add_header(name, value);
    }
    response.set_header("Age", CachePolicy::age(entry.stored_at, now).to_string());
    response.set_header(
        "Expires",
        CachePolicy::expires(entry.stored_at, entry.freshness_lifetime),
    );
    response.set_header("X-Cache", "hit");
    response.set_header("X-Cache-Id", entry.cache_id);
    Some(response)
}

impl Middleware for CacheMiddleware {
    fn handle(&self, req: Request, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let index = self.index.clone();
        let policy = self.policy.clone();
        let clock = Arc::clone(&self.clock);
        let max_body_bytes = self.max_body_bytes;
        let primary = CacheKeyIndex::primary_key(&req);
        let slot = self.acquire(&primary);

        Box::pin(async move {
            // Non-cacheable requests skip lookup entirely and pass through.
            if !policy.request_cacheable(&req) {
                return next.run(req).await;
            }

            let now = clock();
            if let Some(entry) = index.lookup(&req, now).await {
                if let Some(response) = replay(entry, now) {
                    debug!(key = %primary, "cache hit");
                    return response;
                }
            }

            // Miss: serialize producer invocation and store per primary key
            // so concurrent identical requests do the upstream work once.
            // Both the lock guard and the registry slot release by drop on
            // every exit path, including producer panic or cancellation.
            let guard = slot.mutex().lock().await;

            // A concurrent winner may have populated the cache while we waited.
            let now = clock();
            if let Some(entry) = index.lookup(&req, now).await {
                if let Some(response) = replay(entry, now) {
                    debug!(key = %primary, "cache hit after single-flight wait");
                    return response;
                }
            }

            // Buffer the full response: cacheability is only decidable once
            // the producer's Cache-Control is known, and storage must capture
            // status, headers, and body atomically.
            let buffered = next.run(req.clone()).await;

            let response = if !policy.cacheable(&req, &buffered) {
                buffered
            } else if buffered.body_bytes().len() > max_body_bytes {
                debug!(key = %primary, size = buffered.body_bytes().len(), "body over cache limit — passthrough");
                buffered
            } else {
                let now = clock();
                let directives =
                    Directives::parse(buffered.headers().get("cache-control").unwrap_or(""));
                let lifetime = CachePolicy::freshness_lifetime(&directives);
                match index.store(&req, &buffered, now, lifetime).await {
                    Some(entry) => {
                        let mut decorated = buffered;
                        decorated.set_header("Expires", CachePolicy::expires(now, lifetime));
                        decorated.set_header("X-Cache", "miss");
                        decorated.set_header("X-Cache-Id", entry.cache_id);
                        decorated
                    }
                    // Write failed and was swallowed; deliver uncached.
                    None => buffered,
                }
            };

            drop(guard);
            response
        })
    }
}
