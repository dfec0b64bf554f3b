//! HTTP response caching engine.
//!
//! Insertable into the middleware pipeline, the engine decides per
//! request/response pair whether a response may be cached, computes how
//! long it stays fresh, derives a variant key when responses differ by
//! negotiated headers, stores snapshots through a pluggable backend, and
//! replays stored snapshots without invoking the downstream producer.
//!
//! ## Layers, leaf-first
//!
//! - [`Directives`] — `Cache-Control` parsing (total, fail-to-zero).
//! - [`vary`] — per-header normalizers and variant key derivation.
//! - [`CachePolicy`] — cacheability and freshness rules.
//! - [`CacheKeyIndex`] — two-level key scheme over a [`StorageBackend`].
//! - [`CacheMiddleware`] — response capture and replay.
//!
//! ## Engine-managed headers
//!
//! | Header       | When                              |
//! |--------------|-----------------------------------|
//! | `X-Cache`    | `hit` or `miss`; absent when the response never participates |
//! | `X-Cache-Id` | whenever `X-Cache` is present     |
//! | `Age`        | hits only                         |
//! | `Expires`    | whenever cache-participating      |

pub mod backend;
pub mod directives;
pub mod index;
pub mod middleware;
pub mod policy;
pub mod vary;

pub use backend::{BackendError, BoxFuture, MemoryBackend, StorageBackend};
pub use directives::{Directive, Directives};
pub use index::{CacheEntry, CacheKeyIndex};
pub use middleware::{CacheMiddleware, Clock};
pub use policy::CachePolicy;
pub use vary::{Normalizer, VaryNegotiator};
