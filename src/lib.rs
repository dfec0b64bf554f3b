//! # cachet
//!
//! Server-side HTTP response caching middleware with `Vary`-aware variant
//! keys and pluggable storage backends.
//!
//! The cache sits in a middleware pipeline in front of any response
//! producer. It honors `Cache-Control` on both sides of the exchange,
//! derives freshness from `s-maxage`/`max-age`, partitions entries per
//! negotiated variant when the response declares `Vary`, and replays fresh
//! snapshots without invoking the producer.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use cachet::{Method, Request, Response, StatusCode};
//! use cachet::cache::{CacheMiddleware, MemoryBackend, vary};
//! use cachet::middleware::{MiddlewareHandler, Next, from_middleware};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let cache = Arc::new(
//!         CacheMiddleware::new(Arc::new(MemoryBackend::new()))
//!             .normalizer("accept-encoding", vary::exact(&["gzip"])),
//!     );
//!
//!     let producer: MiddlewareHandler = Arc::new(|_req: Request, _next: Next| {
//!         Box::pin(async {
//!             Response::new(StatusCode::Ok)
//!                 .header("Cache-Control", "public, max-age=60")
//!                 .body("Hello, World!")
//!         })
//!     });
//!
//!     let chain = vec![from_middleware(Arc::clone(&cache)), producer];
//!     let response = Next::new(chain.clone())
//!         .run(Request::new(Method::Get, "/"))
//!         .await;
//!     assert_eq!(response.headers().get("x-cache"), Some("miss"));
//!
//!     let response = Next::new(chain)
//!         .run(Request::new(Method::Get, "/"))
//!         .await;
//!     assert_eq!(response.headers().get("x-cache"), Some("hit"));
//! }
//! ```

pub mod cache;
pub mod http;
pub mod middleware;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{CacheMiddleware, MemoryBackend, StorageBackend};
pub use http::{Headers, Method, Request, Response, StatusCode};
