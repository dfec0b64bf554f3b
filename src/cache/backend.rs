//! Pluggable storage backends.
//!
//! The cache stores opaque byte blobs under string keys through the
//! [`StorageBackend`] trait — two operations, no delete and no TTL, because
//! all expiry is recomputed by the engine from the stored timestamps.
//! An in-process [`MemoryBackend`] ships with the crate; remote stores
//! (e.g. a Redis client) implement the same two methods.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::RwLock;

/// Boxed future returned by backend operations, detached from the backend's
/// lifetime so implementations clone their handles into the future.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Failure reported by a storage backend.
///
/// Backend failures never surface to the caller of the cache: a failed read
/// degrades to a miss, a failed write leaves the response uncached.
#[derive(Debug, Error)]
#[error("storage backend failure: {message}")]
pub struct BackendError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl BackendError {
    /// Creates an error from a plain message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error wrapping an underlying driver error.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Abstract key/value storage used by the cache.
///
/// Both operations may suspend (the backend may be network-bound). Each
/// write is atomic per key; the engine never requires cross-key atomicity.
///
/// # Implementing a remote backend
///
/// ```rust,ignore
/// struct RedisBackend { client: redis::Client }
///
/// impl StorageBackend for RedisBackend {
///     fn get(&self, key: &str) -> BoxFuture<Result<Option<Bytes>, BackendError>> {
///         let client = self.client.clone();
///         let key = key.to_owned();
///         Box::pin(async move {
///             client.get(&key).await
///                 .map_err(|e| BackendError::with_source("redis GET", e))
///         })
///     }
///
///     fn set(&self, key: &str, value: Bytes) -> BoxFuture<Result<(), BackendError>> {
///         let client = self.client.clone();
///         let key = key.to_owned();
///         Box::pin(async move {
///             client.set(&key, value).await
///                 .map_err(|e| BackendError::with_source("redis SET", e))
///         })
///     }
/// }
/// ```
pub trait StorageBackend: Send + Sync {
    /// Fetches the blob stored under `key`, or `None` when absent.
    fn get(&self, key: &str) -> BoxFuture<Result<Option<Bytes>, BackendError>>;

    /// Stores `value` under `key`, overwriting any previous blob.
    fn set(&self, key: &str, value: Bytes) -> BoxFuture<Result<(), BackendError>>;
}

/// In-process backend over a guarded hash map.
///
/// Entries live for the lifetime of the process and are cleared on restart.
/// Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryBackend {
    /// Creates an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys. Useful in tests.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` when no keys are stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> BoxFuture<Result<Option<Bytes>, BackendError>> {
        let entries = Arc::clone(&self.entries);
        let key = key.to_owned();
        Box::pin(async move { Ok(entries.read().await.get(&key).cloned()) })
    }

    fn set(&self, key: &str, value: Bytes) -> BoxFuture<Result<(), BackendError>> {
        let entries = Arc::clone(&self.entries);
        let key = key.to_owned();
        Box::pin(async move {
            entries.write().await.insert(key, value);
            Ok(())
        })
    }
}
