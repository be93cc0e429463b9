//! Listing cache for formatted product lists.
//!
//! Memoizes the product-list-to-item-record transformation per listing view.
//! Entries live in shared storage (Redis) so every worker sees the same
//! state, expire after a short TTL, and are all dropped whenever any product
//! changes.
//!
//! A cache outage never fails a request: reads fall through to the compute
//! function and writes are skipped.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use datalayer_core::{CacheStore, Error, ItemRecord, Listing, Result};

/// Key prefix shared by every listing entry.
pub const LIST_CACHE_PREFIX: &str = "dl:list:";

// =============================================================================
// STORES
// =============================================================================

/// Redis-backed cache store.
///
/// `ConnectionManager` multiplexes one connection; each call works on its
/// own clone of the handle.
#[derive(Clone)]
pub struct RedisCacheStore {
    connection: ConnectionManager,
}

impl RedisCacheStore {
    /// Connect to Redis; fails when the URL is invalid or unreachable.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| Error::Cache(e.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Cache(e.to_string()))?;
        Ok(Self {
            connection: manager,
        })
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| Error::Cache(e.to_string()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| Error::Cache(e.to_string()))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let mut conn = self.connection.clone();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{}*", prefix))
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Cache(e.to_string()))?;
        if keys.is_empty() {
            return Ok(0);
        }
        conn.del::<_, ()>(&keys[..])
            .await
            .map_err(|e| Error::Cache(e.to_string()))?;
        Ok(keys.len() as u64)
    }
}

/// Process-local cache store with TTL expiry, for tests and single-worker setups.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Cache("memory cache lock poisoned".to_string()))
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries()?;
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries()?
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let mut entries = self.entries()?;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }
}

// =============================================================================
// LIST CACHE
// =============================================================================

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

/// Listing cache over a shared [`CacheStore`].
#[derive(Clone)]
pub struct ListCache {
    store: Option<Arc<dyn CacheStore>>,
    ttl: Duration,
    counters: Arc<Counters>,
}

impl ListCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            store: Some(store),
            ttl,
            counters: Arc::new(Counters::default()),
        }
    }

    /// A cache that always computes.
    pub fn disabled() -> Self {
        Self {
            store: None,
            ttl: Duration::ZERO,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Connect to Redis when enabled; degrade to a disabled cache otherwise.
    pub async fn connect(redis_enabled: bool, redis_url: &str, ttl: Duration) -> Self {
        if !redis_enabled {
            info!(subsystem = "cache", "List cache disabled via REDIS_ENABLED=false");
            return Self::disabled();
        }
        match RedisCacheStore::connect(redis_url).await {
            Ok(store) => {
                info!(
                    subsystem = "cache",
                    component = "list_cache",
                    ttl_secs = ttl.as_secs(),
                    "Redis list cache enabled"
                );
                Self::new(Arc::new(store), ttl)
            }
            Err(e) => {
                warn!(subsystem = "cache", error = %e, "Failed to connect to Redis, list cache disabled");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fingerprint of a listing view in a given currency.
    pub fn cache_key(listing: &Listing, currency: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(listing.kind.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(listing.slug.to_lowercase().trim().as_bytes());
        hasher.update(b"\0");
        hasher.update(listing.page.to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(currency.as_bytes());
        let hash = hex::encode(hasher.finalize());
        format!("{}{}", LIST_CACHE_PREFIX, &hash[..16])
    }

    /// Return the cached items for `key`, computing and storing them on a miss.
    ///
    /// `ttl` overrides the cache default when given.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<Vec<ItemRecord>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<ItemRecord>>>,
    {
        let Some(store) = &self.store else {
            return compute().await;
        };

        match store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<ItemRecord>>(&raw) {
                Ok(items) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(subsystem = "cache", cache_key = key, item_count = items.len(), "Cache HIT");
                    return Ok(items);
                }
                Err(e) => {
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(subsystem = "cache", cache_key = key, error = %e, "Discarding undecodable cache entry");
                }
            },
            Ok(None) => debug!(subsystem = "cache", cache_key = key, "Cache MISS"),
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!(subsystem = "cache", cache_key = key, error = %e, "Cache read failed, computing");
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let items = compute().await?;

        match serde_json::to_string(&items) {
            Ok(raw) => {
                if let Err(e) = store.set_ex(key, &raw, ttl.unwrap_or(self.ttl)).await {
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(subsystem = "cache", cache_key = key, error = %e, "Cache write failed");
                }
            }
            Err(e) => warn!(subsystem = "cache", error = %e, "Cache serialization error"),
        }
        Ok(items)
    }

    /// Drop every cached listing after `product_id` changed.
    ///
    /// Every cached listing is dropped, not only those showing the product. Returns whether
    /// the store acknowledged the flush.
    pub async fn invalidate(&self, product_id: u64) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.delete_prefix(LIST_CACHE_PREFIX).await {
            Ok(removed) => {
                info!(
                    subsystem = "cache",
                    component = "list_cache",
                    op = "invalidate",
                    product_id,
                    removed,
                    "Listing cache flushed"
                );
                true
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!(subsystem = "cache", product_id, error = %e, "Listing cache flush failed");
                false
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }
}
