use crate::error::CacheError;
use async_trait::async_trait;
use configuration::CacheSettings;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

// =================================================================
// Cache Interface Definition
// =================================================================

/// A key/value store for serialized query responses.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Backend name for log lines.
    fn name(&self) -> &'static str;

    /// The cached value under `key`, or `None` on a miss or after expiry.
    async fn get_json(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Stores `value` under `key` for `ttl`.
    async fn set_json(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError>;

    /// Drops every entry this cache owns.
    async fn invalidate_all(&self) -> Result<(), CacheError>;
}

// =================================================================
// Memory Cache Implementation
// =================================================================

#[derive(Debug, Clone)]
struct MemoryCacheEntry {
    value: Value,
    expires_at: Instant,
}

impl MemoryCacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Process-local cache. Expired entries are purged lazily on write.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, MemoryCacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ResponseCache for InMemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_json(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.value.clone()))
    }

    async fn set_json(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| !entry.is_expired(now));
        entries.insert(
            key.to_string(),
            MemoryCacheEntry {
                value: value.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate_all(&self) -> Result<(), CacheError> {
        self.entries.write().await.clear();
        debug!("Cleared in-memory response cache");
        Ok(())
    }
}

// =================================================================
// Redis Cache Implementation
// =================================================================

/// Redis-backed cache. Every key is stored as `{prefix}:{key}` so that
/// `invalidate_all` only touches this application's entries.
pub struct RedisCache {
    connection: MultiplexedConnection,
    prefix: String,
}

impl RedisCache {
    /// Connects and checks the server with a `PING`. Both steps together
    /// must finish within `timeout`.
    pub async fn connect(
        redis_url: &str,
        prefix: &str,
        timeout: Duration,
    ) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let handshake = async {
            let mut connection = client.get_multiplexed_async_connection().await?;
            let _: String = redis::cmd("PING").query_async(&mut connection).await?;
            Ok::<_, CacheError>(connection)
        };
        let connection = tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| CacheError::Timeout(timeout))??;
        debug!("Connected to Redis at: {}", redis_url);

        Ok(Self {
            connection,
            prefix: prefix.to_string(),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

#[async_trait]
impl ResponseCache for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get_json(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(self.namespaced(key)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set_json(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let payload = serde_json::to_string(value)?;
        let _: () = conn
            .set_ex(self.namespaced(key), payload, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn invalidate_all(&self) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let keys: Vec<String> = conn.keys(format!("{}:*", self.prefix)).await?;
        if !keys.is_empty() {
            let _: () = conn.del(&keys).await?;
        }
        debug!(removed = keys.len(), "Cleared Redis response cache");
        Ok(())
    }
}

// =================================================================
// Disabled Cache
// =================================================================

/// Stores nothing. Used when caching is switched off.
#[derive(Debug, Default)]
pub struct NoopCache;

#[async_trait]
impl ResponseCache for NoopCache {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn get_json(&self, _key: &str) -> Result<Option<Value>, CacheError> {
        Ok(None)
    }

    async fn set_json(&self, _key: &str, _value: &Value, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn invalidate_all(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Chooses a backend from settings.
///
/// Redis is used when caching is enabled and a URL is configured. If the
/// server cannot be reached the in-memory cache takes its place, so a
/// missing Redis never stops the service from starting.
pub async fn build_cache(settings: &CacheSettings) -> Arc<dyn ResponseCache> {
    if !settings.enabled {
        info!("Response cache disabled");
        return Arc::new(NoopCache);
    }

    if let Some(url) = settings.redis_url.as_deref() {
        let timeout = Duration::from_millis(settings.connect_timeout_ms);
        match RedisCache::connect(url, &settings.key_prefix, timeout).await {
            Ok(cache) => {
                info!("Using Redis response cache");
                return Arc::new(cache);
            }
            Err(e) => warn!(error = %e, "Redis unavailable, falling back to in-memory cache"),
        }
    }

    info!("Using in-memory response cache");
    Arc::new(InMemoryCache::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_cache_hit_and_miss() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.get_json("perf:a:b").await.unwrap(), None);

        cache
            .set_json("perf:a:b", &json!([1, 2]), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get_json("perf:a:b").await.unwrap(), Some(json!([1, 2])));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn memory_cache_entries_expire() {
        let cache = InMemoryCache::new();
        cache
            .set_json("compo:d", &json!({"x": 1}), Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.get_json("compo:d").await.unwrap(), None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn invalidate_clears_everything() {
        let cache = InMemoryCache::new();
        for key in ["perf:1:2", "compo:1", "changes:1:2"] {
            cache
                .set_json(key, &json!(true), Duration::from_secs(60))
                .await
                .unwrap();
        }
        cache.invalidate_all().await.unwrap();
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn disabled_cache_never_hits() {
        let cache = NoopCache;
        cache
            .set_json("k", &json!(1), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get_json("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unreachable_redis_falls_back_to_memory() {
        let settings = CacheSettings {
            enabled: true,
            redis_url: Some("redis://127.0.0.1:1/".to_string()),
            ttl_secs: 60,
            key_prefix: "ewi-test".to_string(),
            connect_timeout_ms: 500,
        };
        assert_eq!(build_cache(&settings).await.name(), "memory");

        let disabled = CacheSettings {
            enabled: false,
            ..settings
        };
        assert_eq!(build_cache(&disabled).await.name(), "disabled");
    }

    #[tokio::test]
    async fn silent_redis_host_times_out() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let holder = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let url = format!("redis://{addr}/");
        let err = RedisCache::connect(&url, "ewi-test", Duration::from_millis(200))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CacheError::Timeout(_)));

        let settings = CacheSettings {
            enabled: true,
            redis_url: Some(url),
            ttl_secs: 60,
            key_prefix: "ewi-test".to_string(),
            connect_timeout_ms: 200,
        };
        assert_eq!(build_cache(&settings).await.name(), "memory");
        holder.abort();
    }
}
