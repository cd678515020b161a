use crate::backend::ResponseCache;
use core_types::{CompositionChange, ConstituentWeight, DateRange, IndexPerformance, TradingDate};
use database::{CompositionStore, PerformanceStore};
use index_engine::{CompositionDiffer, CompositionReader, IndexError, PerformanceReader};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

pub fn performance_key(range: DateRange) -> String {
    format!("perf:{}:{}", range.start, range.end)
}

pub fn composition_key(date: TradingDate) -> String {
    format!("compo:{date}")
}

pub fn changes_key(range: DateRange) -> String {
    format!("changes:{}:{}", range.start, range.end)
}

/// The three read queries with a read-through response cache in front.
///
/// Cache failures are logged and treated as misses; the store stays the
/// source of truth.
///
/// Stored keys carry a generation that `invalidate` bumps, so a read that
/// loaded rows before a build and writes them after the invalidation lands
/// under a key no later read asks for. The generation is per process: a
/// build run from another process only clears the shared backend.
pub struct CachedQueries<S: ?Sized> {
    performance: PerformanceReader<S>,
    composition: CompositionReader<S>,
    differ: CompositionDiffer<S>,
    cache: Arc<dyn ResponseCache>,
    ttl: Duration,
    generation: AtomicU64,
}

impl<S: CompositionStore + PerformanceStore + ?Sized> CachedQueries<S> {
    pub fn new(store: Arc<S>, cache: Arc<dyn ResponseCache>, ttl: Duration) -> Self {
        Self {
            performance: PerformanceReader::new(store.clone()),
            composition: CompositionReader::new(store.clone()),
            differ: CompositionDiffer::new(store),
            cache,
            ttl,
            generation: AtomicU64::new(0),
        }
    }

    pub async fn performance(&self, range: DateRange) -> Result<Vec<IndexPerformance>, IndexError> {
        self.read_through(performance_key(range), || self.performance.get(range))
            .await
    }

    pub async fn composition(&self, date: TradingDate) -> Result<Vec<ConstituentWeight>, IndexError> {
        self.read_through(composition_key(date), || self.composition.get(date))
            .await
    }

    pub async fn changes(&self, range: DateRange) -> Result<Vec<CompositionChange>, IndexError> {
        self.read_through(changes_key(range), || self.differ.diff(range))
            .await
    }

    /// Drops all cached responses, e.g. after a build rewrote stored rows.
    pub async fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = self.cache.invalidate_all().await {
            warn!(cache = self.cache.name(), error = %e, "Failed to invalidate response cache");
        }
    }

    fn generation_key(&self, key: &str) -> String {
        format!("g{}:{key}", self.generation.load(Ordering::Acquire))
    }

    async fn read_through<T, F, Fut>(&self, key: String, load: F) -> Result<T, IndexError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, IndexError>>,
    {
        // Fixed before loading, so the entry is filed under the generation
        // the rows were read in.
        let key = self.generation_key(&key);
        match self.cache.get_json(&key).await {
            Ok(Some(value)) => match serde_json::from_value::<T>(value) {
                Ok(hit) => {
                    debug!(%key, "Cache hit");
                    return Ok(hit);
                }
                Err(e) => warn!(%key, error = %e, "Discarding undecodable cache entry"),
            },
            Ok(None) => debug!(%key, "Cache miss"),
            Err(e) => warn!(%key, cache = self.cache.name(), error = %e, "Cache read failed"),
        }

        let fresh = load().await?;
        match serde_json::to_value(&fresh) {
            Ok(value) => {
                if let Err(e) = self.cache.set_json(&key, &value, self.ttl).await {
                    warn!(%key, cache = self.cache.name(), error = %e, "Cache write failed");
                }
            }
            Err(e) => warn!(%key, error = %e, "Response not cacheable"),
        }
        Ok(fresh)
    }
}
