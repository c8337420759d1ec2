//! Content-addressed caches with TTL expiry
//!
//! Entries are keyed by a [`Fingerprint`] of (operation, canonical inputs).
//! Concurrent requests for the same key are serialised through a per-key
//! in-flight lock, so only the first caller computes and the rest read the
//! stored value.

use cached::{Cached, TimedCache};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

/// SHA-256 content address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of an operation over serializable inputs
    ///
    /// Inputs are canonicalised through `serde_json::Value`, whose maps are
    /// key-ordered, so field order in the source type does not matter.
    pub fn of(operation: &str, inputs: &impl Serialize) -> serde_json::Result<Self> {
        let canonical = serde_json::to_string(&serde_json::to_value(inputs)?)?;
        let mut hasher = Sha256::new();
        hasher.update(operation.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical.as_bytes());
        Ok(Self(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hit/miss accounting for one cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub hit_rate: f64,
}

/// Thread-safe TTL cache with atomic get-or-compute
pub struct TtlCache<V> {
    name: &'static str,
    entries: Arc<RwLock<TimedCache<Fingerprint, V>>>,
    in_flight: Arc<Mutex<HashMap<Fingerprint, Arc<Mutex<()>>>>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            entries: Arc::clone(&self.entries),
            in_flight: Arc::clone(&self.in_flight),
            hits: Arc::clone(&self.hits),
            misses: Arc::clone(&self.misses),
        }
    }
}

impl<V: Clone> TtlCache<V> {
    /// Create a new cache with specified TTL
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            entries: Arc::new(RwLock::new(TimedCache::with_lifespan(ttl))),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Peek at an entry without touching the counters
    pub async fn get(&self, key: &Fingerprint) -> Option<V> {
        let mut cache = self.entries.write().await;
        cache.cache_get(key).cloned()
    }

    pub async fn insert(&self, key: Fingerprint, value: V) {
        let mut cache = self.entries.write().await;
        let _ = cache.cache_set(key, value);
    }

    /// Return the cached value or compute, store and return it
    ///
    /// Two concurrent calls for the same key run `compute` at most once.
    /// Errors are returned to the caller and never cached.
    pub async fn get_or_compute<F, Fut, E>(&self, key: Fingerprint, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key).await {
            self.record_hit(&key);
            return Ok(value);
        }

        let lock = self.key_lock(&key).await;
        let guard = Arc::clone(&lock).lock_owned().await;

        // Another caller may have filled the entry while we waited
        let result = if let Some(value) = self.get(&key).await {
            self.record_hit(&key);
            Ok(value)
        } else {
            self.record_miss(&key);
            match compute().await {
                Ok(value) => {
                    self.insert(key.clone(), value.clone()).await;
                    Ok(value)
                }
                Err(e) => Err(e),
            }
        };

        drop(guard);
        self.release(&key, lock).await;
        result
    }

    /// Batch variant of [`get_or_compute`](Self::get_or_compute)
    ///
    /// Every distinct key's in-flight lock is taken in sorted order, hits are
    /// served from the cache, and `compute` runs once with the positions of
    /// the misses. It must return one entry per miss position, in the same
    /// order; `Some` values are cached, `None` means no value was produced
    /// for that key. The returned vector is aligned with `keys`.
    pub async fn get_or_compute_many<F, Fut, E>(
        &self,
        keys: &[Fingerprint],
        compute: F,
    ) -> Result<Vec<Option<V>>, E>
    where
        F: FnOnce(Vec<usize>) -> Fut,
        Fut: Future<Output = Result<Vec<Option<V>>, E>>,
    {
        let mut distinct: Vec<&Fingerprint> = keys.iter().collect();
        distinct.sort();
        distinct.dedup();

        let mut locks = Vec::with_capacity(distinct.len());
        let mut guards: Vec<OwnedMutexGuard<()>> = Vec::with_capacity(distinct.len());
        for key in &distinct {
            let lock = self.key_lock(key).await;
            guards.push(Arc::clone(&lock).lock_owned().await);
            locks.push(((*key).clone(), lock));
        }

        let mut values = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();
        for (position, key) in keys.iter().enumerate() {
            let hit = self.get(key).await;
            if hit.is_some() {
                self.record_hit(key);
            } else {
                self.record_miss(key);
                missing.push(position);
            }
            values.push(hit);
        }

        let result = if missing.is_empty() {
            Ok(values)
        } else {
            match compute(missing.clone()).await {
                Ok(computed) => {
                    for (position, value) in missing.into_iter().zip(computed) {
                        if let Some(value) = value {
                            self.insert(keys[position].clone(), value.clone()).await;
                            values[position] = Some(value);
                        }
                    }
                    Ok(values)
                }
                Err(e) => Err(e),
            }
        };

        drop(guards);
        for (key, lock) in locks {
            self.release(&key, lock).await;
        }
        result
    }

    /// Invalidate a specific cache entry
    pub async fn invalidate(&self, key: &Fingerprint) {
        let mut cache = self.entries.write().await;
        let _ = cache.cache_remove(key);
    }

    /// Clear all cached entries
    pub async fn clear(&self) {
        let mut cache = self.entries.write().await;
        cache.cache_clear();
    }

    pub async fn len(&self) -> usize {
        let cache = self.entries.read().await;
        cache.cache_size()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            entries: self.len().await,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }

    fn record_hit(&self, key: &Fingerprint) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(cache = self.name, key = %key, "cache hit");
    }

    fn record_miss(&self, key: &Fingerprint) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(cache = self.name, key = %key, "cache miss");
    }

    async fn key_lock(&self, key: &Fingerprint) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().await;
        Arc::clone(in_flight.entry(key.clone()).or_default())
    }

    /// Drop the in-flight entry once nobody else is waiting on it
    async fn release(&self, key: &Fingerprint, lock: Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().await;
        // One reference in the map plus ours
        if Arc::strong_count(&lock) <= 2 {
            in_flight.remove(key);
        }
    }
}

/// TTLs for the two caches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub verification_ttl: Duration,
    pub calculation_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            verification_ttl: Duration::from_secs(24 * 60 * 60),
            calculation_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// The two independent caches of a run
#[derive(Clone)]
pub struct CacheLayer {
    /// Evidence results, keyed by claim fingerprint and verification parameters
    pub verification: TtlCache<serde_json::Value>,
    /// Calculator results
    pub calculation: TtlCache<serde_json::Value>,
}

impl CacheLayer {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            verification: TtlCache::new("verification", config.verification_ttl),
            calculation: TtlCache::new("calculation", config.calculation_ttl),
        }
    }

    pub async fn clear_all(&self) {
        self.verification.clear().await;
        self.calculation.clear().await;
    }
}

impl Default for CacheLayer {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    fn key(n: u32) -> Fingerprint {
        Fingerprint::of("test", &json!({ "n": n })).unwrap()
    }

    #[test]
    fn test_fingerprint_canonical() {
        let a = Fingerprint::of("verify", &json!({"claim": "x", "model": "m"})).unwrap();
        let b = Fingerprint::of("verify", &json!({"model": "m", "claim": "x"})).unwrap();
        let other_op = Fingerprint::of("calc", &json!({"claim": "x", "model": "m"})).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, other_op);
        assert_eq!(a.as_str().len(), 64);
    }

    #[tokio::test]
    async fn test_get_or_compute_calls_once() {
        let cache = TtlCache::new("test", Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let value = cache
                .get_or_compute(key(1), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(json!({"verdict": "supported"}))
                })
                .await
                .unwrap();
            assert_eq!(value["verdict"], "supported");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_concurrent_requests_single_compute() {
        let cache: TtlCache<u32> = TtlCache::new("test", Duration::from_secs(60));
        let calls = Arc::new(AtomicU32::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .get_or_compute(key(7), || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, String>(7)
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_errors_not_cached() {
        let cache: TtlCache<u32> = TtlCache::new("test", Duration::from_secs(60));

        let first = cache
            .get_or_compute(key(2), || async { Err::<u32, _>("upstream down") })
            .await;
        assert!(first.is_err());

        let second = cache
            .get_or_compute(key(2), || async { Ok::<_, &str>(2) })
            .await;
        assert_eq!(second, Ok(2));
    }

    #[tokio::test]
    async fn test_get_or_compute_many_only_misses() {
        let cache: TtlCache<u32> = TtlCache::new("test", Duration::from_secs(60));
        cache.insert(key(1), 10).await;

        let keys = vec![key(1), key(2), key(3)];
        let values = cache
            .get_or_compute_many(&keys, |missing| async move {
                assert_eq!(missing, vec![1, 2]);
                // Second miss produces nothing and must stay uncached
                Ok::<_, String>(vec![Some(20), None])
            })
            .await
            .unwrap();

        assert_eq!(values, vec![Some(10), Some(20), None]);
        assert_eq!(cache.get(&key(2)).await, Some(20));
        assert_eq!(cache.get(&key(3)).await, None);

        let calls = AtomicU32::new(0);
        let again = cache
            .get_or_compute_many(&keys[..2], |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(vec![])
            })
            .await
            .unwrap();
        assert_eq!(again, vec![Some(10), Some(20)]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache: TtlCache<u32> = TtlCache::new("test", Duration::from_millis(50));
        cache.insert(key(4), 4).await;
        assert_eq!(cache.get(&key(4)).await, Some(4));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.get(&key(4)).await, None);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let layer = CacheLayer::default();
        layer.verification.insert(key(1), json!(1)).await;
        layer.calculation.insert(key(2), json!(2)).await;

        layer.verification.invalidate(&key(1)).await;
        assert!(layer.verification.is_empty().await);

        layer.clear_all().await;
        assert!(layer.calculation.is_empty().await);
    }
}
