//! Read-through cache with explicit invalidation.
//!
//! Hierarchy reads sit on the authentication hot path, so ancestor chains,
//! child lists and discovery lookups are cached. Entries are keyed by
//! structured keys (ids, tuples or key structs, never concatenated strings)
//! and are invalidated synchronously by the component performing the write,
//! before that write returns.
//!
//! # Fills and invalidation
//!
//! A fill reads the cache [`generation`](ReadThroughCache::generation)
//! before going to the store and hands it back to
//! [`insert_if_current`](ReadThroughCache::insert_if_current). Every
//! invalidation bumps the generation under the same lock that guards the
//! entries, so a fill that raced with a write is dropped instead of
//! caching what the store returned before the write.
//!
//! ```
//! use org_core::{CacheConfig, ReadThroughCache};
//!
//! # async fn example() {
//! let cache: ReadThroughCache<u32, &str> = ReadThroughCache::new(&CacheConfig::default());
//!
//! let generation = cache.generation().await;
//! // ... load from the store; meanwhile a writer invalidates the key ...
//! cache.invalidate(&1).await;
//! assert!(!cache.insert_if_current(1, "stale", generation).await);
//! assert!(cache.get(&1).await.is_none());
//! # }
//! ```

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use crate::config::CacheConfig;

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that fell through to the store
    pub misses: u64,
    /// Entries removed by invalidation
    pub invalidations: u64,
    /// Least recently used entries dropped to stay within capacity
    pub evictions: u64,
    /// Fills dropped because an invalidation happened while they loaded
    pub stale_fills: u64,
    /// Entries currently held
    pub entries: usize,
}

struct Entries<K: Hash + Eq, V> {
    lru: LruCache<K, V>,
    generation: u64,
}

impl<K: Hash + Eq, V> Entries<K, V> {
    fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

/// A bounded least-recently-used cache.
///
/// When disabled every lookup misses and inserts are dropped, so callers
/// never need a separate uncached code path.
pub struct ReadThroughCache<K: Hash + Eq, V> {
    entries: Mutex<Entries<K, V>>,
    enabled: bool,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    evictions: AtomicU64,
    stale_fills: AtomicU64,
}

impl<K: Hash + Eq, V> std::fmt::Debug for ReadThroughCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadThroughCache")
            .field("enabled", &self.enabled)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<K, V> ReadThroughCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache from configuration.
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(Entries {
                lru: LruCache::new(capacity),
                generation: 0,
            }),
            enabled: config.enabled && config.capacity > 0,
            capacity: config.capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            stale_fills: AtomicU64::new(0),
        }
    }

    /// Look up an entry, marking it most recently used.
    pub async fn get(&self, key: &K) -> Option<V> {
        if !self.enabled {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let found = self.entries.lock().await.lru.get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Current invalidation generation, read before loading a fill.
    pub async fn generation(&self) -> u64 {
        self.entries.lock().await.generation
    }

    /// Store an entry unconditionally.
    pub async fn insert(&self, key: K, value: V) {
        if !self.enabled {
            return;
        }
        let mut entries = self.entries.lock().await;
        self.put(&mut entries, key, value);
    }

    /// Store an entry unless the cache was invalidated since `generation`.
    ///
    /// Returns whether the entry was stored. The comparison and the insert
    /// happen under one lock acquisition.
    pub async fn insert_if_current(&self, key: K, value: V, generation: u64) -> bool {
        if !self.enabled {
            return false;
        }
        let mut entries = self.entries.lock().await;
        if entries.generation != generation {
            self.stale_fills.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.put(&mut entries, key, value);
        true
    }

    fn put(&self, entries: &mut Entries<K, V>, key: K, value: V) {
        if let Some((evicted, _)) = entries.lru.push(key.clone(), value) {
            if evicted != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Remove one entry.
    pub async fn invalidate(&self, key: &K) {
        let mut entries = self.entries.lock().await;
        entries.bump();
        if entries.lru.pop(key).is_some() {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove every entry for which `predicate` holds.
    pub async fn invalidate_where<F>(&self, mut predicate: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        let mut entries = self.entries.lock().await;
        entries.bump();
        let doomed: Vec<K> = entries
            .lru
            .iter()
            .filter(|(k, v)| predicate(*k, *v))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            entries.lru.pop(key);
        }
        self.invalidations
            .fetch_add(doomed.len() as u64, Ordering::Relaxed);
    }

    /// Remove every entry.
    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        entries.bump();
        self.invalidations
            .fetch_add(entries.lru.len() as u64, Ordering::Relaxed);
        entries.lru.clear();
    }

    /// Current statistics.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            stale_fills: self.stale_fills.load(Ordering::Relaxed),
            entries: self.entries.lock().await.lru.len(),
        }
    }
}
