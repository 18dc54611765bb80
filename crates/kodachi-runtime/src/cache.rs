// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Explicit cache registry.
//!
//! Caches are owned by whoever builds the op pipeline (normally the
//! [`crate::KodachiRuntime`]) and registered under a scope name, so flushing
//! and lifetime follow that owner instead of process-wide statics.
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::debug;

/// Counters reported by a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Live entries.
    pub entries: usize,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that had to compute.
    pub misses: u64,
}

/// A flushable cache.
pub trait Cache: Send + Sync {
    /// Drops every entry. Counters are kept.
    fn clear(&self);
    /// Current counters.
    fn stats(&self) -> CacheStats;
}

/// Thread-safe memo table with hit/miss accounting.
#[derive(Debug)]
pub struct MemoryCache<K, V> {
    entries: Mutex<HashMap<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> Default for MemoryCache<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

impl<K, V> MemoryCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `key`, counting a hit or a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let found = self.lock().get(key).cloned();
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Stores `value` under `key`.
    pub fn insert(&self, key: K, value: V) {
        self.lock().insert(key, value);
    }

    /// Returns the cached value, computing and storing it on a miss.
    ///
    /// `compute` runs without the cache lock held, so two racing misses may
    /// both compute; the last insert wins.
    pub fn get_or_insert_with(&self, key: K, compute: impl FnOnce() -> V) -> V {
        if let Some(hit) = self.get(&key) {
            return hit;
        }
        let value = compute();
        self.insert(key, value.clone());
        value
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when the cache holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, V>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> Cache for MemoryCache<K, V>
where
    K: Eq + Hash + Send,
    V: Clone + Send,
{
    fn clear(&self) {
        self.lock().clear();
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

struct Entry {
    cache: Arc<dyn Cache>,
    typed: Arc<dyn Any + Send + Sync>,
}

/// Named collection of caches flushed together.
#[derive(Default)]
pub struct CacheRegistry {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl core::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("CacheRegistry")
            .field("scopes", &entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CacheRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `cache` under `scope`, returning the cache it replaced.
    pub fn register<C>(&self, scope: impl Into<String>, cache: Arc<C>) -> Option<Arc<dyn Cache>>
    where
        C: Cache + Send + Sync + 'static,
    {
        let entry = Entry {
            cache: Arc::clone(&cache) as Arc<dyn Cache>,
            typed: cache,
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(scope.into(), entry)
            .map(|old| old.cache)
    }

    /// Cache registered under `scope`.
    pub fn get(&self, scope: &str) -> Option<Arc<dyn Cache>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(scope)
            .map(|e| Arc::clone(&e.cache))
    }

    /// Typed cache registered under `scope`, registering `init()` when the
    /// scope is empty. `None` when the scope holds a cache of another type.
    pub fn get_or_register<C>(&self, scope: &str, init: impl FnOnce() -> C) -> Option<Arc<C>>
    where
        C: Cache + Send + Sync + 'static,
    {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get(scope) {
            return Arc::clone(&entry.typed).downcast::<C>().ok();
        }
        let cache = Arc::new(init());
        entries.insert(
            scope.to_owned(),
            Entry {
                cache: Arc::clone(&cache) as Arc<dyn Cache>,
                typed: Arc::clone(&cache) as Arc<dyn Any + Send + Sync>,
            },
        );
        Some(cache)
    }

    /// Clears every registered cache.
    pub fn clear_all(&self) {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        for cache in entries.values() {
            cache.cache.clear();
        }
        debug!(caches = entries.len(), "cleared cache registry");
    }

    /// Counters per scope.
    pub fn stats(&self) -> BTreeMap<String, CacheStats> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(scope, e)| (scope.clone(), e.cache.stats()))
            .collect()
    }

    /// Number of registered scopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
