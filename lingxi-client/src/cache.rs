//! Time-bounded caching of fetched data.
//!
//! An entry is stale once `now - fetched_at > ttl`. A stale entry is never
//! handed out; [`ReadThroughCache::get`] refetches it first.

use chrono::{DateTime, Utc};
use lingxi_core::ApiResult;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Source of "now" for staleness checks.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Per-domain caching policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Serve entries younger than the TTL.
    Ttl(Duration),
    /// Never serve from cache; every read goes to the backend.
    AlwaysRefetch,
}

impl CachePolicy {
    fn is_fresh(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            Self::AlwaysRefetch => false,
            Self::Ttl(ttl) => {
                let age = now.signed_duration_since(fetched_at);
                match chrono::Duration::from_std(*ttl) {
                    Ok(ttl) => age <= ttl,
                    Err(_) => true,
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    fetched_at: DateTime<Utc>,
}

/// Result of a cache read with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<V> {
    value: V,
    fetched_at: DateTime<Utc>,
    hit: bool,
}

impl<V> CacheRead<V> {
    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_value(self) -> V {
        self.value
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn was_cache_hit(&self) -> bool {
        self.hit
    }
}

/// Keyed entries with fetch timestamps. Not synchronized.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
    entries: HashMap<K, CacheEntry<V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(policy: CachePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            clock,
            entries: HashMap::new(),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// The cached value for `key` if present and still fresh.
    pub fn lookup(&self, key: &K) -> Option<CacheRead<V>> {
        let entry = self.entries.get(key)?;
        if !self.policy.is_fresh(entry.fetched_at, self.clock.now()) {
            return None;
        }
        Some(CacheRead {
            value: entry.value.clone(),
            fetched_at: entry.fetched_at,
            hit: true,
        })
    }

    /// Store `value` stamped with the current time.
    pub fn insert(&mut self, key: K, value: V) -> DateTime<Utc> {
        let fetched_at = self.clock.now();
        self.entries.insert(key, CacheEntry { value, fetched_at });
        fetched_at
    }

    /// Edit a cached value in place without refreshing its timestamp.
    pub fn update<F>(&mut self, key: &K, f: F) -> bool
    where
        F: FnOnce(&mut V),
    {
        match self.entries.get_mut(key) {
            Some(entry) => {
                f(&mut entry.value);
                true
            }
            None => false,
        }
    }

    pub fn invalidate(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A [`TtlCache`] behind a lock that fetches on miss.
///
/// The lock is released while the fetch is in flight. Two concurrent misses
/// for the same key both fetch; the later insert wins.
#[derive(Debug)]
pub struct ReadThroughCache<K, V> {
    inner: RwLock<TtlCache<K, V>>,
}

impl<K, V> ReadThroughCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    pub fn new(policy: CachePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(TtlCache::new(policy, clock)),
        }
    }

    /// Return the fresh cached value or fetch, store and return a new one.
    pub async fn get<F, Fut>(&self, key: K, fetch: F) -> ApiResult<CacheRead<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<V>>,
    {
        if let Some(read) = self.peek(&key) {
            tracing::debug!(?key, "Cache hit");
            return Ok(read);
        }
        tracing::debug!(?key, "Cache miss, fetching");
        let value = fetch().await?;
        let fetched_at = match self.inner.write() {
            Ok(mut cache) => cache.insert(key, value.clone()),
            Err(_) => Utc::now(),
        };
        Ok(CacheRead {
            value,
            fetched_at,
            hit: false,
        })
    }

    pub fn peek(&self, key: &K) -> Option<CacheRead<V>> {
        self.inner.read().ok()?.lookup(key)
    }

    /// Store a value directly, stamped with the current time.
    pub fn insert(&self, key: K, value: V) {
        if let Ok(mut cache) = self.inner.write() {
            cache.insert(key, value);
        }
    }

    pub fn update<F>(&self, key: &K, f: F) -> bool
    where
        F: FnOnce(&mut V),
    {
        match self.inner.write() {
            Ok(mut cache) => cache.update(key, f),
            Err(_) => false,
        }
    }

    pub fn invalidate(&self, key: &K) {
        if let Ok(mut cache) = self.inner.write() {
            if cache.invalidate(key) {
                tracing::debug!(?key, "Cache entry invalidated");
            }
        }
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut cache) = self.inner.write() {
            cache.invalidate_all();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
