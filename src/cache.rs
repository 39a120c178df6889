//! Keyed query cache with freshness windows and request coalescing
//!
//! Lookup rules for [`QueryCache::get`]:
//!
//! ```text
//! fresh value         -> returned, fetcher not called
//! stale value         -> returned immediately, one background refresh started
//! no value, in flight -> awaits the running fetch
//! no value            -> starts a fetch and awaits it
//! ```
//!
//! Fetches run on their own tokio task, so a caller that stops awaiting
//! never strands the in-flight marker. Entries are never evicted by size;
//! only [`QueryCache::invalidate`] and friends remove them.

use crate::{clock::Clock, error::MarketDataError};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, MarketDataError>>>;

/// Cache key: operation name plus its serialized parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    operation: &'static str,
    params: String,
}

impl QueryKey {
    /// Creates a key for `operation` with its rendered parameters
    pub fn new(operation: &'static str, params: impl Into<String>) -> Self {
        Self {
            operation,
            params: params.into(),
        }
    }

    /// Returns the operation name
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Returns the serialized parameters
    pub fn params(&self) -> &str {
        &self.params
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.operation, self.params)
    }
}

struct CachedValue<T> {
    value: T,
    fetched_at: Instant,
}

struct InFlight<T> {
    generation: u64,
    fetch: SharedFetch<T>,
}

struct CacheEntry<T> {
    cached: Option<CachedValue<T>>,
    in_flight: Option<InFlight<T>>,
}

impl<T> CacheEntry<T> {
    fn empty() -> Self {
        Self {
            cached: None,
            in_flight: None,
        }
    }
}

/// Counters describing how lookups were served
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Fresh values returned without fetching
    pub hits: u64,
    /// Stale values returned while a refresh ran
    pub stale_hits: u64,
    /// Lookups that started a first fetch
    pub misses: u64,
    /// Lookups that joined a fetch already in flight
    pub coalesced: u64,
    /// Background refreshes started
    pub refreshes: u64,
    /// Background refreshes that failed and kept the stale value
    pub refresh_failures: u64,
}

impl std::ops::Add for CacheStats {
    type Output = CacheStats;

    fn add(self, other: CacheStats) -> CacheStats {
        CacheStats {
            hits: self.hits + other.hits,
            stale_hits: self.stale_hits + other.stale_hits,
            misses: self.misses + other.misses,
            coalesced: self.coalesced + other.coalesced,
            refreshes: self.refreshes + other.refreshes,
            refresh_failures: self.refresh_failures + other.refresh_failures,
        }
    }
}

#[derive(Default)]
struct StatsCounters {
    hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    refreshes: AtomicU64,
    refresh_failures: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
        }
    }
}

struct Inner<T> {
    entries: Mutex<HashMap<QueryKey, CacheEntry<T>>>,
    clock: Arc<dyn Clock>,
    next_generation: AtomicU64,
    stats: StatsCounters,
}

impl<T: Clone + Send + Sync + 'static> Inner<T> {
    /// Lock the entries mutex, recovering from poison if necessary.
    ///
    /// The lock is never held across an await or user code, so a poisoned
    /// map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, CacheEntry<T>>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Query cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Records the outcome of fetch `generation` and clears its marker
    fn complete(&self, key: &QueryKey, generation: u64, result: &Result<T, MarketDataError>) {
        let now = self.clock.now();
        let mut entries = self.lock();

        let Some(entry) = entries.get_mut(key) else {
            tracing::debug!(key = %key, "Entry invalidated while fetching, discarding result");
            return;
        };

        if entry.in_flight.as_ref().map(|f| f.generation) != Some(generation) {
            tracing::debug!(key = %key, "Superseded fetch finished, discarding result");
            return;
        }

        entry.in_flight = None;

        let remove = match result {
            Ok(value) => {
                entry.cached = Some(CachedValue {
                    value: value.clone(),
                    fetched_at: now,
                });
                false
            }
            Err(err) if entry.cached.is_some() => {
                StatsCounters::bump(&self.stats.refresh_failures);
                tracing::warn!(
                    key = %key,
                    error = %err,
                    "Background refresh failed, keeping stale value"
                );
                false
            }
            Err(err) => {
                tracing::debug!(key = %key, error = %err, "Fetch failed");
                true
            }
        };

        if remove {
            entries.remove(key);
        }
    }
}

/// Keyed cache of query results
///
/// Cloning is cheap and clones share the same entries.
pub struct QueryCache<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for QueryCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> QueryCache<T> {
    /// Creates an empty cache that ages entries on `clock`
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                clock,
                next_generation: AtomicU64::new(0),
                stats: StatsCounters::default(),
            }),
        }
    }

    /// Returns the value for `key`, fetching it with `fetcher` when needed
    ///
    /// `fetcher` is only invoked when this call has to start a fetch; it is
    /// dropped unused on a hit, a stale hit with a refresh already running,
    /// or when joining an in-flight fetch.
    ///
    /// A first-fetch error is returned to every waiter and nothing is
    /// cached. A failed background refresh keeps the stale value.
    pub async fn get<F, Fut>(
        &self,
        key: &QueryKey,
        ttl: Duration,
        fetcher: F,
    ) -> Result<T, MarketDataError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, MarketDataError>> + Send + 'static,
    {
        let pending = {
            let now = self.inner.clock.now();
            let mut entries = self.inner.lock();
            let entry = entries.entry(key.clone()).or_insert_with(CacheEntry::empty);

            let cached = entry.cached.as_ref().map(|c| {
                (
                    c.value.clone(),
                    now.saturating_duration_since(c.fetched_at) < ttl,
                )
            });

            match cached {
                Some((value, true)) => {
                    StatsCounters::bump(&self.inner.stats.hits);
                    tracing::debug!(key = %key, "Cache hit");
                    return Ok(value);
                }
                Some((value, false)) => {
                    StatsCounters::bump(&self.inner.stats.stale_hits);
                    if entry.in_flight.is_none() {
                        StatsCounters::bump(&self.inner.stats.refreshes);
                        tracing::debug!(
                            key = %key,
                            "Serving stale value, refreshing in background"
                        );
                        // the entry's in-flight marker keeps the fetch alive
                        drop(self.start_fetch(key, entry, fetcher));
                    }
                    return Ok(value);
                }
                None => match entry.in_flight.as_ref().map(|f| f.fetch.clone()) {
                    Some(fetch) => {
                        StatsCounters::bump(&self.inner.stats.coalesced);
                        tracing::debug!(key = %key, "Joining in-flight fetch");
                        fetch
                    }
                    None => {
                        StatsCounters::bump(&self.inner.stats.misses);
                        tracing::debug!(key = %key, "Cache miss");
                        self.start_fetch(key, entry, fetcher)
                    }
                },
            }
        };

        pending.await
    }

    /// Spawns the fetch and marks `entry` as in flight
    ///
    /// Must be called with the entries lock held so the completion handler
    /// cannot run before the marker is in place.
    fn start_fetch<F, Fut>(
        &self,
        key: &QueryKey,
        entry: &mut CacheEntry<T>,
        fetcher: F,
    ) -> SharedFetch<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, MarketDataError>> + Send + 'static,
    {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.clone();
        let task_key = key.clone();
        let fetch = fetcher();

        let handle = tokio::spawn(async move {
            let result = match AssertUnwindSafe(fetch).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(MarketDataError::internal(format!(
                    "fetch for {} panicked",
                    task_key
                ))),
            };
            inner.complete(&task_key, generation, &result);
            result
        });

        let shared = async move {
            handle.await.unwrap_or_else(|e| {
                Err(MarketDataError::internal(format!("fetch task failed: {}", e)))
            })
        }
        .boxed()
        .shared();

        entry.in_flight = Some(InFlight {
            generation,
            fetch: shared.clone(),
        });

        shared
    }

    /// Cached value for `key` regardless of age
    pub fn peek(&self, key: &QueryKey) -> Option<T> {
        self.inner
            .lock()
            .get(key)
            .and_then(|entry| entry.cached.as_ref())
            .map(|cached| cached.value.clone())
    }

    /// True while a fetch for `key` is running
    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.inner
            .lock()
            .get(key)
            .is_some_and(|entry| entry.in_flight.is_some())
    }

    /// Drops the entry for `key`; the next `get` fetches again
    ///
    /// A fetch already running for the key still resolves for its waiters
    /// but its result is not stored.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let removed = self.inner.lock().remove(key).is_some();
        if removed {
            tracing::debug!(key = %key, "Invalidated cache entry");
        }
        removed
    }

    /// Drops every entry of one operation, returning how many were removed
    pub fn invalidate_operation(&self, operation: &str) -> usize {
        self.invalidate_where(|key| key.operation == operation)
    }

    /// Drops every entry whose key matches `predicate`
    pub fn invalidate_where(&self, predicate: impl Fn(&QueryKey) -> bool) -> usize {
        let mut entries = self.inner.lock();
        let before = entries.len();
        entries.retain(|key, _| !predicate(key));
        before - entries.len()
    }

    /// Drops every entry; running fetches still resolve for their waiters
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Number of keys holding a value
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .values()
            .filter(|entry| entry.cached.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the lookup counters
    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot()
    }
}
