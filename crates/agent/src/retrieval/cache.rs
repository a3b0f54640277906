use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    last_used: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    clock: u64,
}

/// Capacity-bounded cache with least-recently-used eviction and a time-to-live per entry.
/// Concurrent misses for one key are coalesced so the loader runs once.
pub struct TtlCache<K, V> {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner<K, V>>,
    in_flight: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash, V> fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("TtlCache")
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .field("loads_in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            inner: Mutex::new(Inner { entries: HashMap::new(), clock: 0 }),
            in_flight: DashMap::new(),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let expired = match inner.entries.get(key) {
            Some(entry) => now.saturating_duration_since(entry.inserted_at) >= self.ttl,
            None => return None,
        };
        if expired {
            inner.entries.remove(key);
            return None;
        }

        inner.clock += 1;
        let clock = inner.clock;
        inner.entries.get_mut(key).map(|entry| {
            entry.last_used = clock;
            entry.value.clone()
        })
    }

    /// Inserts or replaces, evicting the least recently used entry when full.
    pub async fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock().await;
        inner.clock += 1;
        let clock = inner.clock;
        inner.entries.insert(key, Entry { value, inserted_at: Instant::now(), last_used: clock });

        while inner.entries.len() > self.capacity {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    inner.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Returns the cached value (and `true`) or runs `load` once for all concurrent callers of
    /// the same key. Errors are not cached.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: K, load: F) -> Result<(V, bool), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key).await {
            return Ok((value, true));
        }

        let gate = self.in_flight.entry(key.clone()).or_default().clone();
        let _guard = gate.lock().await;
        if let Some(value) = self.get(&key).await {
            return Ok((value, true));
        }

        let loaded = load().await;
        if let Ok(value) = &loaded {
            self.insert(key.clone(), value.clone()).await;
        }
        self.in_flight.remove(&key);
        loaded.map(|value| (value, false))
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::TtlCache;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = TtlCache::new(4, Duration::from_secs(120));
        cache.insert("q", 1).await;
        tokio::time::advance(Duration::from_secs(119)).await;
        assert_eq!(cache.get(&"q").await, Some(1));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(&"q").await, None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn least_recently_used_is_evicted() {
        let cache = TtlCache::new(2, Duration::from_secs(120));
        cache.insert("a", 1).await;
        cache.insert("b", 2).await;
        assert_eq!(cache.get(&"a").await, Some(1));
        cache.insert("c", 3).await;

        assert_eq!(cache.get(&"b").await, None);
        assert_eq!(cache.get(&"a").await, Some(1));
        assert_eq!(cache.get(&"c").await, Some(3));
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn debug_output_shows_settings_not_entries() {
        let cache: TtlCache<String, String> = TtlCache::new(3, Duration::from_secs(5));
        cache.insert("balance".to_string(), "secret value".to_string()).await;
        let rendered = format!("{cache:?}");
        assert!(rendered.contains("capacity: 3"));
        assert!(!rendered.contains("secret value"));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_load_once() {
        let cache = Arc::new(TtlCache::new(8, Duration::from_secs(60)));
        let loads = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let loads = loads.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_try_insert_with("key", || async move {
                            loads.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok::<_, String>(42)
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            let (value, _) = task.await.expect("task").expect("load");
            assert_eq!(value, 42);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_loads_are_not_cached() {
        let cache: TtlCache<&str, i32> = TtlCache::new(4, Duration::from_secs(60));
        let failed = cache.get_or_try_insert_with("k", || async { Err::<i32, _>("down") }).await;
        assert_eq!(failed, Err("down"));
        let (value, hit) =
            cache.get_or_try_insert_with("k", || async { Ok::<_, &str>(5) }).await.expect("load");
        assert_eq!((value, hit), (5, false));
    }
}
