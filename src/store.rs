use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Keyed store whose entries expire a fixed time after insertion.
///
/// Every operation takes the lock for its own duration only. Expired entries
/// are invisible to lookups and are physically removed by [`ExpiringMap::sweep`].
pub struct ExpiringMap<K, V> {
    entries: Arc<Mutex<HashMap<K, Entry<V>>>>,
    ttl: Duration,
}

impl<K, V> Clone for ExpiringMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            ttl: self.ttl,
        }
    }
}

impl<K, V> ExpiringMap<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_live(&self, entry: &Entry<V>, now: Instant) -> bool {
        now.duration_since(entry.inserted_at) < self.ttl
    }

    /// Insert a value, returning the one it replaced (expired or not)
    pub async fn insert(&self, key: K, value: V) -> Option<V> {
        let entry = Entry {
            value,
            inserted_at: Instant::now(),
        };
        self.entries.lock().await.insert(key, entry).map(|old| old.value)
    }

    /// Run `f` on a live entry while holding the lock
    pub async fn with_entry<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get_mut(key) {
            Some(entry) if now.duration_since(entry.inserted_at) < self.ttl => Some(f(&mut entry.value)),
            _ => None,
        }
    }

    pub async fn get_cloned(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.with_entry(key, |value| value.clone()).await
    }

    pub async fn contains_key(&self, key: &K) -> bool {
        self.with_entry(key, |_| ()).await.is_some()
    }

    /// Remove and return a live entry
    pub async fn remove(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let entry = self.entries.lock().await.remove(key)?;
        if self.is_live(&entry, now) {
            Some(entry.value)
        } else {
            None
        }
    }

    /// Remove the entry only if `pred` holds for it
    pub async fn remove_if(&self, key: &K, pred: impl FnOnce(&V) -> bool) -> Option<V> {
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|entry| pred(&entry.value)) {
            entries.remove(key).map(|entry| entry.value)
        } else {
            None
        }
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries.values().filter(|e| self.is_live(e, now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove every expired entry and hand them back for cleanup
    pub async fn sweep(&self) -> Vec<(K, V)> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let expired: Vec<K> = entries
            .iter()
            .filter(|(_, e)| !self.is_live(e, now))
            .map(|(k, _)| k.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|key| entries.remove(&key).map(|e| (key, e.value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let map = ExpiringMap::new(Duration::from_secs(60));
        map.insert("+1".to_string(), 1).await;

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(map.get_cloned(&"+1".to_string()).await, Some(1));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(map.get_cloned(&"+1".to_string()).await, None);
        assert_eq!(map.len().await, 0);

        let swept = map.sweep().await;
        assert_eq!(swept, vec![("+1".to_string(), 1)]);
        assert!(map.sweep().await.is_empty());
    }

    #[tokio::test]
    async fn test_insert_replaces_and_returns_previous() {
        let map = ExpiringMap::new(Duration::from_secs(60));
        assert_eq!(map.insert("k", 1).await, None);
        assert_eq!(map.insert("k", 2).await, Some(1));
        assert_eq!(map.len().await, 1);
        assert_eq!(map.remove(&"k").await, Some(2));
        assert!(map.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_if_checks_predicate() {
        let map = ExpiringMap::new(Duration::from_secs(60));
        map.insert("k", 7).await;
        assert_eq!(map.remove_if(&"k", |v| *v == 8).await, None);
        assert!(map.contains_key(&"k").await);
        assert_eq!(map.remove_if(&"k", |v| *v == 7).await, Some(7));
        assert!(!map.contains_key(&"k").await);
    }

    #[tokio::test]
    async fn test_with_entry_mutates_in_place() {
        let map = ExpiringMap::new(Duration::from_secs(60));
        map.insert("k", vec![1]).await;
        map.with_entry(&"k", |v| v.push(2)).await;
        assert_eq!(map.get_cloned(&"k").await, Some(vec![1, 2]));
    }
}
