use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// In-process cache for short-lived state: pending checkouts, import
/// handshakes, archive job status. Entries expire after their TTL; a
/// background sweeper drops what readers never came back for.
#[derive(Clone)]
pub struct TtlCache<V> {
    entries: Arc<RwLock<HashMap<String, Entry<V>>>>,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    pub fn new() -> Self {
        TtlCache {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn insert(&self, key: String, value: V, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key, entry);
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    /// Removes and returns the entry, so one-shot tokens cannot be replayed.
    pub async fn take(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.write().await;
        entries
            .remove(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value)
    }

    pub async fn remove(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Starts the periodic sweep loop. The handle keeps running for the life
    /// of the process; the cache itself stays usable from any clone.
    pub fn spawn_sweeper(&self, interval: Duration) {
        let cache = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let removed = cache.sweep().await;
                if removed > 0 {
                    debug!("Swept {} expired cache entries", removed);
                }
            }
        });
    }
}

impl<V: Clone + Send + Sync + 'static> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn get_returns_live_entries() {
        let cache: TtlCache<String> = TtlCache::new();
        cache
            .insert("k".to_string(), "v".to_string(), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("k").await, Some("v".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_invisible() {
        let cache: TtlCache<String> = TtlCache::new();
        cache
            .insert("k".to_string(), "v".to_string(), Duration::from_secs(60))
            .await;
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn reinsert_refreshes_the_ttl() {
        let cache: TtlCache<u32> = TtlCache::new();
        cache
            .insert("k".to_string(), 1, Duration::from_secs(10))
            .await;
        tokio::time::advance(Duration::from_secs(8)).await;
        cache
            .insert("k".to_string(), 2, Duration::from_secs(10))
            .await;
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get("k").await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn take_is_one_shot() {
        let cache: TtlCache<u32> = TtlCache::new();
        cache
            .insert("k".to_string(), 7, Duration::from_secs(60))
            .await;
        assert_eq!(cache.take("k").await, Some(7));
        assert_eq!(cache.take("k").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn take_refuses_expired_entries() {
        let cache: TtlCache<u32> = TtlCache::new();
        cache
            .insert("k".to_string(), 7, Duration::from_secs(10))
            .await;
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.take("k").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_drops_only_expired_entries() {
        let cache: TtlCache<u32> = TtlCache::new();
        cache
            .insert("old".to_string(), 1, Duration::from_secs(10))
            .await;
        cache
            .insert("new".to_string(), 2, Duration::from_secs(120))
            .await;
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.sweep().await, 1);
        assert_eq!(cache.get("new").await, Some(2));
    }
}
