use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tradedesk_models::MemoryRecord;

/// Hot cache of query results backed by moka.
///
/// Keyed by (match count, situation text). The store clears it on every
/// `record`, so a cached result is always what a fresh query would return.
pub struct QueryCache {
    inner: Cache<String, Arc<Vec<MemoryRecord>>>,
}

impl QueryCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn key(situation: &str, n: usize) -> String {
        format!("{n}\u{1f}{situation}")
    }

    pub async fn get(&self, key: &str) -> Option<Arc<Vec<MemoryRecord>>> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: String, records: Arc<Vec<MemoryRecord>>) {
        self.inner.insert(key, records).await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Arc<Vec<MemoryRecord>> {
        Arc::new(vec![MemoryRecord::new(
            "earnings beat".into(),
            "hold through guidance".into(),
            0.9,
        )])
    }

    #[tokio::test]
    async fn insert_and_get() {
        let cache = QueryCache::new(100, Duration::from_secs(60));
        let key = QueryCache::key("earnings beat", 3);
        cache.insert(key.clone(), records()).await;

        let hit = cache.get(&key).await.unwrap();
        assert_eq!(hit.len(), 1);
        assert!(cache.get(&QueryCache::key("earnings beat", 2)).await.is_none());
    }

    #[tokio::test]
    async fn invalidate_all_clears() {
        let cache = QueryCache::new(100, Duration::from_secs(60));
        let key = QueryCache::key("x", 1);
        cache.insert(key.clone(), records()).await;
        cache.invalidate_all();
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn ttl_expiration() {
        let cache = QueryCache::new(100, Duration::from_millis(50));
        let key = QueryCache::key("x", 1);
        cache.insert(key.clone(), records()).await;
        assert!(cache.get(&key).await.is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(cache.get(&key).await.is_none());
    }
}
