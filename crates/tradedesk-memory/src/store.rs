use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use tradedesk_models::{MemoryMode, MemoryRecord};

use crate::embedder::Embedder;
use crate::error::MemoryError;
use crate::memory::QueryCache;
use crate::scoring;
use crate::sqlite::{MemoryRow, SqliteMemory};

/// Lookup of past (situation, recommendation) pairs. Mockable for testing.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// How scores returned by `query` should be read.
    fn mode(&self) -> MemoryMode;

    /// The `n` most similar past situations, best first. An empty store
    /// yields an empty list.
    async fn query(&self, situation: &str, n: usize) -> Result<Vec<MemoryRecord>, MemoryError>;

    async fn record(&self, situation: &str, recommendation: &str) -> Result<(), MemoryError>;
}

/// SQLite-backed memory with a moka hot cache in front of queries.
///
/// Similarity mode when an embedder is supplied, lexical otherwise. Ranking is
/// score descending then insertion order, so repeated queries are stable.
///
/// SQLite access is synchronized via `Mutex` since `rusqlite::Connection` is not `Sync`.
/// `generation` is bumped by every `record`; a query that overlapped one
/// never leaves its result in the cache.
pub struct SqliteMemoryStore {
    sqlite: Mutex<SqliteMemory>,
    cache: QueryCache,
    embedder: Option<Arc<dyn Embedder>>,
    generation: AtomicU64,
}

impl SqliteMemoryStore {
    pub fn new(
        sqlite: SqliteMemory,
        embedder: Option<Arc<dyn Embedder>>,
        cache_capacity: u64,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            sqlite: Mutex::new(sqlite),
            cache: QueryCache::new(cache_capacity, cache_ttl),
            embedder,
            generation: AtomicU64::new(0),
        }
    }

    /// Lexical-mode store over a fresh in-memory database.
    pub fn in_memory() -> Result<Self, MemoryError> {
        Ok(Self::new(
            SqliteMemory::open_in_memory()?,
            None,
            100,
            Duration::from_secs(60),
        ))
    }

    /// Add several entries at once.
    pub async fn record_many(&self, pairs: &[(&str, &str)]) -> Result<(), MemoryError> {
        for (situation, recommendation) in pairs {
            self.record(situation, recommendation).await?;
        }
        Ok(())
    }

    pub fn len(&self) -> Result<u64, MemoryError> {
        self.with_sqlite(|db| db.count())
    }

    pub fn is_empty(&self) -> Result<bool, MemoryError> {
        Ok(self.len()? == 0)
    }

    fn with_sqlite<T>(
        &self,
        f: impl FnOnce(&SqliteMemory) -> Result<T, MemoryError>,
    ) -> Result<T, MemoryError> {
        let sqlite = self
            .sqlite
            .lock()
            .map_err(|e| MemoryError::Unavailable(format!("SQLite mutex poisoned: {e}")))?;
        f(&sqlite)
    }

    fn rank(&self, rows: Vec<MemoryRow>, situation: &str, query_embedding: Option<&[f32]>, n: usize) -> Vec<MemoryRecord> {
        let mut scored: Vec<(f64, MemoryRow)> = rows
            .into_iter()
            .filter_map(|row| {
                let score = match query_embedding {
                    Some(query) => scoring::cosine(query, row.embedding.as_deref()?),
                    None => scoring::lexical(situation, &row.situation),
                };
                Some((score, row))
            })
            .collect();

        scored.sort_by(|(sa, ra), (sb, rb)| sb.total_cmp(sa).then(ra.id.cmp(&rb.id)));

        scored
            .into_iter()
            .take(n)
            .map(|(score, row)| MemoryRecord::new(row.situation, row.recommendation, score))
            .collect()
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    fn mode(&self) -> MemoryMode {
        if self.embedder.is_some() {
            MemoryMode::Similarity
        } else {
            MemoryMode::Lexical
        }
    }

    async fn query(&self, situation: &str, n: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        if n == 0 {
            return Ok(Vec::new());
        }

        // 1. Check the hot cache
        let key = QueryCache::key(situation, n);
        if let Some(hit) = self.cache.get(&key).await {
            debug!(n, "Memory query served from cache");
            return Ok(hit.as_ref().clone());
        }

        // 2. Load entries; an empty store never touches the embedder
        let generation = self.generation.load(Ordering::SeqCst);
        let rows = self.with_sqlite(|db| db.all())?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        // 3. Score and rank
        let query_embedding = match &self.embedder {
            Some(embedder) => Some(embedder.embed(situation).await?),
            None => None,
        };
        let records = self.rank(rows, situation, query_embedding.as_deref(), n);
        debug!(n, matches = records.len(), mode = ?self.mode(), "Memory query ranked");

        // A record that landed meanwhile made this result stale. Re-checking
        // after the insert also covers a record between check and insert.
        if self.generation.load(Ordering::SeqCst) == generation {
            self.cache.insert(key.clone(), Arc::new(records.clone())).await;
            if self.generation.load(Ordering::SeqCst) != generation {
                self.cache.invalidate(&key).await;
            }
        } else {
            debug!(n, "Memory changed during query, result not cached");
        }
        Ok(records)
    }

    async fn record(&self, situation: &str, recommendation: &str) -> Result<(), MemoryError> {
        let embedding = match &self.embedder {
            Some(embedder) => Some(embedder.embed(situation).await?),
            None => None,
        };

        self.with_sqlite(|db| db.insert(situation, recommendation, embedding.as_deref()))?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache.invalidate_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic embedder: counts a few keywords.
    struct KeywordEmbedder {
        calls: AtomicUsize,
    }

    impl KeywordEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        fn model(&self) -> &str {
            "keyword"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let lower = text.to_lowercase();
            Ok(["chip", "oil", "rates"]
                .iter()
                .map(|k| lower.matches(k).count() as f32)
                .collect())
        }
    }

    async fn seeded_lexical() -> SqliteMemoryStore {
        let store = SqliteMemoryStore::in_memory().unwrap();
        store
            .record_many(&[
                ("Oil prices spike on supply cuts", "Hedge fuel-heavy names"),
                ("Chip demand surging, margins expanding", "Add to semis on dips"),
                ("Chip inventory glut, margins shrinking", "Trim semis exposure"),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn empty_store_returns_empty() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        assert!(store.is_empty().unwrap());
        assert!(store.query("anything", 3).await.unwrap().is_empty());
        assert_eq!(store.mode(), MemoryMode::Lexical);
    }

    #[tokio::test]
    async fn lexical_ranking_best_first() {
        let store = seeded_lexical().await;
        let records = store
            .query("chip demand surging with expanding margins", 2)
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].recommendation, "Add to semis on dips");
        assert_eq!(records[1].recommendation, "Trim semis exposure");
        assert!(records[0].similarity >= records[1].similarity);
    }

    #[tokio::test]
    async fn query_is_idempotent() {
        let store = seeded_lexical().await;
        let first = store.query("margins expanding", 3).await.unwrap();
        let second = store.query("margins expanding", 3).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn record_invalidates_cached_queries() {
        let store = seeded_lexical().await;
        let before = store.query("rates rising", 5).await.unwrap();
        store
            .record("Rates rising faster than expected", "Shorten duration")
            .await
            .unwrap();
        let after = store.query("rates rising", 5).await.unwrap();

        assert_eq!(after.len(), before.len() + 1);
        assert_eq!(after[0].recommendation, "Shorten duration");
    }

    #[tokio::test]
    async fn ties_keep_insertion_order() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        store
            .record_many(&[("same words", "first"), ("same words", "second")])
            .await
            .unwrap();
        let records = store.query("same words", 2).await.unwrap();
        assert_eq!(records[0].recommendation, "first");
        assert_eq!(records[1].recommendation, "second");
    }

    #[tokio::test]
    async fn similarity_mode_uses_embeddings() {
        let embedder = Arc::new(KeywordEmbedder::new());
        let store = SqliteMemoryStore::new(
            SqliteMemory::open_in_memory().unwrap(),
            Some(embedder.clone() as Arc<dyn Embedder>),
            100,
            Duration::from_secs(60),
        );
        assert_eq!(store.mode(), MemoryMode::Similarity);

        store.record("oil oil shock", "sell airlines").await.unwrap();
        store.record("chip shortage", "buy foundries").await.unwrap();

        let records = store.query("chip rally", 1).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].recommendation, "buy foundries");
        assert_eq!(records[0].similarity, rust_decimal_macros::dec!(1));

        // Second identical query is served from cache without embedding again
        let calls = embedder.calls.load(Ordering::SeqCst);
        store.query("chip rally", 1).await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls);
    }

    /// Keyword embedder that takes a while on query-side texts.
    struct SlowQueryEmbedder;

    #[async_trait]
    impl Embedder for SlowQueryEmbedder {
        fn model(&self) -> &str {
            "slow-keyword"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
            if text.starts_with("query") {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok(vec![text.matches("chip").count() as f32, 1.0])
        }
    }

    #[tokio::test]
    async fn record_during_query_leaves_no_stale_cache() {
        let store = Arc::new(SqliteMemoryStore::new(
            SqliteMemory::open_in_memory().unwrap(),
            Some(Arc::new(SlowQueryEmbedder) as Arc<dyn Embedder>),
            100,
            Duration::from_secs(60),
        ));
        store.record("old chip", "trim").await.unwrap();

        let racing = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.query("query chip", 5).await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.record("new chip", "add").await.unwrap();

        assert_eq!(racing.await.unwrap().len(), 1);
        assert_eq!(store.query("query chip", 5).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn zero_matches_requested() {
        let store = seeded_lexical().await;
        assert!(store.query("oil", 0).await.unwrap().is_empty());
    }
}
