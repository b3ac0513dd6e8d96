//! Hybrid search: BM25 + dense cosine + RRF fusion
//!
//! The lexical list comes from the full-text index; the semantic list from
//! an in-memory cosine scan over the embeddings stored for the provider's
//! model. The two lists are fused rank-only with Reciprocal Rank Fusion,
//! which sidesteps their incompatible score scales. Without a provider the
//! result is simply the BM25 list.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use tracing::warn;

use crate::providers::{cosine_similarity, EmbeddingProvider};
use crate::storage::{Result, Store};

use super::keyword::{search_bm25, SearchHit};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Tunables for hybrid retrieval
#[derive(Debug, Clone)]
pub struct HybridConfig {
    /// RRF constant; higher flattens rank differences
    pub rrf_k: f64,
    /// BM25 fetch size as a multiple of the requested limit
    pub bm25_multiplier: usize,
    /// How many cosine hits survive into fusion
    pub semantic_top_k: usize,
    /// Query-embedding cache capacity
    pub query_cache_size: usize,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            bm25_multiplier: 3,
            semantic_top_k: 50,
            query_cache_size: 100,
        }
    }
}

// ============================================================================
// FUSION
// ============================================================================

/// Reciprocal Rank Fusion over labeled, ranked id lists.
///
/// `score(d) = sum over lists of 1/(k + rank(d))` with 1-based ranks. Each
/// fused entry remembers which lists contributed, for `match_reason`.
fn reciprocal_rank_fusion(
    lists: &[(&'static str, Vec<String>)],
    k: f64,
) -> Vec<(String, f64, Vec<&'static str>)> {
    let mut scores: HashMap<String, (f64, Vec<&'static str>)> = HashMap::new();
    for (label, ids) in lists {
        for (rank, id) in ids.iter().enumerate() {
            let entry = scores.entry(id.clone()).or_insert((0.0, Vec::new()));
            entry.0 += 1.0 / (k + (rank + 1) as f64);
            entry.1.push(label);
        }
    }

    let mut fused: Vec<(String, f64, Vec<&'static str>)> = scores
        .into_iter()
        .map(|(id, (score, labels))| (id, score, labels))
        .collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

// ============================================================================
// HYBRID SEARCHER
// ============================================================================

/// Hybrid searcher with a query-embedding LRU so repeated recalls do not
/// re-embed the same query.
pub struct HybridSearcher {
    config: HybridConfig,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl Default for HybridSearcher {
    fn default() -> Self {
        Self::new(HybridConfig::default())
    }
}

impl HybridSearcher {
    pub fn new(config: HybridConfig) -> Self {
        // max(1) guarantees a non-zero capacity
        let capacity = NonZeroUsize::new(config.query_cache_size.max(1))
            .expect("cache capacity is at least 1");
        Self {
            config,
            query_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    /// Run hybrid retrieval for one query.
    pub async fn search(
        &self,
        store: &Store,
        provider: Option<&dyn EmbeddingProvider>,
        agent_id: &str,
        query: &str,
        limit: usize,
        min_vitality: f64,
    ) -> Result<Vec<SearchHit>> {
        let bm25_hits = search_bm25(
            store,
            agent_id,
            query,
            limit * self.config.bm25_multiplier,
            min_vitality,
        )?;

        let Some(provider) = provider else {
            let mut hits = bm25_hits;
            hits.truncate(limit);
            return Ok(hits);
        };

        let query_vector = match self.query_embedding(provider, query).await {
            Some(v) => v,
            None => {
                // Provider failure degrades to the lexical list
                let mut hits = bm25_hits;
                hits.truncate(limit);
                return Ok(hits);
            }
        };

        let semantic_ids = self.semantic_scan(store, agent_id, provider.model(), &query_vector)?;

        let bm25_ids: Vec<String> = bm25_hits.iter().map(|h| h.memory.id.clone()).collect();
        let mut memories: HashMap<String, _> = bm25_hits
            .into_iter()
            .map(|h| (h.memory.id.clone(), h.memory))
            .collect();

        let fused = reciprocal_rank_fusion(
            &[("bm25", bm25_ids), ("semantic", semantic_ids)],
            self.config.rrf_k,
        );

        let mut hits = Vec::new();
        for (id, score, labels) in fused {
            if hits.len() >= limit {
                break;
            }
            // Hydrate ids the lexical pass did not load
            let memory = match memories.remove(&id) {
                Some(m) => m,
                None => match store.get_memory(agent_id, &id)? {
                    Some(m) => m,
                    None => continue,
                },
            };
            if memory.vitality < min_vitality {
                continue;
            }
            let mut sources: Vec<&str> = labels.to_vec();
            sources.dedup();
            hits.push(SearchHit {
                memory,
                score,
                match_reason: sources.join("+"),
            });
        }

        Ok(hits)
    }

    /// Embed the query, via the LRU cache. `None` means the provider is
    /// unavailable for this call.
    async fn query_embedding(
        &self,
        provider: &dyn EmbeddingProvider,
        query: &str,
    ) -> Option<Vec<f32>> {
        let cache_key = format!("{}:{}", provider.model(), query);
        if let Ok(mut cache) = self.query_cache.lock() {
            if let Some(vector) = cache.get(&cache_key) {
                return Some(vector.clone());
            }
        }

        match provider.embed_query(query).await {
            Ok(vector) => {
                if let Ok(mut cache) = self.query_cache.lock() {
                    cache.put(cache_key, vector.clone());
                }
                Some(vector)
            }
            Err(e) => {
                warn!("query embedding failed, degrading to BM25 only: {}", e);
                None
            }
        }
    }

    /// Cosine scan over all stored vectors for `(agent_id, model)`,
    /// keeping the configured top-K ids best-first.
    fn semantic_scan(
        &self,
        store: &Store,
        agent_id: &str,
        model: &str,
        query_vector: &[f32],
    ) -> Result<Vec<String>> {
        let mut scored: Vec<(String, f32)> = store
            .list_embeddings(agent_id, model)?
            .into_iter()
            .map(|(id, vector)| {
                let similarity = cosine_similarity(query_vector, &vector);
                (id, similarity)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.config.semantic_top_k);
        Ok(scored.into_iter().map(|(id, _)| id).collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryType, WriteInput, DEFAULT_AGENT_ID};
    use crate::providers::ProviderError;
    use async_trait::async_trait;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(Some(dir.path().join("hybrid.db"))).unwrap();
        (dir, store)
    }

    fn remember(store: &Store, content: &str) -> crate::memory::Memory {
        store
            .create_memory(
                DEFAULT_AGENT_ID,
                &WriteInput {
                    content: content.to_string(),
                    memory_type: MemoryType::Event,
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap()
    }

    /// Maps configured phrases to fixed vectors; everything else far away.
    struct PhraseProvider {
        pairs: Vec<(String, Vec<f32>)>,
    }

    #[async_trait]
    impl EmbeddingProvider for PhraseProvider {
        fn id(&self) -> &str {
            "mock"
        }
        fn model(&self) -> &str {
            "mock-embed"
        }
        async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
            for (phrase, vector) in &self.pairs {
                if text.contains(phrase.as_str()) {
                    return Ok(vector.clone());
                }
            }
            Ok(vec![0.0, 0.0, 1.0])
        }
    }

    #[test]
    fn test_rrf_rewards_presence_in_both_lists() {
        let fused = reciprocal_rank_fusion(
            &[
                ("bm25", vec!["a".into(), "b".into()]),
                ("semantic", vec!["b".into(), "c".into()]),
            ],
            60.0,
        );
        assert_eq!(fused[0].0, "b");
        assert_eq!(fused[0].2, vec!["bm25", "semantic"]);
        for window in fused.windows(2) {
            assert!(window[0].1 >= window[1].1);
        }
    }

    #[tokio::test]
    async fn test_without_provider_returns_bm25() {
        let (_dir, store) = temp_store();
        remember(&store, "deployment checklist for friday");

        let searcher = HybridSearcher::default();
        let hits = searcher
            .search(&store, None, DEFAULT_AGENT_ID, "deployment checklist", 5, 0.0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].match_reason, "bm25");
    }

    #[tokio::test]
    async fn test_semantic_hit_without_lexical_overlap() {
        let (_dir, store) = temp_store();
        // "我今天很高兴" and the query "开心" share no tokens, but the mock
        // provider maps both onto the same vector.
        let happy = remember(&store, "我今天很高兴");
        let weather = remember(&store, "天气一般般");

        let provider = PhraseProvider {
            pairs: vec![
                ("高兴".to_string(), vec![1.0, 0.0, 0.0]),
                ("开心".to_string(), vec![1.0, 0.0, 0.0]),
                ("天气".to_string(), vec![0.0, 1.0, 0.0]),
            ],
        };
        store
            .upsert_embedding(
                DEFAULT_AGENT_ID,
                &happy.id,
                "mock-embed",
                &provider.embed(&happy.content).await.unwrap(),
            )
            .unwrap();
        store
            .upsert_embedding(
                DEFAULT_AGENT_ID,
                &weather.id,
                "mock-embed",
                &provider.embed(&weather.content).await.unwrap(),
            )
            .unwrap();

        let searcher = HybridSearcher::default();
        let hits = searcher
            .search(&store, Some(&provider), DEFAULT_AGENT_ID, "开心", 5, 0.0)
            .await
            .unwrap();

        assert!(!hits.is_empty());
        assert_eq!(hits[0].memory.id, happy.id);
        assert!(hits[0].match_reason.contains("semantic"));
    }

    #[tokio::test]
    async fn test_both_signals_fuse() {
        let (_dir, store) = temp_store();
        let target = remember(&store, "standup notes about release planning");
        remember(&store, "grocery list apples bananas");

        let provider = PhraseProvider {
            pairs: vec![
                ("release planning".to_string(), vec![1.0, 0.0, 0.0]),
                ("release".to_string(), vec![0.9, 0.1, 0.0]),
            ],
        };
        store
            .upsert_embedding(
                DEFAULT_AGENT_ID,
                &target.id,
                "mock-embed",
                &provider.embed(&target.content).await.unwrap(),
            )
            .unwrap();

        let searcher = HybridSearcher::default();
        let hits = searcher
            .search(
                &store,
                Some(&provider),
                DEFAULT_AGENT_ID,
                "release planning",
                5,
                0.0,
            )
            .await
            .unwrap();

        assert_eq!(hits[0].memory.id, target.id);
        assert_eq!(hits[0].match_reason, "bm25+semantic");
    }

    #[tokio::test]
    async fn test_provider_failure_degrades_to_bm25() {
        struct FailingProvider;

        #[async_trait]
        impl EmbeddingProvider for FailingProvider {
            fn id(&self) -> &str {
                "failing"
            }
            fn model(&self) -> &str {
                "failing"
            }
            async fn embed(&self, _: &str) -> std::result::Result<Vec<f32>, ProviderError> {
                Err(ProviderError::Request("connection refused".into()))
            }
        }

        let (_dir, store) = temp_store();
        remember(&store, "resilient retrieval notes");

        let searcher = HybridSearcher::default();
        let hits = searcher
            .search(
                &store,
                Some(&FailingProvider),
                DEFAULT_AGENT_ID,
                "resilient retrieval",
                5,
                0.0,
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].match_reason, "bm25");
    }
}
