//! Retrieval pipeline
//!
//! - Keyword search: BM25 over the tokenized full-text index, with a LIKE
//!   scan fallback when the FTS query cannot be executed
//! - Hybrid search: dense cosine over stored embeddings fused with the
//!   BM25 list via Reciprocal Rank Fusion
//! - Intent-aware final weighting: query intent classification plus a
//!   local priority/recency/vitality reranker, with an optional external
//!   cross-encoder hook

mod hybrid;
mod intent;
mod keyword;

pub use hybrid::{HybridConfig, HybridSearcher};
pub use intent::{classify_intent, local_rerank, IntentResult, QueryIntent, SearchStrategy};
pub use keyword::{search_bm25, SearchHit};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::providers::ProviderSet;
use crate::storage::{Result, Store};

/// Fetch headroom for the final weighting pass: retrieve more candidates
/// than the strategy limit so reranking has something to choose from.
const RERANK_POOL_MULTIPLIER: usize = 3;

/// Upper bound on the candidate pool regardless of limit.
const RERANK_POOL_CAP: usize = 50;

/// The result of one recall: classified intent plus the weighted hit list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallResult {
    pub intent: IntentResult,
    pub hits: Vec<SearchHit>,
}

/// Full retrieval pipeline: classify intent, run hybrid search, apply the
/// external reranker when configured, then the intent-aware local pass.
///
/// Strengthening of returned memories is the caller's responsibility.
pub async fn recall(
    store: &Store,
    providers: &ProviderSet,
    hybrid: &HybridSearcher,
    agent_id: &str,
    query: &str,
    limit_override: Option<usize>,
) -> Result<RecallResult> {
    let token_count = store.tokenizer().tokenize(query).len();
    let intent = classify_intent(query, token_count);
    let strategy = intent.intent.strategy();
    let limit = limit_override.unwrap_or(strategy.limit);

    let pool = (limit * RERANK_POOL_MULTIPLIER).clamp(limit, RERANK_POOL_CAP);
    let mut candidates = hybrid
        .search(store, providers.embedding.as_deref(), agent_id, query, pool, 0.0)
        .await?;

    // External reranker replaces scores outright; failure degrades to the
    // local signals.
    if let Some(reranker) = providers.rerank.as_deref() {
        let documents: Vec<String> = candidates.iter().map(|h| h.memory.content.clone()).collect();
        match reranker.rerank(query, &documents).await {
            Ok(ranked) => {
                for doc in ranked {
                    if let Some(hit) = candidates.get_mut(doc.index) {
                        hit.score = doc.relevance_score;
                        hit.match_reason.push_str("+rerank");
                    }
                }
            }
            Err(e) => {
                warn!("external reranker unavailable, using local weighting only: {}", e);
            }
        }
    }

    let hits = local_rerank(candidates, &strategy, limit);
    Ok(RecallResult { intent, hits })
}
