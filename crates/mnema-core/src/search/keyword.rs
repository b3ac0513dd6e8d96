//! BM25 lexical search over the full-text index
//!
//! Queries and index rows pass through the same tokenizer, so CJK content
//! matches term-for-term. A failed FTS query degrades to a LIKE scan with
//! synthetic scores; lexical search never surfaces a raw error.

use rusqlite::params;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::memory::Memory;
use crate::storage::sqlite::row_to_memory;
use crate::storage::{Result, Store};
use crate::tokenizer::Tokenizer;

/// One scored retrieval hit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub memory: Memory,
    /// Higher is better. BM25 hits carry `|rank|`; LIKE fallback hits carry
    /// `1/(i+1)`; hybrid hits carry the fused RRF score.
    pub score: f64,
    /// Which signals produced this hit: "bm25", "like", "semantic",
    /// "bm25+semantic", optionally suffixed "+rerank".
    pub match_reason: String,
}

/// BM25 retrieval filtered by tenant and minimum vitality.
pub fn search_bm25(
    store: &Store,
    agent_id: &str,
    query: &str,
    limit: usize,
    min_vitality: f64,
) -> Result<Vec<SearchHit>> {
    let tokens = store.tokenizer().tokenize(query);
    if tokens.is_empty() {
        return like_fallback(store, agent_id, query, limit, min_vitality);
    }

    let fts_query = Tokenizer::fts_query(&tokens);
    // The reader guard must drop before the fallback takes it again
    let attempt: rusqlite::Result<Vec<SearchHit>> = {
        let reader = store.read()?;
        (|| {
            let mut stmt = reader.prepare(
                "SELECT m.*, fts.rank AS rank FROM memories_fts fts
                 JOIN memories m ON m.id = fts.id
                 WHERE memories_fts MATCH ?1
                 AND m.agent_id = ?2
                 AND m.vitality >= ?3
                 ORDER BY fts.rank
                 LIMIT ?4",
            )?;
            let rows = stmt.query_map(
                params![fts_query, agent_id, min_vitality, limit as i64],
                |row| {
                    let memory = row_to_memory(row)?;
                    let rank: f64 = row.get("rank")?;
                    Ok(SearchHit {
                        memory,
                        score: rank.abs(),
                        match_reason: "bm25".to_string(),
                    })
                },
            )?;
            rows.collect()
        })()
    };

    match attempt {
        Ok(hits) => Ok(hits),
        Err(e) => {
            warn!("FTS query failed, falling back to LIKE scan: {}", e);
            like_fallback(store, agent_id, query, limit, min_vitality)
        }
    }
}

/// Substring scan ordered by durability and recency, with synthetic
/// positional scores.
fn like_fallback(
    store: &Store,
    agent_id: &str,
    query: &str,
    limit: usize,
    min_vitality: f64,
) -> Result<Vec<SearchHit>> {
    let reader = store.read()?;
    let mut stmt = reader.prepare(
        "SELECT * FROM memories
         WHERE agent_id = ?1
         AND vitality >= ?2
         AND content LIKE '%' || ?3 || '%'
         ORDER BY priority ASC, updated_at DESC
         LIMIT ?4",
    )?;
    let rows = stmt.query_map(
        params![agent_id, min_vitality, query.trim(), limit as i64],
        row_to_memory,
    )?;

    let mut hits = Vec::new();
    for (i, row) in rows.enumerate() {
        hits.push(SearchHit {
            memory: row?,
            score: 1.0 / (i as f64 + 1.0),
            match_reason: "like".to_string(),
        });
    }
    Ok(hits)
}

// ============================================================================
// TESTS
// ============================================================================
